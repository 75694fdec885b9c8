pub mod error;
pub mod record;

pub use error::{LifecycleError, Result};
pub use record::{ModStatus, WorkshopModRecord, pbo_sets_differ, removed_pbos, shared_pbos};
