pub mod bus;
pub mod consumer;
pub mod executor;
pub mod guard;
pub mod messages;
pub mod outcome;
pub mod runner;
pub mod saga;

pub use bus::LifecycleBus;
pub use consumer::DispatchWorker;
pub use executor::{ManagedKind, ManagedOperation, OperationRegistry, UninstallOperation};
pub use guard::LifecycleGuard;
pub use messages::{LifecycleEvent, SagaInput, StepCommand, StepEnvelope};
pub use outcome::{CheckReport, ExecuteReport, StepOutcome};
pub use runner::run_step;
pub use saga::{SagaState, SagaWorker, Transition, transition};
