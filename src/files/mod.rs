pub mod disk;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Result;

pub use disk::{ARMA3_APP_ID, DiskFileOps};

/// Filesystem and download collaborator for the lifecycle executors.
///
/// Copy and delete calls address both deployment trees. `Cancelled` is the
/// only error the download may return when the token fires; the copy and
/// delete calls are not token-aware, the executors wrap them instead.
#[async_trait]
pub trait WorkshopFileOps: Send + Sync {
    /// Working download directory of a workshop item.
    fn resolve_path(&self, external_id: &str) -> PathBuf;

    /// Archive-file names under `path`, nested directories included.
    /// Errors on zero files and on duplicate case-insensitive names.
    async fn discover_archive_files(&self, path: &Path) -> Result<Vec<String>>;

    /// Bounded-retry download; the last attempt's failure is surfaced.
    async fn download_with_retries(
        &self,
        external_id: &str,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn copy_to_deployment_trees(&self, source: &Path, files: &[String]) -> Result<()>;

    async fn delete_from_deployment_trees(&self, files: &[String]) -> Result<()>;

    async fn copy_root_to_deployment_trees(&self, source: &Path, external_id: &str) -> Result<()>;

    async fn delete_root_from_deployment_trees(&self, external_id: &str) -> Result<()>;

    async fn delete_working_directory(&self, path: &Path) -> Result<()>;
}
