use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{LifecycleError, ModStatus, Result, pbo_sets_differ, removed_pbos};
use crate::files::WorkshopFileOps;
use crate::store::ModStore;

use super::outcome::{CheckReport, ExecuteReport, StepOutcome};

/// The two lifecycle kinds sharing the Download/Check/Execute shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedKind {
    Install,
    Update,
}

impl ManagedKind {
    fn active_status(self) -> ModStatus {
        match self {
            Self::Install => ModStatus::Installing,
            Self::Update => ModStatus::Updating,
        }
    }

    fn pending_status(self) -> ModStatus {
        match self {
            Self::Install => ModStatus::InstalledPendingRelease,
            Self::Update => ModStatus::UpdatedPendingRelease,
        }
    }

    fn pending_message(self) -> &'static str {
        match self {
            Self::Install => "Installed pending next modpack release",
            Self::Update => "Updated pending next modpack release",
        }
    }

    fn download_cancelled_message(self) -> &'static str {
        match self {
            Self::Install => "Install download cancelled",
            Self::Update => "Update download cancelled",
        }
    }

    fn execute_cancelled_message(self) -> &'static str {
        match self {
            Self::Install => "Installation cancelled",
            Self::Update => "Update cancelled",
        }
    }
}

/// Download/Check/Execute for installs and updates.
///
/// Collaborator failures come back as `Failure` values for the step runner
/// to finalize; only store access stays on the `Err` side. Cancellation
/// persists a phase-specific Error message here, then surfaces as
/// `Cancelled`.
pub struct ManagedOperation {
    kind: ManagedKind,
    store: Arc<ModStore>,
    files: Arc<dyn WorkshopFileOps>,
    download_attempts: u32,
}

impl ManagedOperation {
    pub fn new(
        kind: ManagedKind,
        store: Arc<ModStore>,
        files: Arc<dyn WorkshopFileOps>,
        download_attempts: u32,
    ) -> Self {
        Self {
            kind,
            store,
            files,
            download_attempts,
        }
    }

    pub async fn download(
        &self,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<()>> {
        let Some(mut record) = self.store.find_latest(external_id).await else {
            return Ok(StepOutcome::Failure(format!("Mod {} not found", external_id)));
        };
        record.set_status(self.kind.active_status(), "Downloading...");
        self.store.update(record).await?;

        match self
            .files
            .download_with_retries(external_id, self.download_attempts, cancel)
            .await
        {
            Ok(()) => Ok(StepOutcome::Success(())),
            Err(LifecycleError::Cancelled) => {
                persist_error(&self.store, external_id, self.kind.download_cancelled_message())
                    .await?;
                Ok(StepOutcome::Cancelled)
            }
            // Exhausted retries; the runner finalizes the status.
            Err(err) => Ok(StepOutcome::Failure(err.to_string())),
        }
    }

    pub async fn check(&self, external_id: &str) -> Result<StepOutcome<CheckReport>> {
        let Some(mut record) = self.store.find_latest(external_id).await else {
            return Ok(StepOutcome::Failure(format!("Mod {} not found", external_id)));
        };
        if record.root_mod {
            // Whole-directory installs never offer file selection.
            return Ok(StepOutcome::Success(CheckReport {
                intervention_required: false,
                available_pbos: Vec::new(),
            }));
        }
        record.set_status(self.kind.active_status(), "Checking...");
        self.store.update(record.clone()).await?;

        let path = self.files.resolve_path(external_id);
        let discovered = match self.files.discover_archive_files(&path).await {
            Ok(files) => files,
            // Status stays where it was; the runner writes the Error record.
            Err(err) => return Ok(StepOutcome::Failure(err.to_string())),
        };

        record.record_available_files(&discovered);
        let intervention_required = match self.kind {
            // First-time selection is always required when files exist.
            ManagedKind::Install => !discovered.is_empty(),
            ManagedKind::Update => pbo_sets_differ(&discovered, &record.pbos),
        };
        if intervention_required {
            record.set_status(ModStatus::InterventionRequired, "Select PBOs to install");
        }
        self.store.update(record).await?;

        Ok(StepOutcome::Success(CheckReport {
            intervention_required,
            available_pbos: discovered,
        }))
    }

    pub async fn execute(
        &self,
        external_id: &str,
        selected: &[String],
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<ExecuteReport>> {
        let Some(mut record) = self.store.find_latest(external_id).await else {
            return Ok(StepOutcome::Failure(format!("Mod {} not found", external_id)));
        };
        let path = self.files.resolve_path(external_id);

        let deploy = async {
            if record.root_mod {
                if self.kind == ManagedKind::Update {
                    self.files
                        .delete_root_from_deployment_trees(external_id)
                        .await?;
                }
                self.files
                    .copy_root_to_deployment_trees(&path, external_id)
                    .await?;
            } else {
                self.files.copy_to_deployment_trees(&path, selected).await?;
                if self.kind == ManagedKind::Update {
                    let removed = removed_pbos(&record.pbos, selected);
                    if !removed.is_empty() {
                        self.files.delete_from_deployment_trees(&removed).await?;
                    }
                }
            }
            Ok::<(), LifecycleError>(())
        };
        let deployed = tokio::select! {
            _ = cancel.cancelled() => {
                persist_error(&self.store, external_id, self.kind.execute_cancelled_message())
                    .await?;
                return Ok(StepOutcome::Cancelled);
            }
            result = deploy => result,
        };
        if let Err(err) = deployed {
            return Ok(StepOutcome::Failure(err.to_string()));
        }

        if !record.root_mod {
            record.set_pbos(selected);
        }
        record.set_status(self.kind.pending_status(), self.kind.pending_message());
        if self.kind == ManagedKind::Update {
            record.stamp_updated();
        }
        self.store.update(record).await?;

        Ok(StepOutcome::Success(ExecuteReport { files_changed: true }))
    }
}

/// Uninstall executor.
///
/// Never writes Error status on collaborator failure; the step runner owns
/// that write, and a failed uninstall stays retryable from the status it
/// had. Cancellation still records "Uninstall cancelled".
pub struct UninstallOperation {
    store: Arc<ModStore>,
    files: Arc<dyn WorkshopFileOps>,
}

impl UninstallOperation {
    pub fn new(store: Arc<ModStore>, files: Arc<dyn WorkshopFileOps>) -> Self {
        Self { store, files }
    }

    pub async fn execute(
        &self,
        external_id: &str,
        previous_status: ModStatus,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<ExecuteReport>> {
        let Some(mut record) = self.store.find_latest(external_id).await else {
            return Ok(StepOutcome::Failure(format!("Mod {} not found", external_id)));
        };
        if matches!(
            record.status,
            ModStatus::Uninstalled | ModStatus::UninstalledPendingRelease
        ) {
            return Ok(StepOutcome::Success(ExecuteReport {
                files_changed: false,
            }));
        }
        record.set_status(ModStatus::Uninstalling, "Uninstalling...");
        self.store.update(record.clone()).await?;

        let removal = async {
            if record.root_mod {
                self.files
                    .delete_root_from_deployment_trees(external_id)
                    .await?;
                Ok::<bool, LifecycleError>(true)
            } else if record.pbos.is_empty() {
                Ok(false)
            } else {
                self.files.delete_from_deployment_trees(&record.pbos).await?;
                Ok(true)
            }
        };
        let files_changed = tokio::select! {
            _ = cancel.cancelled() => {
                persist_error(&self.store, external_id, "Uninstall cancelled").await?;
                return Ok(StepOutcome::Cancelled);
            }
            result = removal => match result {
                Ok(changed) => changed,
                Err(err) => return Ok(StepOutcome::Failure(err.to_string())),
            },
        };

        record.clear_pbos();
        let (status, message) = match previous_status {
            ModStatus::Installed
            | ModStatus::InstalledPendingRelease
            | ModStatus::UpdatedPendingRelease => (
                ModStatus::UninstalledPendingRelease,
                "Uninstalled pending next modpack release",
            ),
            _ => (ModStatus::Uninstalled, "Uninstalled"),
        };
        record.set_status(status, message);
        record.stamp_updated();
        self.store.update(record).await?;

        Ok(StepOutcome::Success(ExecuteReport { files_changed }))
    }
}

/// Explicit registry mapping lifecycle kind to executor, built once at
/// startup.
pub struct OperationRegistry {
    install: ManagedOperation,
    update: ManagedOperation,
    uninstall: UninstallOperation,
}

impl OperationRegistry {
    pub fn new(store: Arc<ModStore>, files: Arc<dyn WorkshopFileOps>, download_attempts: u32) -> Self {
        Self {
            install: ManagedOperation::new(
                ManagedKind::Install,
                store.clone(),
                files.clone(),
                download_attempts,
            ),
            update: ManagedOperation::new(
                ManagedKind::Update,
                store.clone(),
                files.clone(),
                download_attempts,
            ),
            uninstall: UninstallOperation::new(store, files),
        }
    }

    pub fn managed(&self, kind: ManagedKind) -> &ManagedOperation {
        match kind {
            ManagedKind::Install => &self.install,
            ManagedKind::Update => &self.update,
        }
    }

    pub fn uninstall(&self) -> &UninstallOperation {
        &self.uninstall
    }
}

/// Writes Error status with the given message, leaving the record alone if
/// it no longer exists.
pub(super) async fn persist_error(store: &ModStore, external_id: &str, message: &str) -> Result<()> {
    if let Some(mut record) = store.find_latest(external_id).await {
        record.set_status(ModStatus::Error, message);
        store.update(record).await?;
    }
    Ok(())
}
