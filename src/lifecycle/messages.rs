use tokio_util::sync::CancellationToken;

use crate::core::ModStatus;

use super::executor::ManagedKind;
use super::saga::SagaState;

/// Saga events: guard requests plus step completions and faults. Every
/// variant carries the record's workshop id.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    InstallRequested {
        external_id: String,
    },
    UpdateRequested {
        external_id: String,
    },
    /// Carries the record's status from before the guard stamped
    /// Uninstalling, so the executor can still map the final status.
    UninstallRequested {
        external_id: String,
        previous_status: ModStatus,
    },
    InterventionResolved {
        external_id: String,
        selected_pbos: Vec<String>,
    },
    DownloadComplete {
        external_id: String,
    },
    CheckComplete {
        external_id: String,
        intervention_required: bool,
        available_pbos: Vec<String>,
    },
    InstallComplete {
        external_id: String,
        files_changed: bool,
    },
    UpdateComplete {
        external_id: String,
        files_changed: bool,
    },
    UninstallComplete {
        external_id: String,
        files_changed: bool,
    },
    CleanupComplete {
        external_id: String,
    },
    /// `faulted_state` names the saga state whose step failed.
    Faulted {
        external_id: String,
        faulted_state: SagaState,
        error_message: String,
    },
}

impl LifecycleEvent {
    pub fn external_id(&self) -> &str {
        match self {
            Self::InstallRequested { external_id }
            | Self::UpdateRequested { external_id }
            | Self::UninstallRequested { external_id, .. }
            | Self::InterventionResolved { external_id, .. }
            | Self::DownloadComplete { external_id }
            | Self::CheckComplete { external_id, .. }
            | Self::InstallComplete { external_id, .. }
            | Self::UpdateComplete { external_id, .. }
            | Self::UninstallComplete { external_id, .. }
            | Self::CleanupComplete { external_id }
            | Self::Faulted { external_id, .. } => external_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallRequested { .. } => "InstallRequested",
            Self::UpdateRequested { .. } => "UpdateRequested",
            Self::UninstallRequested { .. } => "UninstallRequested",
            Self::InterventionResolved { .. } => "InterventionResolved",
            Self::DownloadComplete { .. } => "DownloadComplete",
            Self::CheckComplete { .. } => "CheckComplete",
            Self::InstallComplete { .. } => "InstallComplete",
            Self::UpdateComplete { .. } => "UpdateComplete",
            Self::UninstallComplete { .. } => "UninstallComplete",
            Self::CleanupComplete { .. } => "CleanupComplete",
            Self::Faulted { .. } => "Faulted",
        }
    }
}

/// Step commands the saga dispatches to the consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum StepCommand {
    Download {
        kind: ManagedKind,
    },
    Check {
        kind: ManagedKind,
    },
    Execute {
        kind: ManagedKind,
        selected_pbos: Vec<String>,
    },
    ExecuteUninstall {
        previous_status: ModStatus,
    },
    Cleanup {
        files_changed: bool,
    },
}

/// One dispatched step: the command, the saga state it runs under (reported
/// as `faulted_state` on failure) and the instance's cancellation token.
#[derive(Debug, Clone)]
pub struct StepEnvelope {
    pub external_id: String,
    pub state: SagaState,
    pub command: StepCommand,
    pub cancel: CancellationToken,
}

/// Input feed of the saga worker.
#[derive(Debug)]
pub enum SagaInput {
    Event(LifecycleEvent),
    Cancel { external_id: String },
}
