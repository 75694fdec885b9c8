use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::builds::BuildQueue;
use crate::core::{LifecycleError, Result};
use crate::files::WorkshopFileOps;
use crate::store::ModStore;

use super::bus::LifecycleBus;
use super::executor::{ManagedKind, OperationRegistry};
use super::messages::{LifecycleEvent, StepCommand, StepEnvelope};
use super::outcome::{CheckReport, ExecuteReport};
use super::runner::run_step;

/// Background worker draining the step channel.
///
/// Each envelope is handled on its own task, so steps for different mods run
/// concurrently. Per-mod sequencing needs no extra discipline here: the saga
/// dispatches at most one step per instance at a time.
pub struct DispatchWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    pub fn spawn(
        mut step_rx: mpsc::UnboundedReceiver<StepEnvelope>,
        registry: Arc<OperationRegistry>,
        store: Arc<ModStore>,
        files: Arc<dyn WorkshopFileOps>,
        builds: Arc<dyn BuildQueue>,
        bus: LifecycleBus,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    envelope = step_rx.recv() => {
                        let Some(envelope) = envelope else { break };
                        let registry = registry.clone();
                        let store = store.clone();
                        let files = files.clone();
                        let builds = builds.clone();
                        let bus = bus.clone();
                        tokio::spawn(async move {
                            handle_step(envelope, registry, store, files, builds, bus).await;
                        });
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Signals the worker to stop and waits for it to finish. Steps already
    /// spawned keep running until their cancellation tokens fire.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| LifecycleError::Channel(format!("dispatch worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

async fn handle_step(
    envelope: StepEnvelope,
    registry: Arc<OperationRegistry>,
    store: Arc<ModStore>,
    files: Arc<dyn WorkshopFileOps>,
    builds: Arc<dyn BuildQueue>,
    bus: LifecycleBus,
) {
    let StepEnvelope {
        external_id,
        state,
        command,
        cancel,
    } = envelope;

    let result = match command {
        StepCommand::Download { kind } => {
            let id = external_id.clone();
            let completion_bus = bus.clone();
            run_step(
                &store,
                &bus,
                &external_id,
                state,
                registry.managed(kind).download(&external_id, &cancel),
                move |_| completion_bus.publish(LifecycleEvent::DownloadComplete { external_id: id }),
            )
            .await
        }
        StepCommand::Check { kind } => {
            let id = external_id.clone();
            let completion_bus = bus.clone();
            run_step(
                &store,
                &bus,
                &external_id,
                state,
                registry.managed(kind).check(&external_id),
                move |report: CheckReport| {
                    completion_bus.publish(LifecycleEvent::CheckComplete {
                        external_id: id,
                        intervention_required: report.intervention_required,
                        available_pbos: report.available_pbos,
                    })
                },
            )
            .await
        }
        StepCommand::Execute {
            kind,
            selected_pbos,
        } => {
            let id = external_id.clone();
            let completion_bus = bus.clone();
            run_step(
                &store,
                &bus,
                &external_id,
                state,
                registry
                    .managed(kind)
                    .execute(&external_id, &selected_pbos, &cancel),
                move |report: ExecuteReport| {
                    let event = match kind {
                        ManagedKind::Install => LifecycleEvent::InstallComplete {
                            external_id: id,
                            files_changed: report.files_changed,
                        },
                        ManagedKind::Update => LifecycleEvent::UpdateComplete {
                            external_id: id,
                            files_changed: report.files_changed,
                        },
                    };
                    completion_bus.publish(event)
                },
            )
            .await
        }
        StepCommand::ExecuteUninstall { previous_status } => {
            let id = external_id.clone();
            let completion_bus = bus.clone();
            run_step(
                &store,
                &bus,
                &external_id,
                state,
                registry
                    .uninstall()
                    .execute(&external_id, previous_status, &cancel),
                move |report: ExecuteReport| {
                    completion_bus.publish(LifecycleEvent::UninstallComplete {
                        external_id: id,
                        files_changed: report.files_changed,
                    })
                },
            )
            .await
        }
        StepCommand::Cleanup { files_changed } => {
            run_cleanup(
                &external_id,
                files_changed,
                &store,
                files.as_ref(),
                builds.as_ref(),
                &bus,
            )
            .await
        }
    };

    match result {
        Ok(()) => {}
        Err(LifecycleError::Cancelled) => {
            log::debug!("step for {} ended in cancellation", external_id);
        }
        Err(err) => {
            log::error!("step sequencing failed for {}: {}", external_id, err);
        }
    }
}

/// Terminal saga step. Never faults: collaborator errors are logged and
/// swallowed so the instance always reaches CleanupComplete.
async fn run_cleanup(
    external_id: &str,
    files_changed: bool,
    store: &ModStore,
    files: &dyn WorkshopFileOps,
    builds: &dyn BuildQueue,
    bus: &LifecycleBus,
) -> Result<()> {
    if store.find_latest(external_id).await.is_some() {
        let path = files.resolve_path(external_id);
        if let Err(err) = files.delete_working_directory(&path).await {
            log::warn!(
                "working directory cleanup for {} failed: {}",
                external_id,
                err
            );
        }
        if files_changed {
            if let Err(err) = builds.trigger_development_build().await {
                log::warn!(
                    "development build trigger for {} failed: {}",
                    external_id,
                    err
                );
            }
        }
    }
    bus.publish(LifecycleEvent::CleanupComplete {
        external_id: external_id.to_string(),
    })
}
