use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event, info_span};

use crate::core::{LifecycleError, Result};

use super::executor::ManagedKind;
use super::messages::{LifecycleEvent, SagaInput, StepCommand, StepEnvelope};

/// Phases of an in-flight lifecycle operation. A mod with no instance is
/// idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    InstallingDownloading,
    InstallingChecking,
    InstallingAwaitingIntervention,
    Installing,
    UpdatingDownloading,
    UpdatingChecking,
    UpdatingAwaitingIntervention,
    Updating,
    Uninstalling,
    Cleanup,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InstallingDownloading => "InstallingDownloading",
            Self::InstallingChecking => "InstallingChecking",
            Self::InstallingAwaitingIntervention => "InstallingAwaitingIntervention",
            Self::Installing => "Installing",
            Self::UpdatingDownloading => "UpdatingDownloading",
            Self::UpdatingChecking => "UpdatingChecking",
            Self::UpdatingAwaitingIntervention => "UpdatingAwaitingIntervention",
            Self::Updating => "Updating",
            Self::Uninstalling => "Uninstalling",
            Self::Cleanup => "Cleanup",
        };
        f.write_str(name)
    }
}

/// Result of applying one event to an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Create an instance in the given state and dispatch the command.
    Begin(SagaState, StepCommand),
    /// Move the existing instance to the given state and dispatch.
    Advance(SagaState, StepCommand),
    /// Move the existing instance without dispatching anything.
    Hold(SagaState),
    /// Remove the instance.
    Finish,
    /// Drop the event, leaving the instance untouched.
    Reject(&'static str),
}

/// The transition table. Pure so the whole saga surface stays testable
/// without channels or tasks.
///
/// A `Faulted` event terminates the instance straight away; the step runner
/// has already written the Error record, and no cleanup runs so a partial
/// download can be resumed by re-issuing the command.
pub fn transition(current: Option<SagaState>, event: &LifecycleEvent) -> Transition {
    use LifecycleEvent as E;
    use SagaState as S;

    match (current, event) {
        (None, E::InstallRequested { .. }) => Transition::Begin(
            S::InstallingDownloading,
            StepCommand::Download {
                kind: ManagedKind::Install,
            },
        ),
        (None, E::UpdateRequested { .. }) => Transition::Begin(
            S::UpdatingDownloading,
            StepCommand::Download {
                kind: ManagedKind::Update,
            },
        ),
        (
            None,
            E::UninstallRequested {
                previous_status, ..
            },
        ) => Transition::Begin(
            S::Uninstalling,
            StepCommand::ExecuteUninstall {
                previous_status: *previous_status,
            },
        ),
        (
            Some(_),
            E::InstallRequested { .. } | E::UpdateRequested { .. } | E::UninstallRequested { .. },
        ) => Transition::Reject("operation already in progress"),
        (None, _) => Transition::Reject("no active operation"),

        (Some(_), E::Faulted { .. }) => Transition::Finish,

        (Some(S::InstallingDownloading), E::DownloadComplete { .. }) => Transition::Advance(
            S::InstallingChecking,
            StepCommand::Check {
                kind: ManagedKind::Install,
            },
        ),
        (
            Some(S::InstallingChecking),
            E::CheckComplete {
                intervention_required,
                available_pbos,
                ..
            },
        ) => {
            if *intervention_required {
                Transition::Hold(S::InstallingAwaitingIntervention)
            } else {
                Transition::Advance(
                    S::Installing,
                    StepCommand::Execute {
                        kind: ManagedKind::Install,
                        selected_pbos: available_pbos.clone(),
                    },
                )
            }
        }
        (
            Some(S::InstallingAwaitingIntervention),
            E::InterventionResolved { selected_pbos, .. },
        ) => Transition::Advance(
            S::Installing,
            StepCommand::Execute {
                kind: ManagedKind::Install,
                selected_pbos: selected_pbos.clone(),
            },
        ),
        (Some(S::Installing), E::InstallComplete { files_changed, .. }) => Transition::Advance(
            S::Cleanup,
            StepCommand::Cleanup {
                files_changed: *files_changed,
            },
        ),

        (Some(S::UpdatingDownloading), E::DownloadComplete { .. }) => Transition::Advance(
            S::UpdatingChecking,
            StepCommand::Check {
                kind: ManagedKind::Update,
            },
        ),
        (
            Some(S::UpdatingChecking),
            E::CheckComplete {
                intervention_required,
                available_pbos,
                ..
            },
        ) => {
            if *intervention_required {
                Transition::Hold(S::UpdatingAwaitingIntervention)
            } else {
                Transition::Advance(
                    S::Updating,
                    StepCommand::Execute {
                        kind: ManagedKind::Update,
                        selected_pbos: available_pbos.clone(),
                    },
                )
            }
        }
        (Some(S::UpdatingAwaitingIntervention), E::InterventionResolved { selected_pbos, .. }) => {
            Transition::Advance(
                S::Updating,
                StepCommand::Execute {
                    kind: ManagedKind::Update,
                    selected_pbos: selected_pbos.clone(),
                },
            )
        }
        (Some(S::Updating), E::UpdateComplete { files_changed, .. }) => Transition::Advance(
            S::Cleanup,
            StepCommand::Cleanup {
                files_changed: *files_changed,
            },
        ),

        (Some(S::Uninstalling), E::UninstallComplete { files_changed, .. }) => Transition::Advance(
            S::Cleanup,
            StepCommand::Cleanup {
                files_changed: *files_changed,
            },
        ),

        (Some(S::Cleanup), E::CleanupComplete { .. }) => Transition::Finish,

        (Some(_), _) => Transition::Reject("unexpected event for the active phase"),
    }
}

struct SagaInstance {
    state: SagaState,
    cancel: CancellationToken,
}

/// Background worker owning every saga instance.
///
/// Single consumer of the saga input channel, so per-mod transitions are
/// strictly sequential. Steps themselves run elsewhere; this task only maps
/// events to transitions and hands envelopes to the dispatcher.
pub struct SagaWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SagaWorker {
    pub fn spawn(
        mut saga_rx: mpsc::UnboundedReceiver<SagaInput>,
        step_tx: mpsc::UnboundedSender<StepEnvelope>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            let mut instances: HashMap<String, SagaInstance> = HashMap::new();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    input = saga_rx.recv() => {
                        match input {
                            Some(input) => apply_input(&mut instances, &step_tx, input),
                            None => break,
                        }
                    }
                }
            }
            // Unblock any step still parked on its token.
            for instance in instances.values() {
                instance.cancel.cancel();
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| LifecycleError::Channel(format!("saga worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for SagaWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

fn apply_input(
    instances: &mut HashMap<String, SagaInstance>,
    step_tx: &mpsc::UnboundedSender<StepEnvelope>,
    input: SagaInput,
) {
    match input {
        SagaInput::Event(event) => apply_event(instances, step_tx, event),
        SagaInput::Cancel { external_id } => {
            let span = info_span!("saga.cancel", mod_id = %external_id);
            let _enter = span.enter();
            match instances.get(&external_id) {
                Some(instance) => {
                    instance.cancel.cancel();
                    event!(Level::INFO, state = %instance.state, "cancellation requested");
                }
                None => event!(Level::DEBUG, "no active operation to cancel"),
            }
        }
    }
}

fn apply_event(
    instances: &mut HashMap<String, SagaInstance>,
    step_tx: &mpsc::UnboundedSender<StepEnvelope>,
    event: LifecycleEvent,
) {
    let external_id = event.external_id().to_string();
    let span = info_span!("saga.event", mod_id = %external_id, event = event.name());
    let _enter = span.enter();

    let current = instances.get(&external_id).map(|instance| instance.state);
    match transition(current, &event) {
        Transition::Begin(state, command) => {
            let cancel = CancellationToken::new();
            instances.insert(
                external_id.clone(),
                SagaInstance {
                    state,
                    cancel: cancel.clone(),
                },
            );
            event!(Level::INFO, state = %state, "saga started");
            dispatch(instances, step_tx, external_id, state, command, cancel);
        }
        Transition::Advance(state, command) => {
            let Some(instance) = instances.get_mut(&external_id) else {
                return;
            };
            instance.state = state;
            let cancel = instance.cancel.clone();
            event!(Level::DEBUG, state = %state, "saga advanced");
            dispatch(instances, step_tx, external_id, state, command, cancel);
        }
        Transition::Hold(state) => {
            if let Some(instance) = instances.get_mut(&external_id) {
                instance.state = state;
                event!(Level::INFO, state = %state, "saga waiting");
            }
        }
        Transition::Finish => {
            instances.remove(&external_id);
            event!(Level::INFO, "saga finished");
        }
        Transition::Reject(reason) => {
            event!(Level::WARN, reason = reason, "saga event dropped");
        }
    }
}

fn dispatch(
    instances: &mut HashMap<String, SagaInstance>,
    step_tx: &mpsc::UnboundedSender<StepEnvelope>,
    external_id: String,
    state: SagaState,
    command: StepCommand,
    cancel: CancellationToken,
) {
    let envelope = StepEnvelope {
        external_id: external_id.clone(),
        state,
        command,
        cancel,
    };
    if step_tx.send(envelope).is_err() {
        event!(Level::ERROR, "step channel closed, abandoning saga instance");
        if let Some(instance) = instances.remove(&external_id) {
            instance.cancel.cancel();
        }
    }
}
