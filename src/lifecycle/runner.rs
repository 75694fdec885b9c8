use std::future::Future;

use crate::core::{LifecycleError, ModStatus, Result};
use crate::store::ModStore;

use super::bus::LifecycleBus;
use super::executor::persist_error;
use super::messages::LifecycleEvent;
use super::outcome::StepOutcome;
use super::saga::SagaState;

pub(super) const CANCELLED_MESSAGE: &str = "Operation cancelled";

/// Drives one step to a terminal outcome.
///
/// `Success` hands the payload to `on_success`, typically a completion-event
/// publish; errors from the callback propagate. `Failure` and unexpected
/// `Err` finalize the record as Error and publish `Faulted`, then report
/// `Ok` since the fault was handled. `Cancelled` publishes `Faulted` and
/// returns `Err(Cancelled)` so callers keep unwinding.
pub async fn run_step<T, F, C>(
    store: &ModStore,
    bus: &LifecycleBus,
    external_id: &str,
    phase: SagaState,
    step: F,
    on_success: C,
) -> Result<()>
where
    F: Future<Output = Result<StepOutcome<T>>>,
    C: FnOnce(T) -> Result<()>,
{
    let outcome = match step.await {
        Ok(outcome) => outcome,
        Err(LifecycleError::Cancelled) => StepOutcome::Cancelled,
        Err(err) => {
            log::error!(
                "Unexpected error during {} for {}: {}",
                phase,
                external_id,
                err
            );
            let message = err.to_string();
            persist_error(store, external_id, &message).await?;
            publish_faulted(bus, external_id, phase, message)?;
            return Ok(());
        }
    };

    match outcome {
        StepOutcome::Success(value) => on_success(value),
        StepOutcome::Failure(message) => {
            log::error!("{} failed for {}: {}", phase, external_id, message);
            persist_error(store, external_id, &message).await?;
            publish_faulted(bus, external_id, phase, message)?;
            Ok(())
        }
        StepOutcome::Cancelled => {
            log::warn!("{} cancelled for {}", phase, external_id);
            persist_cancelled(store, external_id).await?;
            publish_faulted(bus, external_id, phase, CANCELLED_MESSAGE.to_string())?;
            Err(LifecycleError::Cancelled)
        }
    }
}

/// Fallback cancellation write. Executors persist a phase-specific message
/// before reporting `Cancelled`; this only fills in when no such write
/// happened, so the finer-grained message wins.
async fn persist_cancelled(store: &ModStore, external_id: &str) -> Result<()> {
    if let Some(mut record) = store.find_latest(external_id).await {
        if record.status != ModStatus::Error {
            record.set_status(ModStatus::Error, CANCELLED_MESSAGE);
            store.update(record).await?;
        }
    }
    Ok(())
}

fn publish_faulted(
    bus: &LifecycleBus,
    external_id: &str,
    phase: SagaState,
    message: String,
) -> Result<()> {
    bus.publish(LifecycleEvent::Faulted {
        external_id: external_id.to_string(),
        faulted_state: phase,
        error_message: message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkshopModRecord;
    use crate::lifecycle::messages::SagaInput;
    use tokio::sync::mpsc;

    async fn seeded(status: ModStatus, message: &str) -> ModStore {
        let store = ModStore::new();
        let mut record = WorkshopModRecord::new("123456", "Test Mod", false);
        record.set_status(status, message);
        store.insert(record).await.unwrap();
        store
    }

    fn faulted_message(input: Option<SagaInput>) -> String {
        match input {
            Some(SagaInput::Event(LifecycleEvent::Faulted { error_message, .. })) => error_message,
            other => panic!("expected Faulted event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn success_invokes_callback() {
        let store = seeded(ModStatus::Installing, "Downloading...").await;
        let (bus, mut saga_rx) = LifecycleBus::new(8);
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();

        run_step(
            &store,
            &bus,
            "123456",
            SagaState::InstallingDownloading,
            async { Ok(StepOutcome::Success(7u32)) },
            |value| {
                probe_tx.send(value).unwrap();
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(probe_rx.try_recv().ok(), Some(7));
        assert!(saga_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_writes_error_record_and_faults() {
        let store = seeded(ModStatus::Installing, "Downloading...").await;
        let (bus, mut saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::InstallingDownloading,
            async { Ok(StepOutcome::<()>::Failure("Download failed: quota".into())) },
            |_| panic!("callback must not run on failure"),
        )
        .await;

        assert!(result.is_ok());
        let record = store.find_latest("123456").await.unwrap();
        assert_eq!(record.status, ModStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some("Download failed: quota"));
        assert_eq!(
            faulted_message(saga_rx.try_recv().ok()),
            "Download failed: quota"
        );
    }

    #[tokio::test]
    async fn cancellation_unwinds_with_generic_message() {
        let store = seeded(ModStatus::Updating, "Downloading...").await;
        let (bus, mut saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::UpdatingDownloading,
            async { Ok(StepOutcome::<()>::Cancelled) },
            |_| panic!("callback must not run on cancel"),
        )
        .await;

        assert!(matches!(result, Err(LifecycleError::Cancelled)));
        let record = store.find_latest("123456").await.unwrap();
        assert_eq!(record.status, ModStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(faulted_message(saga_rx.try_recv().ok()), CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn cancellation_keeps_existing_error_message() {
        // The executor already wrote its phase-specific message.
        let store = seeded(ModStatus::Error, "Update download cancelled").await;
        let (bus, _saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::UpdatingDownloading,
            async { Ok(StepOutcome::<()>::Cancelled) },
            |_| Ok(()),
        )
        .await;

        assert!(matches!(result, Err(LifecycleError::Cancelled)));
        let record = store.find_latest("123456").await.unwrap();
        assert_eq!(
            record.error_message.as_deref(),
            Some("Update download cancelled")
        );
    }

    #[tokio::test]
    async fn cancelled_error_is_treated_as_cancellation() {
        let store = seeded(ModStatus::Uninstalling, "Uninstalling...").await;
        let (bus, _saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::Uninstalling,
            async { Err::<StepOutcome<()>, _>(LifecycleError::Cancelled) },
            |_| Ok(()),
        )
        .await;

        assert!(matches!(result, Err(LifecycleError::Cancelled)));
    }

    #[tokio::test]
    async fn missing_record_failure_still_faults() {
        let store = ModStore::new();
        let (bus, mut saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::Installing,
            async { Ok(StepOutcome::<()>::Failure("Mod 123456 not found".into())) },
            |_| Ok(()),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(
            faulted_message(saga_rx.try_recv().ok()),
            "Mod 123456 not found"
        );
    }

    #[tokio::test]
    async fn callback_errors_propagate() {
        let store = seeded(ModStatus::Installing, "Checking...").await;
        let (bus, _saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::InstallingChecking,
            async { Ok(StepOutcome::Success(())) },
            |_| Err(LifecycleError::Channel("saga input channel: closed".into())),
        )
        .await;

        assert!(matches!(result, Err(LifecycleError::Channel(_))));
    }

    #[tokio::test]
    async fn unexpected_error_is_contained() {
        let store = seeded(ModStatus::Installing, "Checking...").await;
        let (bus, mut saga_rx) = LifecycleBus::new(8);

        let result = run_step(
            &store,
            &bus,
            "123456",
            SagaState::InstallingChecking,
            async { Err::<StepOutcome<()>, _>(LifecycleError::Steam("api down".into())) },
            |_| Ok(()),
        )
        .await;

        assert!(result.is_ok());
        let record = store.find_latest("123456").await.unwrap();
        assert_eq!(record.status, ModStatus::Error);
        assert_eq!(
            faulted_message(saga_rx.try_recv().ok()),
            "Steam API error: api down"
        );
    }
}
