use tokio::sync::{broadcast, mpsc};

use crate::core::{LifecycleError, Result};

use super::messages::{LifecycleEvent, SagaInput};

/// Producer handle for the saga's input channel, with a broadcast tap so
/// observers can follow every published event.
#[derive(Clone)]
pub struct LifecycleBus {
    saga_tx: mpsc::UnboundedSender<SagaInput>,
    events_tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<SagaInput>) {
        let (saga_tx, saga_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(capacity);
        (Self { saga_tx, events_tx }, saga_rx)
    }

    /// Sends an event to the saga and mirrors it on the observer tap.
    pub fn publish(&self, event: LifecycleEvent) -> Result<()> {
        // Nobody subscribed is fine; the tap is best effort.
        let _ = self.events_tx.send(event.clone());
        self.saga_tx
            .send(SagaInput::Event(event))
            .map_err(|err| LifecycleError::Channel(format!("saga input channel: {}", err)))
    }

    /// Asks the saga worker to cancel the mod's active instance, if any.
    pub fn request_cancel(&self, external_id: &str) -> Result<()> {
        self.saga_tx
            .send(SagaInput::Cancel {
                external_id: external_id.to_string(),
            })
            .map_err(|err| LifecycleError::Channel(format!("saga input channel: {}", err)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }
}
