use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};

use crate::builds::{BuildQueue, DevBuildQueue};
use crate::config::LifecycleConfig;
use crate::core::{Result, WorkshopModRecord};
use crate::files::{DiskFileOps, WorkshopFileOps};
use crate::lifecycle::{
    DispatchWorker, LifecycleBus, LifecycleEvent, LifecycleGuard, OperationRegistry, SagaWorker,
};
use crate::steam::{SteamApiClient, SteamWorkshop};
use crate::store::ModStore;

struct WorkerSet {
    saga: SagaWorker,
    dispatcher: DispatchWorker,
}

/// Owner of the whole lifecycle machinery: store, guard, bus and the two
/// background workers.
///
/// Command methods mirror the guard; reads go straight to the store.
pub struct LifecycleOrchestrator {
    guard: LifecycleGuard,
    store: Arc<ModStore>,
    bus: LifecycleBus,
    workers: Mutex<Option<WorkerSet>>,
}

impl LifecycleOrchestrator {
    /// Builds the orchestrator with its production collaborators.
    pub fn new(config: LifecycleConfig) -> Result<Self> {
        let steam = Arc::new(SteamApiClient::new()?);
        let files = Arc::new(DiskFileOps::new(&config));
        let builds = Arc::new(DevBuildQueue::new(&config)?);
        Ok(Self::with_collaborators(config, steam, files, builds))
    }

    /// Builds the orchestrator around caller-supplied collaborators.
    pub fn with_collaborators(
        config: LifecycleConfig,
        steam: Arc<dyn SteamWorkshop>,
        files: Arc<dyn WorkshopFileOps>,
        builds: Arc<dyn BuildQueue>,
    ) -> Self {
        let store = Arc::new(ModStore::new());
        let (bus, saga_rx) = LifecycleBus::new(config.event_capacity);
        let (step_tx, step_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(OperationRegistry::new(
            store.clone(),
            files.clone(),
            config.download_attempts,
        ));
        let saga = SagaWorker::spawn(saga_rx, step_tx);
        let dispatcher = DispatchWorker::spawn(
            step_rx,
            registry,
            store.clone(),
            files,
            builds,
            bus.clone(),
        );
        let guard = LifecycleGuard::new(store.clone(), steam, bus.clone());

        Self {
            guard,
            store,
            bus,
            workers: Mutex::new(Some(WorkerSet { saga, dispatcher })),
        }
    }

    pub async fn install(&self, external_id: &str, root_mod: bool) -> Result<WorkshopModRecord> {
        self.guard.install(external_id, root_mod).await
    }

    pub async fn update(&self, external_id: &str) -> Result<WorkshopModRecord> {
        self.guard.update(external_id).await
    }

    pub async fn uninstall(&self, external_id: &str) -> Result<WorkshopModRecord> {
        self.guard.uninstall(external_id).await
    }

    pub async fn resolve_intervention(
        &self,
        external_id: &str,
        selected_pbos: Option<Vec<String>>,
    ) -> Result<()> {
        self.guard
            .resolve_intervention(external_id, selected_pbos)
            .await
    }

    pub async fn delete(&self, external_id: &str) -> Result<()> {
        self.guard.delete(external_id).await
    }

    /// Requests cooperative cancellation of the mod's active operation.
    /// A mod with nothing in flight ignores the request.
    pub fn cancel(&self, external_id: &str) -> Result<()> {
        self.bus.request_cancel(external_id)
    }

    pub async fn mod_record(&self, external_id: &str) -> Option<WorkshopModRecord> {
        self.store.find_latest(external_id).await
    }

    pub async fn list_mods(&self) -> Vec<WorkshopModRecord> {
        self.store.list().await
    }

    /// Observer tap of every published lifecycle event.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.bus.subscribe()
    }

    /// Direct store handle, for release tooling that flips PendingRelease
    /// statuses outside the saga.
    pub fn store(&self) -> Arc<ModStore> {
        self.store.clone()
    }

    /// Stops both workers and waits for them. In-flight steps are
    /// cancelled through their tokens. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let workers = self.workers.lock().await.take();
        if let Some(WorkerSet { saga, dispatcher }) = workers {
            saga.stop().await?;
            dispatcher.stop().await?;
        }
        Ok(())
    }
}
