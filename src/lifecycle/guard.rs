use std::sync::Arc;

use crate::core::{LifecycleError, ModStatus, Result, WorkshopModRecord, shared_pbos};
use crate::steam::SteamWorkshop;
use crate::store::ModStore;

use super::bus::LifecycleBus;
use super::messages::LifecycleEvent;

/// Caller-facing entry points of the lifecycle workflow.
///
/// Every command is validated against the record's current status before
/// anything is published; a rejected command leaves the record untouched.
/// Acceptance mutates the record to its "Preparing" state, so a second
/// command for the same mod is turned away even before the saga picks the
/// first one up.
pub struct LifecycleGuard {
    store: Arc<ModStore>,
    steam: Arc<dyn SteamWorkshop>,
    bus: LifecycleBus,
}

impl LifecycleGuard {
    pub fn new(store: Arc<ModStore>, steam: Arc<dyn SteamWorkshop>, bus: LifecycleBus) -> Self {
        Self { store, steam, bus }
    }

    /// Admits an install, creating a fresh record for the workshop item.
    /// History rows must all be Uninstalled for the item to be installable
    /// again.
    pub async fn install(&self, external_id: &str, root_mod: bool) -> Result<WorkshopModRecord> {
        if let Some(blocking) = self
            .store
            .find_all(external_id)
            .await
            .into_iter()
            .find(|record| record.status != ModStatus::Uninstalled)
        {
            return Err(LifecycleError::Rejected(format!(
                "Mod {} already has a record with status {}",
                external_id, blocking.status
            )));
        }

        let item = self.steam.get_mod_info(external_id).await?;

        let mut record = WorkshopModRecord::new(external_id, item.name, root_mod);
        record.set_status(ModStatus::Installing, "Preparing to install...");
        self.store.insert(record.clone()).await?;
        log::info!("install accepted for {} ({})", external_id, record.name);

        self.bus.publish(LifecycleEvent::InstallRequested {
            external_id: external_id.to_string(),
        })?;
        Ok(record)
    }

    /// Admits an update when the workshop copy is newer than the local one.
    /// A record never updated locally is always considered stale.
    pub async fn update(&self, external_id: &str) -> Result<WorkshopModRecord> {
        let mut record = self.require_record(external_id).await?;
        reject_in_flight(&record)?;

        let item = self.steam.get_mod_info(external_id).await?;
        if let Some(local) = record.last_updated_locally {
            if item.updated_at <= local {
                return Err(LifecycleError::Rejected(format!(
                    "Mod {} is already up to date",
                    external_id
                )));
            }
        }

        record.set_status(ModStatus::Updating, "Preparing to update...");
        self.store.update(record.clone()).await?;
        log::info!("update accepted for {} ({})", external_id, record.name);

        self.bus.publish(LifecycleEvent::UpdateRequested {
            external_id: external_id.to_string(),
        })?;
        Ok(record)
    }

    /// Admits an uninstall unless one of the record's deployed files is
    /// still claimed by another Installed record.
    pub async fn uninstall(&self, external_id: &str) -> Result<WorkshopModRecord> {
        let mut record = self.require_record(external_id).await?;
        if record.status == ModStatus::Uninstalled {
            return Err(LifecycleError::Rejected(format!(
                "Mod {} is not installed",
                external_id
            )));
        }
        reject_in_flight(&record)?;

        if !record.pbos.is_empty() {
            for other in self.store.list().await {
                if other.id == record.id || other.status != ModStatus::Installed {
                    continue;
                }
                let shared = shared_pbos(&record.pbos, &other.pbos);
                if !shared.is_empty() {
                    return Err(LifecycleError::Rejected(format!(
                        "Cannot uninstall {}: {} still deployed by '{}'",
                        external_id,
                        shared.join(", "),
                        other.name
                    )));
                }
            }
        }

        let previous_status = record.status;
        record.set_status(ModStatus::Uninstalling, "Preparing to uninstall...");
        self.store.update(record.clone()).await?;
        log::info!("uninstall accepted for {} ({})", external_id, record.name);

        self.bus.publish(LifecycleEvent::UninstallRequested {
            external_id: external_id.to_string(),
            previous_status,
        })?;
        Ok(record)
    }

    /// Forwards the operator's file selection to a saga parked in an
    /// AwaitingIntervention state. The record is not touched here; the
    /// Execute step applies the selection.
    pub async fn resolve_intervention(
        &self,
        external_id: &str,
        selected_pbos: Option<Vec<String>>,
    ) -> Result<()> {
        let record = self.require_record(external_id).await?;
        if record.status != ModStatus::InterventionRequired {
            return Err(LifecycleError::Rejected(format!(
                "Mod {} has no pending intervention",
                external_id
            )));
        }

        self.bus.publish(LifecycleEvent::InterventionResolved {
            external_id: external_id.to_string(),
            selected_pbos: selected_pbos.unwrap_or_default(),
        })
    }

    /// Hard-deletes the newest record, gated on it being fully uninstalled.
    pub async fn delete(&self, external_id: &str) -> Result<()> {
        let record = self.require_record(external_id).await?;
        if record.status != ModStatus::Uninstalled {
            return Err(LifecycleError::Rejected(format!(
                "Mod {} must be uninstalled before deletion (status {})",
                external_id, record.status
            )));
        }
        self.store.delete(record.id).await?;
        log::info!("record deleted for {} ({})", external_id, record.name);
        Ok(())
    }

    async fn require_record(&self, external_id: &str) -> Result<WorkshopModRecord> {
        self.store
            .find_latest(external_id)
            .await
            .ok_or_else(|| LifecycleError::NotFound(format!("Mod {} not found", external_id)))
    }
}

fn reject_in_flight(record: &WorkshopModRecord) -> Result<()> {
    if record.status.is_in_flight() {
        return Err(LifecycleError::Rejected(format!(
            "Mod {} already has an operation in progress ({})",
            record.external_id, record.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::messages::SagaInput;
    use crate::steam::WorkshopItem;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct StaticSteam {
        item: WorkshopItem,
    }

    #[async_trait]
    impl SteamWorkshop for StaticSteam {
        async fn get_mod_info(&self, _external_id: &str) -> Result<WorkshopItem> {
            Ok(self.item.clone())
        }
    }

    fn guard_with_steam(updated_at: chrono::DateTime<Utc>) -> (LifecycleGuard, Arc<ModStore>, UnboundedReceiver<SagaInput>) {
        let store = Arc::new(ModStore::new());
        let (bus, saga_rx) = LifecycleBus::new(8);
        let steam = Arc::new(StaticSteam {
            item: WorkshopItem {
                name: "Test Mod".to_string(),
                updated_at,
            },
        });
        (
            LifecycleGuard::new(store.clone(), steam, bus),
            store,
            saga_rx,
        )
    }

    #[tokio::test]
    async fn install_creates_preparing_record_and_publishes() {
        let (guard, store, mut saga_rx) = guard_with_steam(Utc::now());

        let record = guard.install("123456", false).await.unwrap();
        assert_eq!(record.status, ModStatus::Installing);
        assert_eq!(
            record.status_message.as_deref(),
            Some("Preparing to install...")
        );
        assert_eq!(record.name, "Test Mod");
        assert!(store.find_latest("123456").await.is_some());
        assert!(matches!(
            saga_rx.try_recv(),
            Ok(SagaInput::Event(LifecycleEvent::InstallRequested { .. }))
        ));
    }

    #[tokio::test]
    async fn install_rejects_while_a_live_record_exists() {
        let (guard, store, mut saga_rx) = guard_with_steam(Utc::now());

        let mut existing = WorkshopModRecord::new("123456", "Test Mod", false);
        existing.set_status(ModStatus::Installed, "Installed");
        store.insert(existing).await.unwrap();

        let result = guard.install("123456", false).await;
        assert!(matches!(result, Err(LifecycleError::Rejected(_))));
        assert!(saga_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_rejects_fresh_local_copy() {
        let stale_remote = Utc::now() - Duration::hours(2);
        let (guard, store, mut saga_rx) = guard_with_steam(stale_remote);

        let mut record = WorkshopModRecord::new("123456", "Test Mod", false);
        record.set_status(ModStatus::Installed, "Installed");
        record.last_updated_locally = Some(Utc::now());
        store.insert(record).await.unwrap();

        let result = guard.update("123456").await;
        assert!(matches!(result, Err(LifecycleError::Rejected(_))));
        assert!(saga_rx.try_recv().is_err());

        let untouched = store.find_latest("123456").await.unwrap();
        assert_eq!(untouched.status, ModStatus::Installed);
    }

    #[tokio::test]
    async fn update_accepts_never_updated_record() {
        let (guard, store, _saga_rx) = guard_with_steam(Utc::now());

        let mut record = WorkshopModRecord::new("123456", "Test Mod", false);
        record.set_status(ModStatus::Installed, "Installed");
        store.insert(record).await.unwrap();

        let accepted = guard.update("123456").await.unwrap();
        assert_eq!(accepted.status, ModStatus::Updating);
        assert_eq!(
            accepted.status_message.as_deref(),
            Some("Preparing to update...")
        );
    }

    #[tokio::test]
    async fn uninstall_rejects_shared_pbos() {
        let (guard, store, mut saga_rx) = guard_with_steam(Utc::now());

        let mut a = WorkshopModRecord::new("A", "Mod A", false);
        a.set_status(ModStatus::Installed, "Installed");
        a.set_pbos(&["shared.pbo".to_string(), "a.pbo".to_string()]);
        let mut b = WorkshopModRecord::new("B", "Mod B", false);
        b.set_status(ModStatus::Installed, "Installed");
        b.set_pbos(&["SHARED.pbo".to_string()]);
        store.insert(a.clone()).await.unwrap();
        store.insert(b).await.unwrap();

        let result = guard.uninstall("A").await;
        assert!(matches!(result, Err(LifecycleError::Rejected(_))));
        assert!(saga_rx.try_recv().is_err());
        assert_eq!(
            store.find_latest("A").await.unwrap().status,
            ModStatus::Installed
        );
    }

    #[tokio::test]
    async fn uninstall_carries_previous_status() {
        let (guard, store, mut saga_rx) = guard_with_steam(Utc::now());

        let mut record = WorkshopModRecord::new("123456", "Test Mod", false);
        record.set_status(ModStatus::InstalledPendingRelease, "Installed pending");
        store.insert(record).await.unwrap();

        guard.uninstall("123456").await.unwrap();
        match saga_rx.try_recv() {
            Ok(SagaInput::Event(LifecycleEvent::UninstallRequested {
                previous_status, ..
            })) => assert_eq!(previous_status, ModStatus::InstalledPendingRelease),
            other => panic!("expected UninstallRequested, got {:?}", other),
        }
        assert_eq!(
            store.find_latest("123456").await.unwrap().status,
            ModStatus::Uninstalling
        );
    }

    #[tokio::test]
    async fn intervention_requires_waiting_record() {
        let (guard, store, mut saga_rx) = guard_with_steam(Utc::now());

        let mut record = WorkshopModRecord::new("123456", "Test Mod", false);
        record.set_status(ModStatus::Installed, "Installed");
        store.insert(record.clone()).await.unwrap();

        let rejected = guard.resolve_intervention("123456", None).await;
        assert!(matches!(rejected, Err(LifecycleError::Rejected(_))));

        let mut waiting = record;
        waiting.set_status(ModStatus::InterventionRequired, "Select PBOs to install");
        store.update(waiting).await.unwrap();

        guard
            .resolve_intervention("123456", Some(vec!["a.pbo".to_string()]))
            .await
            .unwrap();
        match saga_rx.try_recv() {
            Ok(SagaInput::Event(LifecycleEvent::InterventionResolved {
                selected_pbos, ..
            })) => assert_eq!(selected_pbos, vec!["a.pbo".to_string()]),
            other => panic!("expected InterventionResolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_requires_uninstalled_status() {
        let (guard, store, _saga_rx) = guard_with_steam(Utc::now());

        let mut record = WorkshopModRecord::new("123456", "Test Mod", false);
        record.set_status(ModStatus::Error, "Download failed: timed out");
        store.insert(record.clone()).await.unwrap();

        assert!(matches!(
            guard.delete("123456").await,
            Err(LifecycleError::Rejected(_))
        ));

        let mut done = record;
        done.set_status(ModStatus::Uninstalled, "Uninstalled");
        store.update(done).await.unwrap();
        guard.delete("123456").await.unwrap();
        assert!(store.find_latest("123456").await.is_none());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let (guard, _store, _saga_rx) = guard_with_steam(Utc::now());
        assert!(matches!(
            guard.update("999").await,
            Err(LifecycleError::NotFound(_))
        ));
        assert!(matches!(
            guard.uninstall("999").await,
            Err(LifecycleError::NotFound(_))
        ));
        assert!(matches!(
            guard.delete("999").await,
            Err(LifecycleError::NotFound(_))
        ));
    }
}
