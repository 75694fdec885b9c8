use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a workshop mod record.
///
/// `Installing`, `Updating`, `Uninstalling` and `InterventionRequired` mark
/// an operation in flight; the guard rejects new lifecycle commands while one
/// of them holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModStatus {
    Uninstalled,
    Installing,
    InterventionRequired,
    Installed,
    InstalledPendingRelease,
    Updating,
    UpdatedPendingRelease,
    UninstalledPendingRelease,
    Uninstalling,
    Error,
}

impl ModStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Installing | Self::Updating | Self::Uninstalling | Self::InterventionRequired
        )
    }
}

impl fmt::Display for ModStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninstalled => "Uninstalled",
            Self::Installing => "Installing",
            Self::InterventionRequired => "InterventionRequired",
            Self::Installed => "Installed",
            Self::InstalledPendingRelease => "InstalledPendingRelease",
            Self::Updating => "Updating",
            Self::UpdatedPendingRelease => "UpdatedPendingRelease",
            Self::UninstalledPendingRelease => "UninstalledPendingRelease",
            Self::Uninstalling => "Uninstalling",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One workshop item under lifecycle management.
///
/// A fresh record is created on every accepted install; uninstalled records
/// stay behind as history and are never reused. `status_message` and
/// `error_message` are mutually exclusive: `set_status` routes the message to
/// `error_message` for `Error` and to `status_message` for everything else,
/// clearing the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkshopModRecord {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub root_mod: bool,
    pub status: ModStatus,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    /// Archive files currently deployed. Original case is kept; comparisons
    /// are case-insensitive. Always empty for root mods.
    pub pbos: Vec<String>,
    /// Archive files discovered on disk, awaiting operator selection.
    pub available_pbos: Vec<String>,
    /// Stamped on successful update and uninstall, never on install.
    pub last_updated_locally: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkshopModRecord {
    pub fn new(external_id: impl Into<String>, name: impl Into<String>, root_mod: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            name: name.into(),
            root_mod,
            status: ModStatus::Uninstalled,
            status_message: None,
            error_message: None,
            pbos: Vec::new(),
            available_pbos: Vec::new(),
            last_updated_locally: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the status and routes the message to the matching side.
    pub fn set_status(&mut self, status: ModStatus, message: impl Into<String>) {
        self.status = status;
        if status == ModStatus::Error {
            self.error_message = Some(message.into());
            self.status_message = None;
        } else {
            self.status_message = Some(message.into());
            self.error_message = None;
        }
    }

    pub fn record_available_files(&mut self, files: &[String]) {
        self.available_pbos = files.to_vec();
    }

    pub fn set_pbos(&mut self, files: &[String]) {
        self.pbos = files.to_vec();
    }

    pub fn clear_pbos(&mut self) {
        self.pbos.clear();
    }

    pub fn stamp_updated(&mut self) {
        self.last_updated_locally = Some(Utc::now());
    }
}

fn lowered(files: &[String]) -> HashSet<String> {
    files.iter().map(|f| f.to_lowercase()).collect()
}

/// True when the two name sets differ under case-insensitive comparison.
pub fn pbo_sets_differ(a: &[String], b: &[String]) -> bool {
    lowered(a) != lowered(b)
}

/// Names in `previous` that are absent from `selected`, case-insensitively.
/// Keeps the casing from `previous` since that is what was deployed.
pub fn removed_pbos(previous: &[String], selected: &[String]) -> Vec<String> {
    let keep = lowered(selected);
    previous
        .iter()
        .filter(|name| !keep.contains(&name.to_lowercase()))
        .cloned()
        .collect()
}

/// Names claimed by both sets, case-insensitively. Casing comes from `a`.
pub fn shared_pbos(a: &[String], b: &[String]) -> Vec<String> {
    let theirs = lowered(b);
    a.iter()
        .filter(|name| theirs.contains(&name.to_lowercase()))
        .cloned()
        .collect()
}
