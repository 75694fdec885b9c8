use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator configuration
///
/// Paths default to directories under the working directory; production
/// deployments set all of them explicitly.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// steamcmd install root; downloaded items land under
    /// `steamapps/workshop/content/<app>/<item>` inside it.
    pub content_dir: PathBuf,

    /// The two parallel deployment trees files are copied into and
    /// deleted from.
    pub deployment_trees: [PathBuf; 2],

    /// Path to the steamcmd executable.
    pub steamcmd_path: PathBuf,

    /// Steam account used by steamcmd; anonymous login cannot fetch
    /// Arma 3 workshop items.
    pub steam_user: Option<String>,

    /// Password for the steamcmd account.
    pub steam_password: Option<String>,

    /// Bounded retry count for workshop downloads.
    pub download_attempts: u32,

    /// Pause between download attempts.
    pub download_retry_delay: Duration,

    /// Capacity of the broadcast channel observers subscribe to.
    pub event_capacity: usize,

    /// Base URL of the development build queue; unset disables the
    /// build trigger.
    pub build_endpoint: Option<String>,
}

impl LifecycleConfig {
    /// Create a configuration with development defaults
    pub fn new() -> Self {
        Self {
            content_dir: PathBuf::from("workshop"),
            deployment_trees: [PathBuf::from("repo/main"), PathBuf::from("repo/dev")],
            steamcmd_path: PathBuf::from("steamcmd"),
            steam_user: None,
            steam_password: None,
            download_attempts: 3,
            download_retry_delay: Duration::from_secs(10),
            event_capacity: 256,
            build_endpoint: None,
        }
    }

    /// Set the steamcmd install root
    pub fn with_content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.content_dir = dir.into();
        self
    }

    /// Set both deployment trees
    pub fn with_deployment_trees(
        mut self,
        primary: impl Into<PathBuf>,
        secondary: impl Into<PathBuf>,
    ) -> Self {
        self.deployment_trees = [primary.into(), secondary.into()];
        self
    }

    /// Set the steamcmd executable path
    pub fn with_steamcmd_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.steamcmd_path = path.into();
        self
    }

    /// Set the steamcmd login
    pub fn with_steam_login(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.steam_user = Some(user.into());
        self.steam_password = Some(password.into());
        self
    }

    /// Set the download retry count
    pub fn with_download_attempts(mut self, attempts: u32) -> Self {
        self.download_attempts = attempts;
        self
    }

    /// Set the pause between download attempts
    pub fn with_download_retry_delay(mut self, delay: Duration) -> Self {
        self.download_retry_delay = delay;
        self
    }

    /// Set the observer channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the development build queue endpoint
    pub fn with_build_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.build_endpoint = Some(endpoint.into());
        self
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::new()
    }
}
