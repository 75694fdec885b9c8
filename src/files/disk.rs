use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_recursion::async_recursion;
use async_trait::async_trait;
use futures::future::try_join;
use tokio::fs;
use tokio::process::Command;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleConfig;
use crate::core::{LifecycleError, Result};

use super::WorkshopFileOps;

pub const ARMA3_APP_ID: &str = "107410";

/// Disk-backed implementation: steamcmd child process for downloads,
/// `tokio::fs` for everything else.
pub struct DiskFileOps {
    content_dir: PathBuf,
    deployment_trees: [PathBuf; 2],
    steamcmd_path: PathBuf,
    steam_user: Option<String>,
    steam_password: Option<String>,
    retry_delay: Duration,
}

impl DiskFileOps {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            content_dir: config.content_dir.clone(),
            deployment_trees: config.deployment_trees.clone(),
            steamcmd_path: config.steamcmd_path.clone(),
            steam_user: config.steam_user.clone(),
            steam_password: config.steam_password.clone(),
            retry_delay: config.download_retry_delay,
        }
    }

    async fn run_steamcmd(&self, external_id: &str, cancel: &CancellationToken) -> Result<()> {
        let mut command = Command::new(&self.steamcmd_path);
        command.arg("+force_install_dir").arg(&self.content_dir);
        match (&self.steam_user, &self.steam_password) {
            (Some(user), Some(password)) => {
                command.arg("+login").arg(user).arg(password);
            }
            _ => {
                command.arg("+login").arg("anonymous");
            }
        }
        command
            .arg("+workshop_download_item")
            .arg(ARMA3_APP_ID)
            .arg(external_id)
            .arg("validate")
            .arg("+quit")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command.spawn()?;
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(LifecycleError::Cancelled)
            }
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(LifecycleError::Download(format!(
                        "steamcmd exited with {} for item {}",
                        status, external_id
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl WorkshopFileOps for DiskFileOps {
    fn resolve_path(&self, external_id: &str) -> PathBuf {
        self.content_dir
            .join("steamapps")
            .join("workshop")
            .join("content")
            .join(ARMA3_APP_ID)
            .join(external_id)
    }

    async fn discover_archive_files(&self, path: &Path) -> Result<Vec<String>> {
        let found = collect_archive_files(path).await?;
        let mut seen = HashSet::new();
        for (name, _) in &found {
            if !seen.insert(name.to_lowercase()) {
                return Err(LifecycleError::FileOps(format!(
                    "duplicate archive file name '{}' under {}",
                    name,
                    path.display()
                )));
            }
        }
        if found.is_empty() {
            return Err(LifecycleError::FileOps(format!(
                "no archive files found under {}",
                path.display()
            )));
        }
        let mut names: Vec<String> = found.into_iter().map(|(name, _)| name).collect();
        names.sort();
        Ok(names)
    }

    async fn download_with_retries(
        &self,
        external_id: &str,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let attempts = attempts.max(1);
        let mut last_error =
            LifecycleError::Download(format!("no download attempt made for item {}", external_id));
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(LifecycleError::Cancelled);
            }
            match self.run_steamcmd(external_id, cancel).await {
                Ok(()) => return Ok(()),
                Err(LifecycleError::Cancelled) => return Err(LifecycleError::Cancelled),
                Err(err) => {
                    log::warn!(
                        "download attempt {}/{} for item {} failed: {}",
                        attempt,
                        attempts,
                        external_id,
                        err
                    );
                    last_error = err;
                }
            }
            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LifecycleError::Cancelled),
                    _ = sleep(self.retry_delay) => {}
                }
            }
        }
        Err(last_error)
    }

    async fn copy_to_deployment_trees(&self, source: &Path, files: &[String]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        // Discovery guarantees names are unique case-insensitively, so a
        // lowercase index is enough to relocate nested files.
        let index: HashMap<String, PathBuf> = collect_archive_files(source)
            .await?
            .into_iter()
            .map(|(name, path)| (name.to_lowercase(), path))
            .collect();
        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let path = index.get(&file.to_lowercase()).ok_or_else(|| {
                LifecycleError::FileOps(format!(
                    "archive file '{}' not found under {}",
                    file,
                    source.display()
                ))
            })?;
            sources.push((file.clone(), path.clone()));
        }
        let [first, second] = &self.deployment_trees;
        try_join(
            copy_into_tree(first, &sources),
            copy_into_tree(second, &sources),
        )
        .await?;
        Ok(())
    }

    async fn delete_from_deployment_trees(&self, files: &[String]) -> Result<()> {
        for tree in &self.deployment_trees {
            for file in files {
                remove_existing_file(&tree.join(file)).await?;
            }
        }
        Ok(())
    }

    async fn copy_root_to_deployment_trees(&self, source: &Path, external_id: &str) -> Result<()> {
        let [first, second] = &self.deployment_trees;
        try_join(
            copy_dir(source, &root_target(first, external_id)),
            copy_dir(source, &root_target(second, external_id)),
        )
        .await?;
        Ok(())
    }

    async fn delete_root_from_deployment_trees(&self, external_id: &str) -> Result<()> {
        for tree in &self.deployment_trees {
            remove_existing_dir(&root_target(tree, external_id)).await?;
        }
        Ok(())
    }

    async fn delete_working_directory(&self, path: &Path) -> Result<()> {
        remove_existing_dir(path).await
    }
}

/// Root mods deploy as a whole directory named after the workshop item.
fn root_target(tree: &Path, external_id: &str) -> PathBuf {
    tree.join(format!("@{}", external_id))
}

async fn collect_archive_files(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    walk_archive_files(path, &mut found).await?;
    Ok(found)
}

#[async_recursion]
async fn walk_archive_files(dir: &Path, found: &mut Vec<(String, PathBuf)>) -> Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            walk_archive_files(&path, found).await?;
        } else if is_archive_file(&path) {
            found.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    Ok(())
}

fn is_archive_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pbo"))
        .unwrap_or(false)
}

async fn copy_into_tree(tree: &Path, sources: &[(String, PathBuf)]) -> Result<()> {
    fs::create_dir_all(tree).await?;
    for (name, source) in sources {
        fs::copy(source, tree.join(name)).await?;
    }
    Ok(())
}

#[async_recursion]
async fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target).await?;
    let mut entries = fs::read_dir(source).await?;
    while let Some(entry) = entries.next_entry().await? {
        let from = entry.path();
        let to = target.join(entry.file_name());
        if entry.file_type().await?.is_dir() {
            copy_dir(&from, &to).await?;
        } else {
            fs::copy(&from, &to).await?;
        }
    }
    Ok(())
}

async fn remove_existing_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn remove_existing_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
