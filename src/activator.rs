//! Ruleset activation: persist the compiled ruleset and reload nftables.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};
use crate::config::RulesetConfig;
use crate::error::SyncError;
use crate::fs_abstraction::{FileSystem, RealFileSystem};

#[cfg(test)]
use mockall::automock;

/// Something that can make a compiled ruleset live.
#[cfg_attr(test, automock)]
pub trait Activator: Send + Sync {
    fn activate(&self, ruleset: &str) -> Result<(), SyncError>;
}

/// Writes the ruleset file, then runs `nft flush ruleset` and `nft -f <path>`.
///
/// There is no rollback: if the load fails after a successful flush the host
/// stays without rules until the next successful activation. One way to get
/// there is a blacklist holding overlapping entries (`10.0.0.0/8` and
/// `10.1.2.3`): the set uses `flags interval` without `auto-merge`, so `nft`
/// rejects it with "conflicting intervals". The scheduler retries a failed
/// activation on its next cycle.
pub struct RuleActivator<E = RealCommandExecutor, F = RealFileSystem> {
    executor: E,
    fs: F,
    path: PathBuf,
    nft_path: String,
}

impl RuleActivator {
    pub fn new(config: &RulesetConfig) -> Self {
        Self::with_deps(RealCommandExecutor, RealFileSystem, config)
    }
}

impl<E: CommandExecutor, F: FileSystem> RuleActivator<E, F> {
    pub fn with_deps(executor: E, fs: F, config: &RulesetConfig) -> Self {
        Self {
            executor,
            fs,
            path: config.path.clone(),
            nft_path: config.nft_path.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_ruleset(&self, ruleset: &str) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).map_err(|e| {
                SyncError::FileSystem(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        self.fs.write(&self.path, ruleset.as_bytes()).map_err(|e| {
            SyncError::FileSystem(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), bytes = ruleset.len(), "Ruleset written");
        Ok(())
    }

    fn run_nft(&self, args: &[&str]) -> Result<(), SyncError> {
        let output = self
            .executor
            .execute(&self.nft_path, &args_to_strings(args))
            .map_err(|e| SyncError::Firewall(format!("{:#}", e)))?;

        if !output.success {
            return Err(SyncError::Firewall(format!(
                "nft {} failed: {}",
                args.join(" "),
                output.failure_reason()
            )));
        }
        Ok(())
    }
}

impl<E: CommandExecutor, F: FileSystem> Activator for RuleActivator<E, F> {
    fn activate(&self, ruleset: &str) -> Result<(), SyncError> {
        self.write_ruleset(ruleset)?;

        self.run_nft(&["flush", "ruleset"])?;

        let path = self.path.to_string_lossy();
        self.run_nft(&["-f", &path])?;

        info!(path = %self.path.display(), "Ruleset activated");
        Ok(())
    }
}

/// Check if running as root
pub fn check_root() -> Result<(), SyncError> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(SyncError::Permission(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has the CAP_NET_ADMIN capability."
                .to_string(),
        ));
    }
    Ok(())
}
