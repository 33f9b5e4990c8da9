pub mod download;
pub mod extract;
pub mod merge;
pub mod presence;

#[cfg(test)]
mod fixtures;

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::HumanBytes;
use tokio_util::sync::CancellationToken;

use crate::config::{display_name, Dependency, LauncherConfig};
use crate::error::{ErrorKind, PrestartError, Step, StepError};
use crate::launch;
use crate::progress::Reporter;

use self::download::DownloadTarget;
use self::extract::ArchiveFormat;
use self::presence::NamePattern;

/// Present in the runtime home while a merge is in flight.
pub const MERGE_PENDING: &str = ".prestarter-merge-pending";
const STAGING_PREFIX: &str = ".staging-";
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Work actually performed by [`Bootstrap::prepare`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrepareReport {
    pub fetched: usize,
    pub extracted: usize,
    pub merged: bool,
}

impl PrepareReport {
    pub fn is_noop(&self) -> bool {
        self.fetched == 0 && self.extracted == 0 && !self.merged
    }
}

#[derive(Debug)]
pub struct Prepared {
    pub java: PathBuf,
    pub launcher: PathBuf,
    pub report: PrepareReport,
}

pub struct Bootstrap<'a> {
    config: &'a LauncherConfig,
    client: reqwest::Client,
    reporter: &'a dyn Reporter,
    cancel: CancellationToken,
    retry_delay: Duration,
}

impl<'a> Bootstrap<'a> {
    pub fn new(
        config: &'a LauncherConfig,
        reporter: &'a dyn Reporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            reporter,
            cancel,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Makes sure the launcher jar, the runtime and the toolkit are on disk and
    /// the toolkit is merged into the runtime. Steps that are already done are
    /// skipped, so a second run does no network or extraction work.
    pub async fn prepare(&self) -> Result<Prepared, StepError> {
        let java_dir = self.config.java_dir();
        std::fs::create_dir_all(&java_dir).map_err(|e| {
            StepError::new(Step::Check, java_dir.display().to_string(), PrestartError::fs(&java_dir, e))
        })?;
        remove_stale_staging(&java_dir);

        let mut report = PrepareReport::default();

        let launcher = self.config.launcher_path();
        let downloads = [
            (self.config.launcher_url.as_str(), launcher.clone()),
            (self.config.runtime.url.as_str(), self.config.archive_path(&self.config.runtime)),
            (self.config.toolkit.url.as_str(), self.config.archive_path(&self.config.toolkit)),
        ];
        for (url, dest) in downloads {
            if self.ensure_downloaded(url, &dest).await? {
                report.fetched += 1;
            }
        }

        for dep in self.config.dependencies() {
            if self.ensure_extracted(dep)? {
                report.extracted += 1;
            }
        }

        report.merged = self.ensure_merged()?;

        Ok(Prepared {
            java: launch::java_bin(&self.config.runtime_dir()),
            launcher,
            report,
        })
    }

    async fn ensure_downloaded(&self, url: &str, dest: &Path) -> Result<bool, StepError> {
        let name = display_name(dest);
        if dest.exists() {
            tracing::info!("file '{name}' found");
            return Ok(false);
        }

        let target = DownloadTarget {
            url: url.to_string(),
            dest: dest.to_path_buf(),
            label: format!("Downloading '{name}':"),
            user_agent: self.config.user_agent.clone(),
        };
        let attempts = self.config.fetch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match download::fetch(&self.client, &target, self.reporter, &self.cancel).await {
                Ok(bytes) => {
                    tracing::info!("file '{name}' downloaded ({})", HumanBytes(bytes));
                    return Ok(true);
                }
                Err(err) => {
                    discard(&download::part_path(dest));
                    if !err.is_transient() || attempt >= attempts {
                        return Err(StepError::new(Step::Fetch, name, err));
                    }
                    tracing::warn!("download of '{name}' failed ({attempt}/{attempts}): {err}");
                    let delay = self.retry_delay * attempt;
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(StepError::new(Step::Fetch, name, PrestartError::Cancelled));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn ensure_extracted(&self, dep: &Dependency) -> Result<bool, StepError> {
        let final_dir = self.config.extracted_dir(dep);
        if final_dir.exists() {
            tracing::info!("directory '{}' found", final_dir.display());
            return Ok(false);
        }

        let archive = self.config.archive_path(dep);
        let name = display_name(&archive);
        let fail = |err: PrestartError| {
            if err.kind() == ErrorKind::Format {
                tracing::warn!("removing unusable archive '{name}', it will be downloaded again");
                discard(&archive);
            }
            StepError::new(Step::Extract, name.clone(), err)
        };

        let java_dir = self.config.java_dir();
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&java_dir)
            .map_err(|e| fail(PrestartError::fs(&java_dir, e)))?;

        let format = match ArchiveFormat::sniff(&archive) {
            Ok(Some(found)) if found != dep.format => {
                tracing::warn!("'{name}' looks like {found:?} rather than {:?}", dep.format);
                found
            }
            _ => dep.format,
        };

        let summary = extract::extract(
            format,
            &archive,
            staging.path(),
            &format!("Unpacking '{name}':"),
            self.reporter,
            &self.cancel,
        )
        .map_err(fail)?;
        promote(staging.path(), &final_dir).map_err(fail)?;

        tracing::info!(
            "archive '{name}' unpacked ({} files, {} directories, {} links, {})",
            summary.files,
            summary.dirs,
            summary.symlinks,
            HumanBytes(summary.bytes)
        );
        if summary.skipped > 0 {
            tracing::debug!("{} entries of '{name}' skipped", summary.skipped);
        }
        Ok(true)
    }

    fn ensure_merged(&self) -> Result<bool, StepError> {
        let home = launch::java_home(&self.config.runtime_dir());
        let lib = home.join("lib");
        let pending = home.join(MERGE_PENDING);
        let toolkit_dir = self.config.toolkit_dir();
        let toolkit_name = display_name(&toolkit_dir);

        let pattern = NamePattern::new(&self.config.toolkit_pattern)
            .map_err(|e| StepError::new(Step::Check, self.config.toolkit_pattern.clone(), e))?;

        if pending.exists() {
            tracing::warn!("previous copy of '{toolkit_name}' did not finish, copying again");
        } else if lib_has_match(&lib, &pattern)
            .map_err(|e| StepError::new(Step::Check, lib.display().to_string(), e))?
        {
            tracing::info!("JavaFX modules found");
            return Ok(false);
        }

        let merge_err = |e: PrestartError| StepError::new(Step::Merge, toolkit_name.clone(), e);
        std::fs::write(&pending, b"").map_err(|e| merge_err(PrestartError::fs(&pending, e)))?;
        let summary = merge::merge_into(
            &toolkit_dir,
            &home,
            &format!("Copying files '{toolkit_name}':"),
            self.reporter,
            &self.cancel,
        )
        .map_err(merge_err)?;
        std::fs::remove_file(&pending).map_err(|e| merge_err(PrestartError::fs(&pending, e)))?;

        tracing::info!(
            "JavaFX modules copied into '{}' ({} files in {} directories, {})",
            home.display(),
            summary.files,
            summary.dirs,
            HumanBytes(summary.bytes)
        );
        Ok(true)
    }
}

/// Presence check on the runtime's lib directory. A runtime without one has
/// simply not been merged yet.
fn lib_has_match(lib: &Path, pattern: &NamePattern) -> Result<bool, PrestartError> {
    match presence::has_match(lib, pattern) {
        Err(PrestartError::Filesystem { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::debug!("{} does not exist yet", lib.display());
            Ok(false)
        }
        other => other,
    }
}

/// Moves freshly extracted content from `staging` onto `final_dir`.
///
/// Archives usually wrap everything in one versioned top-level directory;
/// that directory is renamed directly so the result has the configured name.
fn promote(staging: &Path, final_dir: &Path) -> Result<(), PrestartError> {
    let entries: Vec<_> = std::fs::read_dir(staging)
        .map_err(|e| PrestartError::fs(staging, e))?
        .filter_map(|e| e.ok())
        .collect();

    let single_dir = match entries.as_slice() {
        [only] if only.file_type().map(|t| t.is_dir()).unwrap_or(false) => Some(only.path()),
        _ => None,
    };
    let source = single_dir.unwrap_or_else(|| staging.to_path_buf());

    std::fs::rename(&source, final_dir).map_err(|e| PrestartError::fs(final_dir, e))
}

fn remove_stale_staging(java_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(java_dir) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            tracing::debug!("removing leftover {}", entry.path().display());
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                tracing::warn!("could not remove {}: {e}", entry.path().display());
            }
        }
    }
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("could not remove {}: {e}", path.display()),
    }
}
