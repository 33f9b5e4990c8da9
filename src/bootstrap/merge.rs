use std::fs::File;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::error::PrestartError;
use crate::progress::{copy_with_progress, CopyError, Reporter};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub files: usize,
    pub dirs: usize,
    pub links: usize,
    pub bytes: u64,
}

/// Recursively copies `src` into `dst`, overwriting files that already exist.
///
/// Directories are created with the source's permission bits and symlinks
/// are recreated as symlinks, never descended into. Siblings are visited in
/// name order. The first error aborts the walk and nothing that was already
/// copied is rolled back.
pub fn merge_into(
    src: &Path,
    dst: &Path,
    label: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<MergeSummary, PrestartError> {
    tracing::debug!("merging {} into {}", src.display(), dst.display());
    let mut summary = MergeSummary::default();
    merge_dir(src, dst, label, reporter, cancel, &mut summary)?;
    Ok(summary)
}

fn merge_dir(
    src: &Path,
    dst: &Path,
    label: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
    summary: &mut MergeSummary,
) -> Result<(), PrestartError> {
    let meta = std::fs::metadata(src).map_err(|e| PrestartError::fs(src, e))?;
    std::fs::create_dir_all(dst).map_err(|e| PrestartError::fs(dst, e))?;
    std::fs::set_permissions(dst, meta.permissions()).map_err(|e| PrestartError::fs(dst, e))?;
    summary.dirs += 1;

    let mut entries = std::fs::read_dir(src)
        .map_err(|e| PrestartError::fs(src, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PrestartError::fs(src, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(PrestartError::Cancelled);
        }
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let meta = std::fs::symlink_metadata(&from).map_err(|e| PrestartError::fs(&from, e))?;

        if meta.file_type().is_symlink() {
            copy_link(&from, &to)?;
            summary.links += 1;
        } else if meta.is_dir() {
            merge_dir(&from, &to, label, reporter, cancel, summary)?;
        } else {
            summary.bytes += copy_file(&from, &to, meta.len(), label, reporter, cancel)?;
            summary.files += 1;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(from: &Path, to: &Path) -> Result<(), PrestartError> {
    let target = std::fs::read_link(from).map_err(|e| PrestartError::fs(from, e))?;
    if let Ok(existing) = to.symlink_metadata() {
        if existing.is_dir() {
            std::fs::remove_dir_all(to).map_err(|e| PrestartError::fs(to, e))?;
        } else {
            std::fs::remove_file(to).map_err(|e| PrestartError::fs(to, e))?;
        }
    }
    std::os::unix::fs::symlink(&target, to).map_err(|e| PrestartError::fs(to, e))
}

#[cfg(not(unix))]
fn copy_link(from: &Path, _to: &Path) -> Result<(), PrestartError> {
    tracing::warn!("skipping symlink {}: not supported on this platform", from.display());
    Ok(())
}

fn copy_file(
    from: &Path,
    to: &Path,
    len: u64,
    label: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<u64, PrestartError> {
    let mut source = File::open(from).map_err(|e| PrestartError::fs(from, e))?;
    let mut dest = File::create(to).map_err(|e| PrestartError::fs(to, e))?;

    let name = from.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    reporter.start(&format!("{label} {name}"), Some(len));
    let copied = copy_with_progress(&mut source, &mut dest, reporter, cancel);
    reporter.finish();

    copied.map_err(|e| match e {
        CopyError::Read(source) => PrestartError::fs(from, source),
        CopyError::Write(source) => PrestartError::fs(to, source),
        CopyError::Cancelled => PrestartError::Cancelled,
    })
}
