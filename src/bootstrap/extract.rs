use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::error::PrestartError;
use crate::progress::{copy_with_progress, CopyError, Reporter};

#[cfg(unix)]
const FILE_MODE: u32 = 0o744;
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Detects the format from the archive's leading magic bytes.
    pub fn sniff(path: &Path) -> Result<Option<Self>, PrestartError> {
        let mut magic = [0u8; 4];
        let mut file = File::open(path).map_err(|e| PrestartError::fs(path, e))?;
        let mut read = 0;
        while read < magic.len() {
            match file.read(&mut magic[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) => return Err(PrestartError::fs(path, e)),
            }
        }
        Ok(match &magic[..read] {
            [0x1f, 0x8b, ..] => Some(ArchiveFormat::TarGz),
            [b'P', b'K', 0x03, 0x04] | [b'P', b'K', 0x05, 0x06] => Some(ArchiveFormat::Zip),
            _ => None,
        })
    }
}

/// What an extraction wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub dirs: usize,
    pub symlinks: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Unpacks `archive` into `dest`, creating `dest` if needed.
///
/// Each regular file is reported to `reporter` under `"{label} {entry name}"`.
/// A failure part-way leaves whatever was already written in `dest`.
pub fn extract(
    format: ArchiveFormat,
    archive: &Path,
    dest: &Path,
    label: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<ExtractSummary, PrestartError> {
    tracing::debug!("extracting {} ({:?}) into {}", archive.display(), format, dest.display());
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest, label, reporter, cancel),
        ArchiveFormat::Zip => extract_zip(archive, dest, label, reporter, cancel),
    }
}

pub fn extract_tar_gz(
    archive: &Path,
    dest: &Path,
    label: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<ExtractSummary, PrestartError> {
    let file = File::open(archive).map_err(|e| PrestartError::fs(archive, e))?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    let out = Output::new(archive, dest, reporter, cancel)?;

    let corrupt = |source: std::io::Error| PrestartError::CorruptArchive {
        archive: archive.to_path_buf(),
        source,
    };

    let mut summary = ExtractSummary::default();
    for entry in tar.entries().map_err(corrupt)? {
        if cancel.is_cancelled() {
            return Err(PrestartError::Cancelled);
        }
        let mut entry = entry.map_err(corrupt)?;
        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let rel = entry.path().map_err(corrupt)?.into_owned();
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            out.dir(&safe_join(dest, &rel, &raw_name)?, &raw_name)?;
            summary.dirs += 1;
        } else if kind.is_file() {
            let target = safe_join(dest, &rel, &raw_name)?;
            if target == dest {
                summary.skipped += 1;
                continue;
            }
            let size = entry.header().size().map_err(corrupt)?;
            let written = out.file(
                &mut entry,
                &target,
                &raw_name,
                &format!("{label} {raw_name}"),
                Some(size),
            )?;
            summary.files += 1;
            summary.bytes += written;
        } else if kind.is_symlink() {
            let target = safe_join(dest, &rel, &raw_name)?;
            let link = entry
                .link_name()
                .map_err(corrupt)?
                .map(|l| l.into_owned())
                .ok_or_else(|| PrestartError::UnsafeEntry { entry: raw_name.clone() })?;
            if out.symlink(&target, &link, &raw_name)? {
                summary.symlinks += 1;
            } else {
                summary.skipped += 1;
            }
        } else {
            tracing::debug!("skipping {raw_name} ({kind:?})");
            summary.skipped += 1;
        }
    }

    Ok(summary)
}

pub fn extract_zip(
    archive: &Path,
    dest: &Path,
    label: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<ExtractSummary, PrestartError> {
    let file = File::open(archive).map_err(|e| PrestartError::fs(archive, e))?;
    let zip_err = |source: zip::result::ZipError| PrestartError::Zip {
        archive: archive.to_path_buf(),
        source,
    };
    let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;
    let out = Output::new(archive, dest, reporter, cancel)?;

    let mut summary = ExtractSummary::default();
    for i in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(PrestartError::Cancelled);
        }
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        let raw_name = entry.name().to_string();
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| PrestartError::UnsafeEntry { entry: raw_name.clone() })?;
        let target = safe_join(dest, &rel, &raw_name)?;

        if entry.is_dir() {
            out.dir(&target, &raw_name)?;
            summary.dirs += 1;
        } else if entry.unix_mode().is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut link = String::new();
            entry
                .read_to_string(&mut link)
                .map_err(|source| PrestartError::CorruptArchive {
                    archive: archive.to_path_buf(),
                    source,
                })?;
            if out.symlink(&target, Path::new(&link), &raw_name)? {
                summary.symlinks += 1;
            } else {
                summary.skipped += 1;
            }
        } else {
            let size = entry.size();
            let written = out.file(
                &mut entry,
                &target,
                &raw_name,
                &format!("{label} {raw_name}"),
                Some(size),
            )?;
            summary.files += 1;
            summary.bytes += written;
        }
    }

    Ok(summary)
}

/// Joins an archive-relative path onto `root`, rejecting anything that could
/// land outside of it.
fn safe_join(root: &Path, rel: &Path, raw_name: &str) -> Result<PathBuf, PrestartError> {
    let mut out = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PrestartError::UnsafeEntry {
                    entry: raw_name.to_string(),
                })
            }
        }
    }
    Ok(out)
}

/// Where one archive is being written. Every write is checked against the
/// real (symlink-resolved) location of the destination.
struct Output<'a> {
    archive: &'a Path,
    root: PathBuf,
    reporter: &'a dyn Reporter,
    cancel: &'a CancellationToken,
}

impl<'a> Output<'a> {
    fn new(
        archive: &'a Path,
        dest: &Path,
        reporter: &'a dyn Reporter,
        cancel: &'a CancellationToken,
    ) -> Result<Self, PrestartError> {
        create_dir(dest)?;
        let root = dest.canonicalize().map_err(|e| PrestartError::fs(dest, e))?;
        Ok(Output {
            archive,
            root,
            reporter,
            cancel,
        })
    }

    /// Fails unless the nearest existing ancestor of `path` (or `path`
    /// itself) really lives under the destination.
    fn check_inside(&self, path: &Path, raw_name: &str) -> Result<(), PrestartError> {
        let mut existing = path;
        loop {
            match existing.canonicalize() {
                Ok(real) if real.starts_with(&self.root) => return Ok(()),
                Ok(_) => break,
                Err(_) => match existing.parent() {
                    Some(parent) => existing = parent,
                    None => break,
                },
            }
        }
        Err(PrestartError::UnsafeEntry {
            entry: raw_name.to_string(),
        })
    }

    fn check_parent(&self, target: &Path, raw_name: &str) -> Result<(), PrestartError> {
        match target.parent() {
            Some(parent) => self.check_inside(parent, raw_name),
            None => Err(PrestartError::UnsafeEntry {
                entry: raw_name.to_string(),
            }),
        }
    }

    fn dir(&self, target: &Path, raw_name: &str) -> Result<(), PrestartError> {
        self.check_inside(target, raw_name)?;
        create_dir(target)
    }

    fn file(
        &self,
        reader: &mut dyn Read,
        target: &Path,
        raw_name: &str,
        label: &str,
        size: Option<u64>,
    ) -> Result<u64, PrestartError> {
        self.check_parent(target, raw_name)?;
        ensure_parent(target)?;
        remove_link(target)?;
        let mut file = File::create(target).map_err(|e| PrestartError::fs(target, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(FILE_MODE))
                .map_err(|e| PrestartError::fs(target, e))?;
        }

        self.reporter.start(label, size);
        let copied = copy_with_progress(reader, &mut file, self.reporter, self.cancel);
        self.reporter.finish();

        copied.map_err(|e| match e {
            CopyError::Read(source) => PrestartError::CorruptArchive {
                archive: self.archive.to_path_buf(),
                source,
            },
            CopyError::Write(source) => PrestartError::fs(target, source),
            CopyError::Cancelled => PrestartError::Cancelled,
        })
    }

    /// Creates a symlink at `target` pointing to `link`. Returns false when the
    /// platform has no symlinks and the entry was skipped.
    fn symlink(&self, target: &Path, link: &Path, raw_name: &str) -> Result<bool, PrestartError> {
        self.check_parent(target, raw_name)?;
        ensure_parent(target)?;
        let base = match target.parent() {
            Some(parent) => parent
                .canonicalize()
                .map_err(|e| PrestartError::fs(parent, e))?,
            None => self.root.clone(),
        };
        if !resolves_within(&self.root, &base, link) {
            return Err(PrestartError::UnsafeEntry {
                entry: raw_name.to_string(),
            });
        }

        #[cfg(unix)]
        {
            remove_link(target)?;
            std::os::unix::fs::symlink(link, target).map_err(|e| PrestartError::fs(target, e))?;
            Ok(true)
        }

        #[cfg(not(unix))]
        {
            tracing::warn!("skipping symlink {raw_name}: not supported on this platform");
            Ok(false)
        }
    }
}

fn create_dir(path: &Path) -> Result<(), PrestartError> {
    std::fs::create_dir_all(path).map_err(|e| PrestartError::fs(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIR_MODE))
            .map_err(|e| PrestartError::fs(path, e))?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), PrestartError> {
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            create_dir(parent)?;
        }
    }
    Ok(())
}

/// Removes a symlink sitting at `path` so the next write replaces it instead
/// of following it.
fn remove_link(path: &Path) -> Result<(), PrestartError> {
    match path.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::remove_file(path).map_err(|e| PrestartError::fs(path, e))
        }
        _ => Ok(()),
    }
}

/// Resolves `link` relative to `base` and checks it stays in `root`.
///
/// Both `root` and `base` must already be canonical. Components that are
/// existing symlinks on disk are followed, so a chain of links that only
/// looks contained is caught.
fn resolves_within(root: &Path, base: &Path, link: &Path) -> bool {
    if link.is_absolute() || !base.starts_with(root) {
        return false;
    }
    let mut current = base.to_path_buf();
    let mut components = link.components().peekable();
    while let Some(component) = components.next() {
        match component {
            Component::Normal(part) => {
                current.push(part);
                let is_link = current
                    .symlink_metadata()
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false);
                if is_link && components.peek().is_some() {
                    match current.canonicalize() {
                        Ok(real) => current = real,
                        Err(_) => return false,
                    }
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
        if !current.starts_with(root) {
            return false;
        }
    }
    true
}
