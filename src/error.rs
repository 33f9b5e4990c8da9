use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrestartError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("download directory {} does not exist", .0.display())]
    MissingParent(PathBuf),

    #[error("archive {} is unreadable: {source}", archive.display())]
    CorruptArchive {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip archive {} is unreadable: {source}", archive.display())]
    Zip {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive entry '{entry}' points outside the destination directory")]
    UnsafeEntry { entry: String },

    #[error("{}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to start {}: {source}", program.display())]
    LaunchSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with {status}", program.display())]
    LaunchExit { program: PathBuf, status: ExitStatus },

    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification used by the orchestrator to pick a failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, transport or HTTP failures while fetching.
    Acquisition,
    /// Corrupt or hostile archive contents.
    Format,
    Filesystem,
    Pattern,
    Launch,
    Cancelled,
}

impl PrestartError {
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrestartError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PrestartError::Request { .. } | PrestartError::HttpStatus { .. } => {
                ErrorKind::Acquisition
            }
            PrestartError::CorruptArchive { .. }
            | PrestartError::Zip { .. }
            | PrestartError::UnsafeEntry { .. } => ErrorKind::Format,
            PrestartError::MissingParent(_) | PrestartError::Filesystem { .. } => {
                ErrorKind::Filesystem
            }
            PrestartError::InvalidPattern { .. } => ErrorKind::Pattern,
            PrestartError::LaunchSpawn { .. } | PrestartError::LaunchExit { .. } => {
                ErrorKind::Launch
            }
            PrestartError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether repeating the same fetch could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PrestartError::Request { source, .. } => !source.is_builder(),
            PrestartError::HttpStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// The pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Extract,
    Merge,
    Check,
    Launch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Fetch => "fetch",
            Step::Extract => "extract",
            Step::Merge => "merge",
            Step::Check => "check",
            Step::Launch => "launch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{step} of '{target}' failed")]
pub struct StepError {
    pub step: Step,
    pub target: String,
    #[source]
    pub source: PrestartError,
}

impl StepError {
    pub fn new(step: Step, target: impl Into<String>, source: PrestartError) -> Self {
        Self {
            step,
            target: target.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let corrupt = PrestartError::CorruptArchive {
            archive: PathBuf::from("a.tar.gz"),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header"),
        };
        assert_eq!(corrupt.kind(), ErrorKind::Format);
        assert_eq!(
            PrestartError::UnsafeEntry { entry: "../x".into() }.kind(),
            ErrorKind::Format
        );
        assert_eq!(
            PrestartError::MissingParent(PathBuf::from("/nope")).kind(),
            ErrorKind::Filesystem
        );
        assert_eq!(PrestartError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn only_server_errors_are_transient() {
        let server = PrestartError::HttpStatus {
            url: "http://x".into(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        let client = PrestartError::HttpStatus {
            url: "http://x".into(),
            status: reqwest::StatusCode::NOT_FOUND,
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!PrestartError::Cancelled.is_transient());
    }

    #[test]
    fn step_error_names_step_and_target() {
        let err = StepError::new(
            Step::Extract,
            "jre_linux_x64.tar.gz",
            PrestartError::UnsafeEntry { entry: "/etc/passwd".into() },
        );
        assert_eq!(err.to_string(), "extract of 'jre_linux_x64.tar.gz' failed");
    }
}
