use std::path::{Path, PathBuf};

use crate::bootstrap::extract::ArchiveFormat;

pub const PROJECT_NAME: &str = "Your Project";
pub const PROJECT_HELLO_TEXT: &str = "Your project hello text";
pub const LAUNCHER_URL: &str = "https://urltoyourproject.com/Launcher.jar";
pub const USER_AGENT: &str = "launcher-prestarter-unix";

const JRE_URL_BASE: &str = "https://api.adoptium.net/v3/binary/latest/21/ga";
const JFX_URL_BASE: &str = "https://download2.gluonhq.com/openjfx/21.0.1";

const JAVA_DIR: &str = "java";
const JRE_DIR: &str = "jdk-21.0.1+12-jre";
const JFX_DIR: &str = "javafx-sdk-21.0.1";
const TOOLKIT_PATTERN: &str = "javafx";
const LOG_FILE: &str = "launcher-prestarter-unix.log";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetOs {
    Linux,
    MacOs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetArch {
    X86_64,
    Aarch64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub os: TargetOs,
    pub arch: TargetArch,
}

impl Target {
    pub fn current() -> Self {
        let os = if cfg!(target_os = "macos") {
            TargetOs::MacOs
        } else {
            TargetOs::Linux
        };
        let arch = if cfg!(target_arch = "aarch64") {
            TargetArch::Aarch64
        } else {
            TargetArch::X86_64
        };
        Self { os, arch }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "linux-x64" => Some(Self { os: TargetOs::Linux, arch: TargetArch::X86_64 }),
            "linux-aarch64" => Some(Self { os: TargetOs::Linux, arch: TargetArch::Aarch64 }),
            "macos-x64" => Some(Self { os: TargetOs::MacOs, arch: TargetArch::X86_64 }),
            "macos-aarch64" => Some(Self { os: TargetOs::MacOs, arch: TargetArch::Aarch64 }),
            _ => None,
        }
    }

    pub fn adoptium_os(&self) -> &'static str {
        match self.os {
            TargetOs::Linux => "linux",
            TargetOs::MacOs => "mac",
        }
    }

    pub fn adoptium_arch(&self) -> &'static str {
        match self.arch {
            TargetArch::X86_64 => "x64",
            TargetArch::Aarch64 => "aarch64",
        }
    }

    /// Platform fragment used in Gluon's JavaFX SDK file names.
    pub fn gluon_platform(&self) -> &'static str {
        match (self.os, self.arch) {
            (TargetOs::Linux, TargetArch::X86_64) => "linux-x64",
            (TargetOs::Linux, TargetArch::Aarch64) => "linux-aarch64",
            (TargetOs::MacOs, TargetArch::X86_64) => "osx-x64",
            (TargetOs::MacOs, TargetArch::Aarch64) => "osx-aarch64",
        }
    }

    /// Suffix of the local archive names, e.g. `linux_x64`.
    pub fn archive_suffix(&self) -> String {
        let os = match self.os {
            TargetOs::Linux => "linux",
            TargetOs::MacOs => "macos",
        };
        format!("{os}_{}", self.adoptium_arch())
    }
}

/// One archive to fetch and unpack into its own directory.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub url: String,
    /// File name of the downloaded archive inside the base directory.
    pub archive_name: String,
    pub format: ArchiveFormat,
    /// Name of the extracted directory inside the java directory.
    pub dir_name: String,
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub base_dir: PathBuf,
    pub target: Target,
    pub launcher_url: String,
    pub runtime: Dependency,
    pub toolkit: Dependency,
    /// Matched against the runtime's `lib` entries to detect a finished merge.
    pub toolkit_pattern: String,
    pub user_agent: String,
    pub fetch_attempts: u32,
    pub jvm_args: Vec<String>,
}

impl LauncherConfig {
    pub fn new(base_dir: PathBuf, target: Target) -> Self {
        let suffix = target.archive_suffix();
        let runtime = Dependency {
            url: format!(
                "{JRE_URL_BASE}/{}/{}/jre/hotspot/normal/eclipse?project=jdk",
                target.adoptium_os(),
                target.adoptium_arch()
            ),
            archive_name: format!("jre_{suffix}.tar.gz"),
            format: ArchiveFormat::TarGz,
            dir_name: JRE_DIR.to_string(),
        };
        let toolkit = Dependency {
            url: format!(
                "{JFX_URL_BASE}/openjfx-21.0.1_{}_bin-sdk.zip",
                target.gluon_platform()
            ),
            archive_name: format!("jfx_{suffix}.zip"),
            format: ArchiveFormat::Zip,
            dir_name: JFX_DIR.to_string(),
        };

        Self {
            base_dir,
            target,
            launcher_url: LAUNCHER_URL.to_string(),
            runtime,
            toolkit,
            toolkit_pattern: TOOLKIT_PATTERN.to_string(),
            user_agent: USER_AGENT.to_string(),
            fetch_attempts: 3,
            jvm_args: Vec::new(),
        }
    }

    pub fn default_base_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".minecraftlauncher").join(PROJECT_NAME))
    }

    pub fn java_dir(&self) -> PathBuf {
        self.base_dir.join(JAVA_DIR)
    }

    pub fn dependencies(&self) -> [&Dependency; 2] {
        [&self.runtime, &self.toolkit]
    }

    pub fn archive_path(&self, dep: &Dependency) -> PathBuf {
        self.base_dir.join(&dep.archive_name)
    }

    pub fn extracted_dir(&self, dep: &Dependency) -> PathBuf {
        self.java_dir().join(&dep.dir_name)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.extracted_dir(&self.runtime)
    }

    pub fn toolkit_dir(&self) -> PathBuf {
        self.extracted_dir(&self.toolkit)
    }

    /// Local path of the launcher jar, named after the URL's last segment.
    pub fn launcher_path(&self) -> PathBuf {
        self.base_dir.join(file_name_from_url(&self.launcher_url))
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(LOG_FILE)
    }
}

fn file_name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "launcher.jar",
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
