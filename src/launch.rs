use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PrestartError;

/// The directory holding `bin/` and `lib/` of an extracted runtime.
///
/// macOS runtimes are bundles with a `Contents/Home` structure.
pub fn java_home(runtime_dir: &Path) -> PathBuf {
    let macos_home = runtime_dir.join("Contents").join("Home");
    if macos_home.is_dir() {
        return macos_home;
    }
    runtime_dir.to_path_buf()
}

pub fn java_bin(runtime_dir: &Path) -> PathBuf {
    java_home(runtime_dir).join("bin").join("java")
}

/// Runs `java [jvm_args] -jar <jar>` and waits for it to exit.
pub fn launch(java: &Path, jar: &Path, jvm_args: &[String]) -> Result<(), PrestartError> {
    tracing::debug!("starting {} -jar {}", java.display(), jar.display());

    let status = Command::new(java)
        .args(jvm_args)
        .arg("-jar")
        .arg(jar)
        .status()
        .map_err(|source| PrestartError::LaunchSpawn {
            program: java.to_path_buf(),
            source,
        })?;

    if !status.success() {
        return Err(PrestartError::LaunchExit {
            program: java.to_path_buf(),
            status,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn java_bin_returns_linux_path_by_default() {
        let dir = tempdir().unwrap();
        let path = java_bin(dir.path());
        assert_eq!(path, dir.path().join("bin").join("java"));
    }

    #[test]
    fn java_home_uses_macos_bundle_when_present() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("Contents").join("Home");
        std::fs::create_dir_all(home.join("bin")).unwrap();

        assert_eq!(java_home(dir.path()), home);
        assert_eq!(java_bin(dir.path()), home.join("bin").join("java"));
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let dir = tempdir().unwrap();
        let err = launch(&dir.path().join("bin/java"), &dir.path().join("app.jar"), &[])
            .unwrap_err();
        assert!(matches!(err, PrestartError::LaunchSpawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn passes_jvm_args_before_jar() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("args.txt");
        let script = format!("echo \"$@\" > '{}'", out.display());
        let jvm_args = vec!["-c".to_string(), script, "sh".to_string()];

        launch(Path::new("/bin/sh"), Path::new("/base/Launcher.jar"), &jvm_args).unwrap();

        let args = std::fs::read_to_string(&out).unwrap();
        assert_eq!(args.trim(), "-jar /base/Launcher.jar");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_error() {
        let jvm_args = vec!["-c".to_string(), "exit 3".to_string()];

        let err = launch(Path::new("/bin/sh"), Path::new("app.jar"), &jvm_args).unwrap_err();

        assert!(matches!(err, PrestartError::LaunchExit { status, .. } if status.code() == Some(3)));
    }
}
