mod banner;
mod bootstrap;
mod cli;
mod config;
mod error;
mod launch;
mod progress;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::HumanBytes;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use bootstrap::{download, Bootstrap, MERGE_PENDING};
use cli::{Cli, Command, Options};
use config::{display_name, LauncherConfig, Target};
use error::{Step, StepError};
use progress::{BarReporter, NoopReporter, Reporter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli.options)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, cli.options.yes, true).await?,
        Command::Prepare => run(config, cli.options.yes, false).await?,
        Command::Clean => {
            init_logging(None)?;
            run_clean(&config)?;
        }
        Command::Info => run_info(&config)?,
    }

    Ok(())
}

fn build_config(options: &Options) -> Result<LauncherConfig> {
    let target = match &options.target {
        Some(t) => Target::from_str(t).context(format!(
            "invalid target: {t}. Use: linux-x64, linux-aarch64, macos-x64, macos-aarch64"
        ))?,
        None => Target::current(),
    };
    let base_dir = match &options.base_dir {
        Some(dir) => dir.clone(),
        None => LauncherConfig::default_base_dir().context("cannot determine home directory")?,
    };

    let mut config = LauncherConfig::new(base_dir, target);
    if let Some(url) = &options.launcher_url {
        config.launcher_url = url.clone();
    }
    if let Some(agent) = &options.user_agent {
        config.user_agent = agent.clone();
    }
    config.fetch_attempts = options.fetch_attempts;
    config.jvm_args = options.jvm_args.clone();
    Ok(config)
}

/// Logs to stdout, plus a JSON copy of this crate's debug events in `log_file`.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jre_prestarter=info"));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(stdout_filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("jre_prestarter=debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(config: LauncherConfig, skip_greeting: bool, start_launcher: bool) -> Result<()> {
    println!("{}", banner::logo());

    let first_run = !config.base_dir.exists();
    if first_run {
        if !skip_greeting {
            banner::greet(
                &mut std::io::stdin().lock(),
                &mut std::io::stdout(),
                config::PROJECT_HELLO_TEXT,
            )?;
        }
        std::fs::create_dir_all(&config.base_dir)
            .with_context(|| format!("cannot create {}", config.base_dir.display()))?;
    }

    init_logging(Some(&config.log_path()))?;
    tracing::debug!("OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if first_run {
        tracing::info!("directory '{}' created", config.base_dir.display());
    } else {
        tracing::info!("directory '{}' found", config.base_dir.display());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    let reporter: Box<dyn Reporter> = if std::io::stderr().is_terminal() {
        Box::new(BarReporter::new())
    } else {
        Box::new(NoopReporter)
    };
    let prepared = Bootstrap::new(&config, reporter.as_ref(), cancel)
        .prepare()
        .await?;
    if prepared.report.is_noop() {
        tracing::debug!("everything already prepared");
    }

    if start_launcher {
        tracing::info!("starting launcher");
        launch::launch(&prepared.java, &prepared.launcher, &config.jvm_args)
            .map_err(|e| StepError::new(Step::Launch, display_name(&prepared.launcher), e))?;
        tracing::info!("launcher exited");
    } else {
        eprintln!("\n  Java:     {}", prepared.java.display());
        eprintln!("  Launcher: {}\n", prepared.launcher.display());
    }

    Ok(())
}

/// Everything `clean` deletes: downloads, their partial files and the java dir.
fn downloaded_paths(config: &LauncherConfig) -> Vec<PathBuf> {
    let mut paths = vec![config.java_dir()];
    let mut files = vec![config.launcher_path()];
    files.extend(config.dependencies().iter().map(|dep| config.archive_path(dep)));
    for file in files {
        paths.push(download::part_path(&file));
        paths.push(file);
    }
    paths
}

fn run_clean(config: &LauncherConfig) -> Result<()> {
    let mut freed = 0;
    for path in downloaded_paths(config) {
        if path.is_dir() {
            freed += dir_size(&path);
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("cannot remove {}", path.display()))?;
        } else if let Ok(meta) = std::fs::metadata(&path) {
            freed += meta.len();
            std::fs::remove_file(&path)
                .with_context(|| format!("cannot remove {}", path.display()))?;
        } else {
            continue;
        }
        tracing::info!("removed {}", path.display());
    }

    if freed > 0 {
        eprintln!("Cleaned {} of downloaded data", HumanBytes(freed));
    } else {
        eprintln!("Nothing to clean");
    }
    Ok(())
}

fn run_info(config: &LauncherConfig) -> Result<()> {
    let mark = |done: bool| if done { "yes" } else { "no" };

    eprintln!("Base directory:   {}", config.base_dir.display());
    eprintln!("Target:           {:?}", config.target);
    eprintln!("Launcher:         {}", mark(config.launcher_path().exists()));

    for dep in config.dependencies() {
        let archive = config.archive_path(dep);
        let dir = config.extracted_dir(dep);
        eprintln!("  {}", dep.archive_name);
        eprintln!("    downloaded:   {}", mark(archive.exists()));
        eprintln!("    unpacked:     {}", mark(dir.exists()));
        if dir.exists() {
            eprintln!("    size:         {}", HumanBytes(dir_size(&dir)));
        }
    }

    let home = launch::java_home(&config.runtime_dir());
    let merged = !home.join(MERGE_PENDING).exists()
        && bootstrap::presence::has_matching(&home.join("lib"), &config.toolkit_pattern)
            .unwrap_or(false);
    eprintln!("JavaFX merged:    {}", mark(merged));

    if config.base_dir.exists() {
        eprintln!("Total size:       {}", HumanBytes(dir_size(&config.base_dir)));
    }
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                size += dir_size(&p);
            } else if let Ok(meta) = p.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(base: &Path) -> Options {
        Options {
            base_dir: Some(base.to_path_buf()),
            target: Some("linux-x64".to_string()),
            launcher_url: None,
            user_agent: None,
            fetch_attempts: 3,
            yes: true,
            jvm_args: Vec::new(),
        }
    }

    #[test]
    fn build_config_applies_overrides() {
        let mut opts = options(Path::new("/base"));
        opts.launcher_url = Some("http://example.com/dl/Game.jar".to_string());
        opts.user_agent = Some("custom-agent".to_string());
        opts.fetch_attempts = 1;
        opts.jvm_args = vec!["-Xmx1G".to_string()];

        let config = build_config(&opts).unwrap();

        assert_eq!(config.launcher_path(), PathBuf::from("/base/Game.jar"));
        assert_eq!(config.user_agent, "custom-agent");
        assert_eq!(config.fetch_attempts, 1);
        assert_eq!(config.jvm_args, vec!["-Xmx1G".to_string()]);
    }

    #[test]
    fn build_config_rejects_unknown_target() {
        let mut opts = options(Path::new("/base"));
        opts.target = Some("windows-x64".to_string());
        assert!(build_config(&opts).is_err());
    }

    #[test]
    fn clean_removes_downloads_but_keeps_log() {
        let base = tempdir().unwrap();
        let config = build_config(&options(base.path())).unwrap();
        std::fs::create_dir_all(config.runtime_dir().join("bin")).unwrap();
        std::fs::write(config.runtime_dir().join("bin/java"), b"java").unwrap();
        std::fs::write(config.launcher_path(), b"jar").unwrap();
        std::fs::write(config.archive_path(&config.runtime), b"tgz").unwrap();
        std::fs::write(download::part_path(&config.archive_path(&config.toolkit)), b"zi").unwrap();
        std::fs::write(config.log_path(), b"{}").unwrap();

        run_clean(&config).unwrap();

        assert!(!config.java_dir().exists());
        assert!(!config.launcher_path().exists());
        assert!(!config.archive_path(&config.runtime).exists());
        assert!(!download::part_path(&config.archive_path(&config.toolkit)).exists());
        assert!(config.log_path().exists());
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/one"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("a/b/two"), vec![0u8; 32]).unwrap();

        assert_eq!(dir_size(dir.path()), 42);
    }
}
