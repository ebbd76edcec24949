//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "File-backed tracing setup for simgpuctl runs."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Log layout for `simgpuctl --log-to-file`.
//!
//! Every run appends JSON lines to `<directory>/<prefix>-<service>.log.<YYYY-MM-DD>`,
//! where `directory` is `[logging].directory` (default `target/logs`) and
//! `prefix` is `[logging].file_prefix`, falling back to the service name. The
//! same events are mirrored to stdout in the `[logging].format` style. Without
//! `--log-to-file` the CLI installs `simgpu_logging::init` instead and nothing
//! lands on disk.
use std::path::Path;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Filter directive variable, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SIMGPU_LOG";

const FALLBACK_DIRECTIVE: &str = "debug";

// Held for the life of the process so buffered lines flush on exit.
static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Stdout rendering for device runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Base name handed to the daily roller; the date suffix is appended per file.
pub fn log_file_name(config: &LoggingConfig, service_name: &str) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    format!("{prefix}-{service_name}.log")
}

fn directive_filter(directive: Option<String>) -> EnvFilter {
    let Some(directive) = directive else {
        return EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE));
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring {LOG_ENV}={directive:?} ({err}); logging at {FALLBACK_DIRECTIVE}");
        EnvFilter::new(FALLBACK_DIRECTIVE)
    })
}

/// Install the file plus stdout subscriber described in the module docs.
///
/// A second call in the same process keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let directory: &Path = &config.directory;
    std::fs::create_dir_all(directory)?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(directory, log_file_name(config, service_name)));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set((file_guard, stdout_guard));

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .with_target(false)
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_writer(stdout_writer).boxed(),
    };
    let file_layer = fmt::layer().json().with_writer(file_writer).boxed();

    tracing_subscriber::registry()
        .with(directive_filter(std::env::var(LOG_ENV).ok()))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %directory.display(),
        format = ?config.format,
        "file logging enabled"
    );
    Ok(())
}
