use crate::conf::{ExecutionEnvironment, LogFormat, TelemetryConfig, ENVIRONMENT};
use anyhow::Context;
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{layer, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

static INIT_LOG: Once = Once::new();

fn env_filter(settings: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(settings.log_level());
        if matches!(
            *ENVIRONMENT,
            ExecutionEnvironment::Integration | ExecutionEnvironment::Local
        ) {
            // the alloy and config crates are chatty at debug level
            for directive in ["alloy_signer_local=warn", "config=warn"] {
                if let Ok(d) = directive.parse() {
                    filter = filter.add_directive(d);
                }
            }
        }
        filter
    })
}

/// Install the global tracing subscriber.
///
/// The console output is plain text or JSON depending on [TelemetryConfig::log_format].
/// When a log file is configured, a second JSON layer writes to it through a
/// non-blocking appender; the returned guard must be kept alive for as long as
/// logs should be flushed to that file.
pub fn init_tracing(settings: &TelemetryConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match settings.log_file() {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .context("log file path has no file name")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let file_layer = layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(file_layer), Some(guard))
        }
        None => (None, None),
    };

    let (text_layer, json_layer) = match settings.log_format() {
        LogFormat::Text => (Some(fmt_layer()), None),
        LogFormat::Json => (None, Some(fmt_layer().json())),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(text_layer)
        .with(json_layer)
        .with(env_filter(settings))
        .try_init()
        .context("Failed to initialize tracing")?;

    info!(
        service = settings.tracing_service_name().unwrap_or("unknown-service"),
        environment = %*ENVIRONMENT,
        "Tracing initialized"
    );
    Ok(guard)
}

/// Install console logging once, for tests and examples. Later calls are no-ops.
pub fn init_testing() {
    INIT_LOG.call_once(|| {
        // another subscriber may already be installed by the test harness
        let _ = init_tracing(&TelemetryConfig::default());
    });
}

fn fmt_layer<S>() -> Layer<S> {
    layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
}
