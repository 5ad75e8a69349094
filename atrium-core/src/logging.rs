//! Unified logging setup
//!
//! Structured tracing output with configurable format and optional
//! span timing for slow-path diagnosis.

use crate::error::{AtriumError, AtriumResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to include thread information
    pub include_thread: bool,
    /// Whether to include timestamps
    pub include_timestamp: bool,
    /// Whether to log to file
    pub log_to_file: bool,
    /// Log file path (if log_to_file is true)
    pub log_file_path: Option<String>,
    /// Whether to log span close times
    pub enable_performance_monitoring: bool,
    /// Custom filter directives
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            include_thread: false,
            include_timestamp: true,
            log_to_file: false,
            log_file_path: None,
            enable_performance_monitoring: true,
            filter_directives: vec![
                "atrium_core=debug".to_string(),
                "atrium_client=debug".to_string(),
                "atrium_session=debug".to_string(),
            ],
        }
    }
}

/// Initialize the logging system
pub fn init_logging(config: &LoggingConfig) -> AtriumResult<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for directive in &config.filter_directives {
        let parsed = directive.parse().map_err(|e| AtriumError::Config {
            message: format!("invalid filter directive '{}'", directive),
            source: Some(Box::new(e)),
            context: ErrorContext::new("logging")
                .with_operation("init_logging")
                .with_suggestion("Check logging.filter_directives for typos"),
        })?;
        filter = filter.add_directive(parsed);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(config)?)
        .init();

    Ok(())
}

fn format_layer<S>(config: &LoggingConfig) -> AtriumResult<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.enable_performance_monitoring {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread);

    let layer = if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| AtriumError::Config {
            message: "log_file_path must be set when log_to_file is true".to_string(),
            source: None,
            context: ErrorContext::new("logging")
                .with_suggestion("Set logging.log_file_path or disable log_to_file"),
        })?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        // Arc because MakeWriter is implemented for Arc<File>, not File.
        let file = std::sync::Arc::new(file);

        match config.format {
            LogFormat::Json => base.json().with_writer(file).boxed(),
            LogFormat::Pretty => base.pretty().with_writer(file).boxed(),
            LogFormat::Compact => base.compact().with_writer(file).boxed(),
        }
    } else {
        match config.format {
            LogFormat::Json => base.json().with_writer(io::stdout).boxed(),
            LogFormat::Pretty => base.pretty().with_writer(io::stdout).boxed(),
            LogFormat::Compact => base.compact().with_writer(io::stdout).boxed(),
        }
    };

    Ok(layer)
}

/// Timing helpers for operations worth watching in production
pub mod performance {
    use std::time::Instant;
    use tracing::{info_span, Instrument};

    /// Run an async operation inside a timing span and log its duration.
    pub async fn measure_async<F, T>(operation_name: &str, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let span = info_span!("performance", operation = operation_name);
        let start = Instant::now();

        let result = future.instrument(span.clone()).await;

        tracing::info!(
            target: "performance",
            operation = operation_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "operation completed"
        );

        result
    }

    /// Run a synchronous operation inside a timing span and log its duration.
    pub fn measure_sync<F, T>(operation_name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _span = info_span!("performance", operation = operation_name).entered();
        let start = Instant::now();

        let result = f();

        tracing::info!(
            target: "performance",
            operation = operation_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "operation completed"
        );

        result
    }
}
