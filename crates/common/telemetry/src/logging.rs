// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, fmt::MakeWriter, layer::SubscriberExt,
    registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Global handle for dynamically reloading log levels at runtime.
///
/// Only available after [`init_global_logging`] has been called.
pub static RELOAD_HANDLE: OnceCell<tracing_subscriber::reload::Handle<filter::Targets, Registry>> =
    OnceCell::new();

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory path for storing log files.
    ///
    /// When set to a non-empty string, log files are written there with
    /// hourly rotation. If empty, only stdout logging is used.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Log level filter string, e.g. `"info,beacon_dispatcher=debug"`.
    ///
    /// If None, falls back to the RUST_LOG environment variable or "info".
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain (per file family).
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to output logs to stdout in addition to files.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,

    /// Prefix of the rolling log file names; errors go to `<prefix>-err`.
    #[default = "beacon"]
    #[builder(default = "beacon".to_string())]
    pub file_prefix: String,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON-structured log format, one object per line.
    Json,

    /// Human-readable text format.
    ///
    /// ```text
    /// 2024-01-01T12:00:00.123Z  INFO beacon_dispatcher::worker: Flush completed
    /// ```
    #[default]
    Text,
}

/// Initialize stdout logging with default options.
///
/// Returns the `WorkerGuard`s that must be kept alive for logging to work.
#[must_use]
pub fn init_tracing_subscriber() -> Vec<WorkerGuard> {
    init_global_logging(&LoggingOptions::default())
}

/// Initialize logging for unit tests.
///
/// # Environment Variables
///
/// * `UNITTEST_LOG_DIR` - Directory for test logs (default:
///   "/tmp/__unittest_logs")
/// * `UNITTEST_LOG_LEVEL` - Log level filter (default: "debug,reqwest=warn,...")
///
/// Safe to call from many tests; only the first call initializes.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let mut g = GLOBAL_UT_LOG_GUARD
            .as_ref()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());

        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| {
            "debug,hyper=warn,hyper_util=warn,reqwest=warn,h2=info,rustls=info".to_string()
        });
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            file_prefix: "unittest".to_string(),
            ..Default::default()
        };
        *g = Some(init_global_logging(&opts));

        tracing::info!(dir = %dir, "Unit test logging initialized");
    });
}

/// Keeps the unit test worker guards alive for the whole test run.
static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Used when neither `level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Initialize logging with full configuration options.
///
/// Sets up, depending on `opts`:
///
/// - **Stdout Layer**: if `append_stdout` is true
/// - **File Layer**: hourly rotated files in `dir`
/// - **Error File Layer**: error-only hourly rotated files in `dir`
///
/// All writers are non-blocking; the returned guards must be kept alive for
/// the lifetime of the application. Only the first call has any effect.
///
/// # Panics
///
/// Panics on invalid level strings or if the log directory cannot be used, so
/// misconfigured observability is caught at startup.
pub fn init_global_logging(opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let stdout_layer = opts.append_stdout.then(|| {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            fmt_layer(writer, opts.log_format, std::io::stdout().is_terminal())
        });

        let (file_layer, err_file_layer) = if opts.dir.is_empty() {
            (None, None)
        } else {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(opts, &opts.file_prefix));
            guards.push(guard);
            let err_prefix = format!("{}-err", opts.file_prefix);
            let (err_writer, err_guard) =
                tracing_appender::non_blocking(rolling_appender(opts, &err_prefix));
            guards.push(err_guard);
            (
                Some(fmt_layer(writer, opts.log_format, false)),
                Some(
                    fmt_layer(err_writer, opts.log_format, false)
                        .with_filter(filter::LevelFilter::ERROR),
                ),
            )
        };

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let (dyn_filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
        RELOAD_HANDLE
            .set(reload_handle)
            .expect("reload handle already set, maybe init_global_logging get called twice?");

        let subscriber = Registry::default()
            .with(dyn_filter)
            .with(stdout_layer)
            .with(file_layer)
            .with(err_file_layer);

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");
    });

    guards
}

/// Formatting layer for one writer in the configured format.
fn fmt_layer<S, W>(writer: W, format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_thread_names(true);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn rolling_appender(opts: &LoggingOptions, prefix: &str) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {}",
                &opts.dir, e
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = LoggingOptions::default();
        assert!(opts.dir.is_empty());
        assert!(opts.append_stdout);
        assert_eq!(opts.max_log_files, 720);
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.file_prefix, "beacon");
    }

    #[test]
    fn test_empty_log_format_falls_back_to_default() {
        let opts: LoggingOptions =
            serde_json::from_str(r#"{"dir":"/var/log/beacon","log_format":""}"#).unwrap();
        assert_eq!(opts.dir, "/var/log/beacon");
        assert_eq!(opts.log_format, LogFormat::Text);

        let opts: LoggingOptions = serde_json::from_str(r#"{"log_format":"json"}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Json);
    }

    #[test]
    fn test_builder() {
        let opts = LoggingOptions::builder()
            .dir(DEFAULT_LOGGING_DIR.to_string())
            .level("debug".to_string())
            .build();
        assert_eq!(opts.dir, "logs");
        assert_eq!(opts.level.as_deref(), Some("debug"));
        assert_eq!(opts.max_log_files, 720);
        assert_eq!(opts.file_prefix, "beacon");
    }

    #[test]
    fn test_ut_logging_is_reentrant() {
        init_default_ut_logging();
        init_default_ut_logging();
        tracing::debug!("unit test logging initialized");
    }
}
