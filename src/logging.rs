//! Logging configuration for pygdb.
//!
//! Records from the `pygdb` target are written to stderr unless a sink
//! callback is installed. The Python binding installs a sink that forwards
//! to a `logging.Logger`.

use std::sync::{Arc, RwLock};

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};

use crate::error::Error;

/// Log target used by everything in this crate.
pub const TARGET: &str = "pygdb";

// Whether `log::set_logger` accepted our logger. Decided once per process.
static INSTALLED: OnceCell<bool> = OnceCell::new();
static PYGDB_LOGGER: Lazy<PygdbLogger> = Lazy::new(PygdbLogger::new);

/// A formatted log record handed to a [`Sink`].
#[derive(Clone, Copy, Debug)]
pub struct LogLine<'a> {
    pub level: Level,
    pub target: &'a str,
    pub message: &'a str,
}

/// Callback receiving every enabled record. May be invoked from any thread.
pub type Sink = Arc<dyn Fn(&LogLine<'_>) + Send + Sync>;

/// Configuration for [`init`].
///
/// If `filter` is set it is parsed as a `RUST_LOG`-style filter and overrides
/// `level`. If `filter` is unset and `RUST_LOG` is present in the environment,
/// the environment value is used. Otherwise `level` is applied to the `pygdb`
/// target. Without a sink, records go to stderr.
#[derive(Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub filter: Option<String>,
    pub sink: Option<Sink>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            filter: None,
            sink: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TargetFilter {
    target: String,
    level: LevelFilter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogFilter {
    default: LevelFilter,
    directives: Vec<TargetFilter>,
}

impl LogFilter {
    fn default_for_level(level: LevelFilter) -> Self {
        Self {
            default: LevelFilter::Off,
            directives: vec![TargetFilter {
                target: TARGET.to_string(),
                level,
            }],
        }
    }

    fn push(&mut self, target: &str, level: LevelFilter) {
        self.directives.push(TargetFilter {
            target: target.to_string(),
            level,
        });
    }

    fn parse(spec: &str) -> Result<Self, String> {
        let mut filter = Self {
            default: LevelFilter::Off,
            directives: Vec::new(),
        };

        for (index, directive) in spec.split(',').map(str::trim).enumerate() {
            match directive.split_once('=') {
                None if directive.is_empty() => {}
                None => match parse_level(directive) {
                    Some(level) => filter.default = level,
                    None => filter.push(directive, LevelFilter::Trace),
                },
                Some((target, level)) => {
                    let (target, level) = (target.trim(), level.trim());
                    if target.is_empty() {
                        return Err(format!("empty log directive at position {index}"));
                    }
                    if level.is_empty() {
                        return Err(format!("missing log level for target `{target}`"));
                    }
                    let level =
                        parse_level(level).ok_or_else(|| format!("invalid level `{level}`"))?;
                    filter.push(target, level);
                }
            }
        }

        Ok(filter)
    }

    /// Level of the longest directive prefixing `target`; later ones win ties.
    fn level_for(&self, target: &str) -> LevelFilter {
        self.directives
            .iter()
            .filter(|directive| target.starts_with(&directive.target))
            .max_by_key(|directive| directive.target.len())
            .map_or(self.default, |directive| directive.level)
    }

    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level().to_level_filter() <= self.level_for(metadata.target())
    }

    fn max_level(&self) -> LevelFilter {
        self.directives
            .iter()
            .map(|directive| directive.level)
            .fold(self.default, Ord::max)
    }
}

struct LoggerConfig {
    filter: LogFilter,
    sink: Option<Sink>,
}

struct PygdbLogger {
    config: RwLock<LoggerConfig>,
}

impl PygdbLogger {
    fn new() -> Self {
        Self {
            config: RwLock::new(LoggerConfig {
                filter: LogFilter::default_for_level(LevelFilter::Info),
                sink: None,
            }),
        }
    }

    fn update(&self, f: impl FnOnce(&mut LoggerConfig)) {
        let mut guard = self
            .config
            .write()
            .unwrap_or_else(|err| err.into_inner());
        f(&mut guard);
    }

    fn with_config<T>(&self, f: impl FnOnce(&LoggerConfig) -> T) -> T {
        let guard = self.config.read().unwrap_or_else(|err| err.into_inner());
        f(&guard)
    }
}

impl Log for PygdbLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.with_config(|config| config.filter.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        // Clone the sink out so the lock is not held while calling into it.
        let (sink, enabled) = self.with_config(|config| {
            (config.sink.clone(), config.filter.enabled(record.metadata()))
        });

        if !enabled {
            return;
        }

        match sink {
            Some(sink) => {
                let message = record.args().to_string();
                sink(&LogLine {
                    level: record.level(),
                    target: record.target(),
                    message: &message,
                });
            }
            None => eprintln!("{} {}: {}", record.level(), record.target(), record.args()),
        }
    }

    fn flush(&self) {}
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn resolve_filter(config: &LogConfig) -> Result<LogFilter, Error> {
    if let Some(filter) = &config.filter {
        return LogFilter::parse(filter).map_err(|reason| Error::invalid_filter(filter, reason));
    }

    if let Ok(filter) = std::env::var("RUST_LOG") {
        return LogFilter::parse(&filter).map_err(|reason| Error::invalid_filter(&filter, reason));
    }

    Ok(LogFilter::default_for_level(config.level))
}

fn ensure_logger() -> Result<(), Error> {
    let installed = *INSTALLED.get_or_init(|| log::set_logger(&*PYGDB_LOGGER).is_ok());
    if installed {
        Ok(())
    } else {
        Err(Error::LoggerConflict)
    }
}

/// Initializes logging for pygdb.
///
/// May be called repeatedly to replace the filter and sink.
pub fn init(config: LogConfig) -> Result<(), Error> {
    let filter = resolve_filter(&config)?;
    ensure_logger()?;

    let max_level = filter.max_level();
    PYGDB_LOGGER.update(|current| {
        current.filter = filter;
        current.sink = config.sink;
    });
    log::set_max_level(max_level);
    Ok(())
}

/// Replaces the sink and keeps the current filter. `None` restores stderr.
pub fn set_sink(sink: Option<Sink>) {
    PYGDB_LOGGER.update(|current| current.sink = sink);
}

/// Whether pygdb's logger owns the `log` facade.
pub fn is_initialized() -> bool {
    INSTALLED.get().copied().unwrap_or(false)
}
