//! Logging for hosts embedding the dispatcher
//!
//! The `[logging]` section of [`DispatcherConfig`](crate::config::DispatcherConfig)
//! sets the verbosity of the dispatcher's own targets. Extra `EnvFilter`
//! directives tune everything else, and `RUST_LOG`, when set, is the base
//! filter they are added to.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! directives = ["tokio=warn"]
//! json = true
//! ```

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{DispatchError, DispatchResult};

/// Target prefix of every event the dispatcher emits
pub const DISPATCH_TARGET: &str = "rvoip_dispatch_core";

/// Base filter when `RUST_LOG` is unset
const DEFAULT_BASE_FILTER: &str = "warn";

/// `[logging]` section of the dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level of the dispatcher's own targets
    pub level: String,
    /// Additional `EnvFilter` directives such as `tokio=warn`
    pub directives: Vec<String>,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            json: false,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level: LevelFilter::from_level(level).to_string(),
            ..Default::default()
        }
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn level(&self) -> DispatchResult<Level> {
        self.level.trim().parse::<Level>().map_err(|_| {
            DispatchError::configuration(format!("invalid logging level '{}'", self.level))
        })
    }

    /// Filter installed by [`setup_logging`]
    pub fn env_filter(&self) -> DispatchResult<EnvFilter> {
        let dispatch = format!("{}={}", DISPATCH_TARGET, LevelFilter::from_level(self.level()?));
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_BASE_FILTER));

        let mut filter = base.add_directive(parse_directive(&dispatch)?);
        for directive in &self.directives {
            filter = filter.add_directive(parse_directive(directive)?);
        }
        Ok(filter)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.level().map_err(|e| e.to_string())?;
        for directive in &self.directives {
            parse_directive(directive).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

fn parse_directive(directive: &str) -> DispatchResult<Directive> {
    directive.trim().parse::<Directive>().map_err(|e| {
        DispatchError::configuration(format!("invalid logging directive '{}': {}", directive, e))
    })
}

/// Install the global subscriber
///
/// Fails when the section is invalid or a global subscriber is already
/// installed.
pub fn setup_logging(config: &LoggingConfig) -> DispatchResult<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter()?)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| DispatchError::configuration(format!("cannot install the logger: {}", e)))
}
