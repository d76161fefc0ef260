//! Per-module logging controlled via environment variables.
//!
//! Library code emits `tracing` events, each module under its own target
//! (`parservm`, `compiler`, `builder`, `recorder`, `creator`).
//! [`init_logging`] installs a stderr subscriber configured from:
//!
//! - `DEBUG=*` - Enable all targets
//! - `DEBUG=parservm` - Enable only the VM
//! - `DEBUG=parservm,compiler` - Enable multiple
//!
//! Verbosity via DEBUG_VERBOSITY (0-3, default 1)

use std::env;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnabledTargets {
    All,
    None,
    Some(Vec<String>),
}

/// Logging configuration read from `DEBUG` and `DEBUG_VERBOSITY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub enabled: EnabledTargets,
    pub verbosity: u8,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::parse(
            env::var("DEBUG").ok().as_deref(),
            env::var("DEBUG_VERBOSITY").ok().as_deref(),
        )
    }

    pub fn parse(debug: Option<&str>, verbosity: Option<&str>) -> Self {
        let enabled = match debug.map(str::trim) {
            None | Some("") => EnabledTargets::None,
            Some("*") | Some("1") | Some("true") => EnabledTargets::All,
            Some(value) => {
                let targets: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if targets.is_empty() {
                    EnabledTargets::None
                } else {
                    EnabledTargets::Some(targets)
                }
            }
        };
        let verbosity = verbosity
            .and_then(|v| v.trim().parse().ok())
            .map(|v: u8| v.min(3))
            .unwrap_or(1);
        Self { enabled, verbosity }
    }

    pub fn level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Filter directives for `EnvFilter`, or `None` when logging is off.
    pub fn directives(&self) -> Option<String> {
        let level = self.level().to_string().to_lowercase();
        match &self.enabled {
            EnabledTargets::None => None,
            EnabledTargets::All => Some(level),
            EnabledTargets::Some(targets) => Some(
                targets
                    .iter()
                    .map(|t| format!("{}={}", t, level))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Install the stderr subscriber described by the environment.
///
/// Does nothing when `DEBUG` is unset. Safe to call more than once; only the
/// first successful call installs a subscriber.
pub fn init_logging() {
    let config = LogConfig::from_env();
    let Some(directives) = config.directives() else {
        return;
    };
    let filter = EnvFilter::new(directives);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_off() {
        let config = LogConfig::parse(None, None);
        assert_eq!(config.enabled, EnabledTargets::None);
        assert_eq!(config.verbosity, 1);
        assert_eq!(config.directives(), None);
    }

    #[test]
    fn test_wildcard() {
        for value in ["*", "1", "true"] {
            let config = LogConfig::parse(Some(value), None);
            assert_eq!(config.enabled, EnabledTargets::All);
            assert_eq!(config.directives().as_deref(), Some("debug"));
        }
    }

    #[test]
    fn test_target_list() {
        let config = LogConfig::parse(Some("parservm, compiler,"), Some("2"));
        assert_eq!(
            config.enabled,
            EnabledTargets::Some(vec!["parservm".to_string(), "compiler".to_string()])
        );
        assert_eq!(
            config.directives().as_deref(),
            Some("parservm=trace,compiler=trace")
        );
    }

    #[test]
    fn test_verbosity_clamped() {
        assert_eq!(LogConfig::parse(Some("*"), Some("9")).verbosity, 3);
        assert_eq!(LogConfig::parse(Some("*"), Some("x")).verbosity, 1);
        assert_eq!(LogConfig::parse(Some("*"), Some("0")).level(), LevelFilter::INFO);
    }

    #[test]
    fn test_init_twice() {
        init_logging();
        init_logging();
    }
}
