//! CLI argument parsing for the bridge.

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

/// Common CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(about = "Vigor ventilation bridge")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Connect, read the status register once, report the result and exit.
    #[arg(long)]
    pub check: bool,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        let matches = Self::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
            .get_matches();

        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = BridgeArgs::try_parse_from([
            "zenoh-bridge-vigor",
            "--config",
            "vigor.json5",
            "--log-level",
            "debug",
            "--check",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("vigor.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.check);
    }

    #[test]
    fn test_check_defaults_off() {
        let args = BridgeArgs::try_parse_from(["zenoh-bridge-vigor", "-c", "x.json5"]).unwrap();
        assert!(!args.check);
        assert!(args.log_level.is_none());
    }
}
