//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "regbridge field-device bridge", version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        Self::parse_from_with_default(std::env::args_os(), default_config)
            .unwrap_or_else(|e| e.exit())
    }

    /// Parse an explicit argument list with a default config path.
    pub fn parse_from_with_default<I, T>(
        args: I,
        default_config: &'static str,
    ) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.required(false).default_value(default_config))
            .try_get_matches_from(args)?;

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
    }

    /// Parse CLI arguments (requires --config to be specified).
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_config() {
        let args = BridgeArgs::parse_from_with_default(["regbridge-modbus"], "modbus.json5")
            .unwrap();
        assert_eq!(args.config, PathBuf::from("modbus.json5"));
        assert_eq!(args.log_level, None);
    }

    #[test]
    fn test_args_override() {
        let args = BridgeArgs::parse_from_with_default(
            ["regbridge-modbus", "-c", "site.json5", "--log-level", "debug"],
            "modbus.json5",
        )
        .unwrap();
        assert_eq!(args.config, PathBuf::from("site.json5"));
        assert_eq!(args.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_args_log_level_without_config() {
        let args =
            BridgeArgs::parse_from_with_default(["regbridge-modbus", "--log-level", "warn"], "modbus.json5")
                .unwrap();
        assert_eq!(args.config, PathBuf::from("modbus.json5"));
        assert_eq!(args.log_level.as_deref(), Some("warn"));
    }
}
