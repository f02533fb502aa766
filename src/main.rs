//! portmux command line tool
//!
//! Loads the configuration, builds the protocol table and serves until Ctrl+C.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use portmux::common::{init_logger, level_for_verbosity, set_log_level, Result};
use portmux::config::{
    log_config, ConfigLoader, ConfigMerger, ConfigValidator, DemuxConfig, ProtocolConfig, LOG_LEVEL_STR,
};
use portmux::protocol::builtin_names;
use portmux::{Demux, APP_NAME, VERSION};

/// Share one TCP port between SSH, TLS, HTTP, OpenVPN and other protocols
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file (JSON); defaults to ./portmux.json when present
    #[clap(short = 'F', long, env = "PORTMUX_CONFIG")]
    config_file: Option<PathBuf>,

    /// Listen address, may be repeated
    #[clap(short, long)]
    listen: Vec<String>,

    /// Protocol as NAME=HOST:PORT, may be repeated; order is probing order
    #[clap(short, long = "protocol", value_name = "NAME=HOST:PORT")]
    protocols: Vec<String>,

    /// Seconds to wait for a decision before using --on-timeout
    #[clap(short, long)]
    timeout: Option<u64>,

    /// Protocol used when probing times out
    #[clap(long)]
    on_timeout: Option<String>,

    /// Trace probes (-v), and dump probed bytes (-vv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,

    /// List the built-in probes and exit
    #[clap(long)]
    list_probes: bool,
}

impl Args {
    /// Level to log at before the configuration is loaded
    fn initial_log_level(&self) -> &str {
        if self.verbose > 0 {
            level_for_verbosity(self.verbose)
        } else {
            self.log_level.as_deref().unwrap_or(LOG_LEVEL_STR)
        }
    }

    /// Command line values as a configuration layer
    fn to_config(&self) -> portmux::config::Result<DemuxConfig> {
        let mut config = DemuxConfig::default();

        if !self.listen.is_empty() {
            config.listen = self.listen.clone();
        }
        config.protocols = self
            .protocols
            .iter()
            .map(|spec| ProtocolConfig::from_spec(spec))
            .collect::<portmux::config::Result<Vec<_>>>()?;
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(on_timeout) = &self.on_timeout {
            config.on_timeout = on_timeout.clone();
        }
        config.verbose = self.verbose;
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        Ok(config)
    }
}

/// Log level once every configuration layer has been applied
fn final_log_level(config: &DemuxConfig) -> &str {
    // Probe tracing needs debug/trace records to be emitted
    if config.verbose > 0 {
        level_for_verbosity(config.verbose)
    } else {
        config.log_level.as_str()
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting {} v{}", APP_NAME, VERSION);

    let config = DemuxConfig::load(args.config_file.as_deref())?;
    let config = config.merge(args.to_config()?);
    set_log_level(final_log_level(&config));

    config.validate()?;
    config.check_warnings();
    log_config(&config);

    let demux = Demux::bind(config).await?;

    info!("Ready, press Ctrl+C to stop");

    tokio::select! {
        result = demux.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.list_probes {
        for name in builtin_names() {
            println!("{}", name);
        }
        println!("regex");
        return ExitCode::SUCCESS;
    }

    init_logger(args.initial_log_level());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_log_level_from_flags() {
        let args = Args::parse_from(["portmux"]);
        assert_eq!(args.initial_log_level(), "info");

        let args = Args::parse_from(["portmux", "--log-level", "debug"]);
        assert_eq!(args.initial_log_level(), "debug");

        // -v wins so probe tracing is visible while loading
        let args = Args::parse_from(["portmux", "--log-level", "warn", "-vv"]);
        assert_eq!(args.initial_log_level(), "trace");
    }

    #[test]
    fn test_final_log_level_follows_merged_config() {
        let config = DemuxConfig { log_level: "warn".to_string(), ..DemuxConfig::default() };
        assert_eq!(final_log_level(&config), "warn");

        let config = DemuxConfig { verbose: 1, ..config };
        assert_eq!(final_log_level(&config), "debug");
    }

    #[test]
    fn test_cli_layer() {
        let args = Args::parse_from([
            "portmux", "-l", "127.0.0.1:4443", "-p", "ssh=127.0.0.1:22", "-p", "anyprot=127.0.0.1:80",
            "--on-timeout", "anyprot",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.listen, vec!["127.0.0.1:4443".to_string()]);
        assert_eq!(config.on_timeout, "anyprot");
        let names: Vec<_> = config.protocols.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["ssh", "anyprot"]);
    }
}
