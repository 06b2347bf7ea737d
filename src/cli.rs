use clap::{Arg, ArgMatches, Command};
use traza_core::{TrazaConfig, TrazaResult};

pub fn command() -> Command {
    Command::new("traza")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reference payments service with execution instrumentation")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR")
                .help("HTTP bind address, e.g. 0.0.0.0:3000"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format")
                .value_parser(["json", "pretty", "compact"]),
        )
}

/// Overlay command-line flags on a loaded configuration.
pub fn apply_overrides(config: &mut TrazaConfig, matches: &ArgMatches) -> TrazaResult<()> {
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.server.bind_address = bind.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.parse()?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse()?;
    }
    config.validate()
}
