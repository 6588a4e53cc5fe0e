use crate::compute::strategy::Algorithm;
use crate::config::{CliOverrides, LoadOptions, SizeCategory};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Default)]
pub struct CliArgs {
    pub load: LoadOptions,
    pub print_config: bool,
}

pub fn command() -> Command {
    Command::new("gl-matmul")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Headless OpenGL compute benchmark for dense matrix multiplication")
        .arg(
            Arg::new("mode")
                .long("mode")
                .help("Algorithm: naive|chunked|strassen (aliases direct|tiled|block-recursive)")
                .value_name("MODE"),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .help("Matrix size category")
                .value_name("SIZE")
                .value_parser(["small", "medium", "big", "huge", "massive"]),
        )
        .arg(
            Arg::new("n")
                .long("n")
                .help("Explicit matrix dimension, overrides --size")
                .value_name("N")
                .conflicts_with("size"),
        )
        .arg(
            Arg::new("tile")
                .long("tile")
                .help("Work group edge length")
                .value_name("T"),
        )
        .arg(
            Arg::new("block-rows")
                .long("block-rows")
                .help("Rows per dispatch in chunked mode")
                .value_name("ROWS"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Seed for matrix A; B uses seed + 1")
                .value_name("SEED"),
        )
        .arg(
            Arg::new("kernel-dir")
                .long("kernel-dir")
                .help("Directory containing matmul_<mode>.comp")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("no-embedded-fallback")
                .long("no-embedded-fallback")
                .help("Fail instead of using the built-in kernel when the file is missing")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("full-check")
                .long("full-check")
                .help("Compare every element against a serial host product")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Write the run report as JSON to this path")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration as TOML and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Logging level")
                .value_name("LEVEL")
                .value_parser(["error", "warn", "info", "debug", "trace"]),
        )
}

pub fn parse_args() -> Result<CliArgs> {
    args_from_matches(&command().get_matches())
}

pub fn args_from_matches(matches: &ArgMatches) -> Result<CliArgs> {
    let mut overrides = CliOverrides::default();

    if let Some(mode) = matches.get_one::<String>("mode") {
        overrides.mode = Some(mode.parse::<Algorithm>()?);
    }
    if let Some(size) = matches.get_one::<String>("size") {
        overrides.size = Some(size.parse::<SizeCategory>()?);
    }
    if let Some(n) = matches.get_one::<String>("n") {
        overrides.n = Some(n.parse().context("Invalid matrix dimension")?);
    }
    if let Some(tile) = matches.get_one::<String>("tile") {
        overrides.tile = Some(tile.parse().context("Invalid tile size")?);
    }
    if let Some(rows) = matches.get_one::<String>("block-rows") {
        overrides.block_rows = Some(rows.parse().context("Invalid block row count")?);
    }
    if let Some(seed) = matches.get_one::<String>("seed") {
        overrides.seed = Some(seed.parse().context("Invalid seed")?);
    }
    if let Some(dir) = matches.get_one::<String>("kernel-dir") {
        overrides.kernel_dir = Some(PathBuf::from(dir));
    }
    if let Some(output) = matches.get_one::<String>("output") {
        overrides.report_path = Some(PathBuf::from(output));
    }

    overrides.no_embedded_fallback = matches.get_flag("no-embedded-fallback");
    overrides.full_check = matches.get_flag("full-check");

    if matches.get_flag("debug") {
        overrides.log_level = Some("debug".to_string());
    } else if let Some(level) = matches.get_one::<String>("log-level") {
        overrides.log_level = Some(level.clone());
    }

    Ok(CliArgs {
        load: LoadOptions {
            config_path: matches.get_one::<String>("config").map(PathBuf::from),
            overrides,
            ..LoadOptions::default()
        },
        print_config: matches.get_flag("print-config"),
    })
}

pub fn setup_logging(level: &str) -> Result<()> {
    let level_filter = match level {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", level)),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(false)
        .with_ansi(true);

    // RUST_LOG takes precedence over the configured level when set.
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(EnvFilter::from_default_env())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(tracing_subscriber::filter::LevelFilter::from_level(
                level_filter,
            ))
            .try_init()?;
    }

    Ok(())
}
