//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use std::time::{Duration, TryFromFloatSecsError};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use dut_cache::FactsCache;
use dut_host::{Host, LocalHost, wait_tcp_connection};
use dut_inventory::{Facts, Vars};
use dut_utils::poll::wait_until_named;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout. Command output goes to stdout as well, so
    // logs are written to stderr.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("dut=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

// Reads a duration given in seconds, falling back to the configured default.
// An invalid value on either side is a usage error.
fn duration_arg(
    matches: &ArgMatches<'_>,
    name: &str,
    default: Result<Duration, TryFromFloatSecsError>,
) -> Duration {
    let result = match matches.value_of(name) {
        Some(value) => parse_seconds(value)
            .ok_or_else(|| format!("invalid value for --{name}: {value}")),
        None => default.map_err(|error| {
            format!("invalid poll.{name} in configuration file: {error}")
        }),
    };
    result.unwrap_or_else(|error| {
        eprintln!("{error}");
        std::process::exit(2);
    })
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

// Inventory files given on the command line, comma-separated, take
// precedence over the configured ones.
fn inventory_files(matches: &ArgMatches<'_>, config: &Config) -> Vec<String> {
    match matches.value_of("inventory") {
        Some(files) => files
            .split(',')
            .map(str::trim)
            .filter(|file| !file.is_empty())
            .map(str::to_owned)
            .collect(),
        None => config.inventory.files.clone(),
    }
}

fn print_vars(vars: Option<Vars>, what: &str) -> bool {
    let Some(vars) = vars else {
        eprintln!("{what} not found in inventory");
        return false;
    };
    match serde_json::to_string_pretty(&vars) {
        Ok(json) => {
            println!("{json}");
            true
        }
        Err(error) => {
            error!(%error, "failed to encode variables");
            false
        }
    }
}

fn inventory_lookup(
    result: Result<Option<Vars>, dut_inventory::Error>,
    what: &str,
) -> bool {
    match result {
        Ok(vars) => print_vars(vars, what),
        Err(error) => {
            error.log();
            false
        }
    }
}

fn cmd_wait(matches: &ArgMatches<'_>, config: &Config) -> bool {
    let cmd = matches
        .values_of("COMMAND")
        .map(|values| values.collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let timeout = duration_arg(matches, "timeout", config.poll.timeout());
    let interval = duration_arg(matches, "interval", config.poll.interval());
    let delay = duration_arg(matches, "delay", config.poll.delay());
    if interval.is_zero() {
        eprintln!("--interval must be greater than zero");
        std::process::exit(2);
    }

    let host = LocalHost::default();
    wait_until_named(&cmd, timeout, interval, delay, || {
        host.shell(&cmd).map(|_| true)
    })
}

fn cmd_tcp_wait(matches: &ArgMatches<'_>, config: &Config) -> bool {
    let address = matches.value_of("ADDRESS").unwrap_or_default();
    let timeout = duration_arg(matches, "timeout", config.poll.timeout());
    wait_tcp_connection(address, timeout)
}

fn cmd_cache_cleanup(matches: &ArgMatches<'_>, cache: &FactsCache) -> bool {
    let zone = matches.value_of("zone");
    let key = matches.value_of("key");
    if zone.is_none() && key.is_some() {
        eprintln!("--key requires --zone");
        std::process::exit(2);
    }
    match cache.cleanup(zone, key) {
        Ok(()) => true,
        Err(error) => {
            error.log();
            false
        }
    }
}

// ===== main =====

fn main() {
    let timeout_arg = Arg::with_name("timeout")
        .long("timeout")
        .value_name("seconds")
        .help("Maximum time to wait.");

    // Parse command-line parameters.
    let matches = App::new("DUT test harness")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .global(true)
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("inventory")
                .short("i")
                .long("inventory")
                .value_name("files")
                .global(true)
                .help("Comma-separated list of inventory files."),
        )
        .subcommand(
            SubCommand::with_name("wait")
                .about("Wait until a shell command succeeds")
                .arg(timeout_arg.clone())
                .arg(
                    Arg::with_name("interval")
                        .long("interval")
                        .value_name("seconds")
                        .help("Time between two checks."),
                )
                .arg(
                    Arg::with_name("delay")
                        .long("delay")
                        .value_name("seconds")
                        .help("Time to wait before the first check."),
                )
                .arg(
                    Arg::with_name("COMMAND")
                        .help("Shell command to poll")
                        .required(true)
                        .multiple(true)
                        .last(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("tcp-wait")
                .about("Wait until a TCP connection can be established")
                .arg(timeout_arg)
                .arg(
                    Arg::with_name("ADDRESS")
                        .help("Address to connect to (host:port)")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("host-vars")
                .about("Print the variables of a host")
                .arg(
                    Arg::with_name("visible")
                        .long("visible")
                        .help("Include the variables of the host groups."),
                )
                .arg(
                    Arg::with_name("HOSTNAME")
                        .help("Inventory hostname")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("group-vars")
                .about("Print the variables visible to the first host of a group")
                .arg(
                    Arg::with_name("GROUP")
                        .help("Inventory group")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("server-vars")
                .about("Print the variables of the test server of a server group")
                .arg(
                    Arg::with_name("visible")
                        .long("visible")
                        .help("Include the variables of the server groups."),
                )
                .arg(
                    Arg::with_name("SERVER")
                        .help("Server group")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("cache-cleanup")
                .about("Remove cached facts")
                .arg(
                    Arg::with_name("zone")
                        .long("zone")
                        .value_name("zone")
                        .help("Only remove the facts of this zone."),
                )
                .arg(
                    Arg::with_name("key")
                        .long("key")
                        .value_name("key")
                        .help("Only remove this entry of the zone."),
                ),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    // Initialize tracing.
    init_tracing(&config.logging);

    // Initialize the fact cache.
    FactsCache::init_global(&config.cache);
    let cache = FactsCache::global();

    info!(command = ?matches.subcommand_name(), "starting");

    let success = match matches.subcommand() {
        ("wait", Some(matches)) => cmd_wait(matches, &config),
        ("tcp-wait", Some(matches)) => cmd_tcp_wait(matches, &config),
        ("host-vars", Some(matches)) => {
            let inv_files = inventory_files(matches, &config);
            let hostname = matches.value_of("HOSTNAME").unwrap_or_default();
            let facts = Facts::new(cache);
            let result = if matches.is_present("visible") {
                facts.get_host_visible_vars(&inv_files, hostname)
            } else {
                facts.get_host_vars(&inv_files, hostname)
            };
            inventory_lookup(result, hostname)
        }
        ("group-vars", Some(matches)) => {
            let inv_files = inventory_files(matches, &config);
            let group = matches.value_of("GROUP").unwrap_or_default();
            let facts = Facts::new(cache);
            let result = facts.get_group_visible_vars(&inv_files, group);
            inventory_lookup(result, group)
        }
        ("server-vars", Some(matches)) => {
            let inv_files = inventory_files(matches, &config);
            let server = matches.value_of("SERVER").unwrap_or_default();
            let facts = Facts::new(cache);
            let result = if matches.is_present("visible") {
                facts.get_test_server_visible_vars(&inv_files, server)
            } else {
                facts.get_test_server_vars(&inv_files, server)
            };
            inventory_lookup(result, server)
        }
        ("cache-cleanup", Some(matches)) => cmd_cache_cleanup(matches, &cache),
        _ => unreachable!(),
    };

    info!(%success, "exiting");
    if !success {
        std::process::exit(1);
    }
}

// ===== unit tests =====
