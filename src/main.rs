use tcpsweep::detail;
use tcpsweep::input::{Config, InputError, Opts};
use tcpsweep::output;
use tcpsweep::scanner::Scanner;
use tcpsweep::ulimit::{adjust_ulimit_size, infer_batch_size};
use tcpsweep::warning;

use clap::{error::ErrorKind, CommandFactory, Parser};
use futures::StreamExt;
use log::debug;
use std::net::Ipv4Addr;
use std::process;
use std::time::Instant;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
/// Reads the command line, validates it and prints every open port of the
/// requested range as it is found.
async fn main() {
    env_logger::init();

    let opts = parse_opts();
    debug!("Main() `opts` arguments are {opts:?}");

    if let Err(e) = run(opts).await {
        warning!(e);
        process::exit(1);
    }
}

/// Help and version requests exit with 0, any other argument problem with 1.
#[cfg(not(tarpaulin_include))]
fn parse_opts() -> Opts {
    Opts::try_parse().unwrap_or_else(|e| match e.kind() {
        ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            // Usage goes to stdout, like an explicit --help
            if Opts::command().print_help().is_err() {
                process::exit(1);
            }
            process::exit(0);
        }
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = e.print();
            process::exit(0);
        }
        _ => {
            let _ = e.print();
            process::exit(1);
        }
    })
}

#[cfg(not(tarpaulin_include))]
async fn run(mut opts: Opts) -> anyhow::Result<()> {
    let range = opts.port_range()?;
    let address: Ipv4Addr = opts
        .target
        .parse()
        .map_err(|_| InputError::InvalidTarget(opts.target.clone()))?;

    if !opts.no_config {
        let config = Config::read(opts.config_path.clone())?;
        opts.merge(&config);
    }

    let ulimit = adjust_ulimit_size(&opts);
    let batch_size = infer_batch_size(&opts, ulimit);
    let timeout = opts.scan_timeout()?;

    detail!(
        format!(
            "Scanning ports {} to {} on {address}...",
            range.start(),
            range.end()
        ),
        opts.greppable,
        opts.accessible
    );

    let scanner = Scanner::new(address, range, batch_size, timeout);
    let (mut open_ports, abort_handle) = scanner.sweep_abortable();

    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    let scan_start = Instant::now();
    let mut found = 0_usize;
    while let Some(port) = open_ports.next().await {
        output!(port, opts.greppable);
        found += 1;
    }
    signal_task.abort();

    if open_ports.is_aborted() {
        warning!(
            "Scan interrupted, the ports above are the ones found so far.",
            opts.greppable,
            opts.accessible
        );
    }

    debug!(
        "Found {found} open ports out of {} in {:?}",
        range.len(),
        scan_start.elapsed()
    );

    Ok(())
}
