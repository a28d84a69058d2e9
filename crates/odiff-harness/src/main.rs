//! `odiff-worker`: hosts one legacy model instance behind stdin/stdout

use anyhow::Context;
use clap::{value_parser, Arg, Command};
use odiff_harness::worker::{self, Served};
use std::process::ExitCode;
use tokio::io::BufReader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = Command::new("odiff-worker")
        .version(odiff_harness::VERSION)
        .about("Hosts a legacy model instance for the odiff harness; speaks line-delimited JSON on stdio")
        .arg(
            Arg::new("library")
                .long("library")
                .required(true)
                .help("Path of the reference model library"),
        )
        .arg(
            Arg::new("setup")
                .long("setup")
                .help("Named configuration for run-to-completion mode"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("17")
                .value_parser(value_parser!(u64))
                .help("Seed for the initial state"),
        )
        .get_matches();

    odiff_harness::logging::init();

    let library = matches
        .get_one::<String>("library")
        .map(String::as_str)
        .unwrap_or_default();
    let setup = matches.get_one::<String>("setup").map(String::as_str);
    let seed = matches.get_one::<u64>("seed").copied().unwrap_or(17);

    let loaded = odiff_testbed::load_legacy(library, setup, seed);
    let mut stdout = tokio::io::stdout();
    let served = worker::host(loaded, library, setup, BufReader::new(tokio::io::stdin()), &mut stdout)
        .await
        .context("worker stdio failed")?;

    Ok(match served {
        Served::StartupFailed => ExitCode::FAILURE,
        Served::Shutdown { .. } | Served::Eof { .. } => ExitCode::SUCCESS,
    })
}
