//! `cartorio` command-line simulator

use anyhow::Context;
use cartorio_core::telemetry;
use cartorio_core::{CartorioConfig, LogFormat};
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

mod scenarios;

use scenarios::Scenario;

fn cli() -> Command {
    Command::new("cartorio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Cartorio coordination primitives simulator")
        .subcommand(
            Command::new("simulate")
                .about("Drive a coordination unit against in-memory fakes")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_parser(["save-queue", "profile-fetch", "stream", "pipeline", "all"])
                        .help("Scenario to run"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Log as JSON lines"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let Some(("simulate", args)) = matches.subcommand() else {
        cli().print_help()?;
        return Ok(());
    };

    let format = if args.get_flag("json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    telemetry::init(format)?;

    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => CartorioConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CartorioConfig::default(),
    };

    let scenarios = match args.get_one::<String>("scenario").map(String::as_str) {
        Some("save-queue") => vec![Scenario::SaveQueue],
        Some("profile-fetch") => vec![Scenario::ProfileFetch],
        Some("stream") => vec![Scenario::Stream],
        Some("pipeline") => vec![Scenario::Pipeline],
        _ => Scenario::ALL.to_vec(),
    };

    let mut passed = true;
    for scenario in scenarios {
        let report = scenario.run(&config).await;
        println!("{}", report.generate_text());
        passed &= report.passed();
    }

    std::process::exit(if passed { 0 } else { 1 });
}
