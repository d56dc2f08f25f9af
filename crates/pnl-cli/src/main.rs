//! `panelctl`: replay session scripts and print templates

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pnl_cli::{init_logging, LogFormat, Replayer};
use pnl_model::TemplateDescriptor;
use pnl_session::{SessionConfig, SessionManager};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

fn cli() -> Command {
    Command::new("panelctl")
        .version(pnl_cli::VERSION)
        .about("Panel schedule session tooling")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("pretty")
                .value_parser(["pretty", "json"])
                .help("Log line format on stderr"),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay a JSON-lines script of session commands")
                .arg(
                    Arg::new("script")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Script file, one command per line"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Session configuration TOML"),
                ),
        )
        .subcommand(
            Command::new("template")
                .about("Print the default template descriptor as TOML")
                .arg(
                    Arg::new("single-phase")
                        .long("single-phase")
                        .action(ArgAction::SetTrue)
                        .help("Single-phase form instead of three-phase"),
                ),
        )
}

async fn replay(args: &ArgMatches) -> Result<ExitCode> {
    let script = args
        .get_one::<PathBuf>("script")
        .context("script path is required")?;
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let manager = SessionManager::new(config).context("starting session manager")?;
    let restored = manager.restore().context("restoring session records")?;
    let file = File::open(script).with_context(|| format!("opening {}", script.display()))?;

    let mut replayer = Replayer::new(manager, Utc::now());
    let summary = replayer
        .run(BufReader::new(file), std::io::stdout())
        .await?;
    replayer.manager().shutdown();

    info!(
        restored,
        commands = summary.commands,
        failed = summary.failed,
        invalid = summary.invalid,
        "Replay complete"
    );
    Ok(if summary.invalid > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn template(args: &ArgMatches) -> Result<ExitCode> {
    let template = if args.get_flag("single-phase") {
        TemplateDescriptor::single_phase()
    } else {
        TemplateDescriptor::three_phase()
    };
    let rendered = toml::to_string_pretty(&template).context("rendering template")?;
    print!("{rendered}");
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();

    let format: LogFormat = matches
        .get_one::<String>("log-format")
        .map_or(Ok(LogFormat::default()), |s| s.parse())?;
    init_logging(format)?;

    match matches.subcommand() {
        Some(("replay", args)) => replay(args).await,
        Some(("template", args)) => template(args),
        _ => Ok(ExitCode::FAILURE),
    }
}
