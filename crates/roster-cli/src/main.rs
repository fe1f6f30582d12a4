//! `roster` command-line entry point

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use roster_cli::commands;
use roster_core::RosterConfig;
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("roster")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Agent roster client: sync, login and promotion progress")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .global(true)
                .default_value(".roster")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the durable store"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(Command::new("sync").about("Fetch the roster once"))
        .subcommand(
            Command::new("login")
                .about("Log in with identifier and PIN")
                .arg(
                    Arg::new("id")
                        .long("id")
                        .required(true)
                        .help("Agent identifier; digits alone are accepted"),
                )
                .arg(Arg::new("pin").long("pin").required(true).help("Security PIN")),
        )
        .subcommand(
            Command::new("progress")
                .about("Show promotion progress for an agent")
                .arg(Arg::new("id").long("id").required(true).help("Agent identifier")),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,roster_core=info,roster_directory=info,roster_session=info,roster_cli=info")
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit<T: Serialize + Display>(report: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<RosterConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Ok(RosterConfig::load(path)?),
        None => Ok(RosterConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let config = load_config(&matches)?;
    let json = matches.get_flag("json");
    let data_dir = matches
        .get_one::<PathBuf>("data-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(".roster"));

    match matches.subcommand() {
        Some(("config", _)) => {
            print!("{}", commands::render_config(&config)?);
        }
        Some(("sync", _)) => {
            let manager = commands::open(&config, &data_dir, false)?;
            emit(&commands::sync(&manager).await, json)?;
        }
        Some(("login", args)) => {
            let id = args.get_one::<String>("id").map_or("", String::as_str);
            let pin = args.get_one::<String>("pin").map_or("", String::as_str);
            let manager = commands::open(&config, &data_dir, false)?;
            emit(&commands::login(&manager, id, pin).await?, json)?;
        }
        Some(("progress", args)) => {
            let id = args.get_one::<String>("id").map_or("", String::as_str);
            let manager = commands::open(&config, &data_dir, false)?;
            emit(&commands::progress(&manager, &config, id).await?, json)?;
        }
        _ => {}
    }
    Ok(())
}
