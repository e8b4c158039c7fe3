use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{arg, command, crate_name, value_parser, ArgMatches, Command};
use cli::client::Session;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = build_cli().get_matches();

    let result = match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => {
            cli::version::run();
            Ok(())
        }
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => {
            cli::bugreport::run();
            Ok(())
        }
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await.map_err(|e| e.to_string()),
        Some((cli::TOKEN_SUBCOMMAND, cmd)) => {
            let user = cmd.get_one::<String>("USER").map_or("", String::as_str);
            let secret = cmd.get_one::<String>("secret").map_or("", String::as_str);
            let ttl = cmd.get_one::<u64>("ttl").copied().unwrap_or_default();
            cli::token::run(secret, user, Duration::from_secs(ttl))
        }
        Some((cli::UPLOAD_SUBCOMMAND, cmd)) => {
            let file = cmd.get_one::<PathBuf>("FILE").cloned().unwrap_or_default();
            cli::client::upload(&session(cmd), &file, parent(cmd))
                .await
                .map_err(|e| e.to_string())
        }
        Some((cli::MKDIR_SUBCOMMAND, cmd)) => {
            let name = cmd.get_one::<String>("NAME").map_or("", String::as_str);
            cli::client::mkdir(&session(cmd), name, parent(cmd))
                .await
                .map_err(|e| e.to_string())
        }
        Some((cli::LS_SUBCOMMAND, cmd)) => cli::client::ls(&session(cmd), parent(cmd))
            .await
            .map_err(|e| e.to_string()),
        Some((cli::RM_SUBCOMMAND, cmd)) => {
            let key = cmd.get_one::<String>("KEY").map_or("", String::as_str);
            cli::client::rm(&session(cmd), key)
                .await
                .map_err(|e| e.to_string())
        }
        Some((cli::RMDIR_SUBCOMMAND, cmd)) => {
            let id = cmd.get_one::<i64>("ID").copied().unwrap_or_default();
            cli::client::rmdir(&session(cmd), id)
                .await
                .map_err(|e| e.to_string())
        }
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::TOKEN_SUBCOMMAND)
                .about(cli::TOKEN_DESCRIPTION)
                .arg(arg!(<USER>).help("User identifier to put into the token"))
                .arg(
                    arg!(-s --secret <SECRET>)
                        .required(true)
                        .env("CLOUDLET_SESSION_SECRET")
                        .hide_env_values(true)
                        .help("Session signing secret of the server"),
                )
                .arg(
                    arg!(--ttl <SECONDS>)
                        .value_parser(value_parser!(u64))
                        .default_value("86400")
                        .help("Token lifetime in seconds"),
                ),
        )
        .subcommand(
            with_session(Command::new(cli::UPLOAD_SUBCOMMAND))
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(
                    arg!(<FILE>)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to file to upload"),
                )
                .arg(parent_arg()),
        )
        .subcommand(
            with_session(Command::new(cli::MKDIR_SUBCOMMAND))
                .about(cli::MKDIR_DESCRIPTION)
                .arg(arg!(<NAME>).help("Folder name"))
                .arg(parent_arg()),
        )
        .subcommand(
            with_session(Command::new(cli::LS_SUBCOMMAND))
                .about(cli::LS_DESCRIPTION)
                .arg(parent_arg()),
        )
        .subcommand(
            with_session(Command::new(cli::RM_SUBCOMMAND))
                .about(cli::RM_DESCRIPTION)
                .arg(arg!(<KEY>).help("Object key of the file")),
        )
        .subcommand(
            with_session(Command::new(cli::RMDIR_SUBCOMMAND))
                .about(cli::RMDIR_DESCRIPTION)
                .arg(
                    arg!(<ID>)
                        .value_parser(value_parser!(i64))
                        .help("Folder id"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

fn with_session(cmd: Command) -> Command {
    cmd.arg(
        arg!(-u --uri <URI>)
            .env("CLOUDLET_URI")
            .default_value(cli::DEFAULT_URI)
            .help("Cloudlet server URI"),
    )
    .arg(
        arg!(-t --token <TOKEN>)
            .env("CLOUDLET_TOKEN")
            .hide_env_values(true)
            .help("Session token, see the token subcommand"),
    )
}

fn parent_arg() -> clap::Arg {
    arg!(-p --parent <ID>)
        .value_parser(value_parser!(i64))
        .help("Parent folder id, root level when omitted")
}

fn session(cmd: &ArgMatches) -> Session {
    Session {
        uri: cmd
            .get_one::<String>("uri")
            .cloned()
            .unwrap_or_else(|| cli::DEFAULT_URI.to_owned()),
        token: cmd.get_one::<String>("token").cloned(),
    }
}

fn parent(cmd: &ArgMatches) -> Option<i64> {
    cmd.get_one::<i64>("parent").copied()
}
