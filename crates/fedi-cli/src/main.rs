mod commands;
mod config;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "fedi", about = "Inspect and change follow and like state on a federated node")]
struct Cli {
    /// API root of the local node (overrides FEDI_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Author acting as the viewer (overrides FEDI_VIEWER_ID)
    #[arg(long, global = true)]
    viewer: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the viewer's relationship with an author
    Status { target: String },
    /// Send a follow request and wait for the re-check
    Follow { target: String },
    Unfollow { target: String },
    /// List follow requests addressed to the viewer
    Requests {
        /// Include accepted and rejected requests
        #[arg(long)]
        all: bool,
    },
    Accept { request_id: String },
    Reject { request_id: String },
    /// Search the author directory, local and remote
    Authors {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        approved: Option<bool>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
        /// Also resolve the viewer's relationship with each author
        #[arg(long)]
        with_status: bool,
    },
    /// Print the canonical id and client route for an identifier
    Route {
        id: String,
        #[arg(long, value_enum, default_value_t = Kind::Author)]
        kind: Kind,
        /// Node host the entity claims
        #[arg(long)]
        host: Option<String>,
    },
    Like {
        id: String,
        /// The id names a comment rather than an entry
        #[arg(long)]
        comment: bool,
        /// Author of the liked item, to refuse liking your own work
        #[arg(long)]
        author: Option<String>,
    },
    Unlike {
        id: String,
        #[arg(long)]
        comment: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Author,
    Entry,
    Comment,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fedi_cli=info,fedi_relationships=info,fedi_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }
    if let Some(viewer) = cli.viewer.clone() {
        config.viewer_id = Some(viewer);
    }
    info!(api_base = %config.api_base, "Starting fedi");

    match commands::run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_authors() {
        let cli = Cli::parse_from([
            "fedi",
            "--viewer",
            "11111111-1111-1111-1111-111111111111",
            "authors",
            "--search",
            "bea",
            "--with-status",
        ]);
        assert_eq!(
            cli.viewer.as_deref(),
            Some("11111111-1111-1111-1111-111111111111")
        );
        match cli.command {
            Command::Authors {
                search,
                page,
                size,
                with_status,
                ..
            } => {
                assert_eq!(search.as_deref(), Some("bea"));
                assert_eq!((page, size), (1, 20));
                assert!(with_status);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_route_kind() {
        let cli = Cli::parse_from(["fedi", "route", "abc", "--kind", "comment"]);
        assert!(matches!(
            cli.command,
            Command::Route {
                kind: Kind::Comment,
                ..
            }
        ));
    }
}
