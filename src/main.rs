use cern_egroup::config::Config;
use cern_egroup::directory::InMemoryDirectory;
use cern_egroup::shared::logging;
use cern_egroup::{EgroupQuery, EgroupService};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "cern-egroup",
    about = "Resolve CERN e-group membership recursively from the LDAP directory.",
    version = APP_VERSION,
    disable_version_flag(true)
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(
        long,
        short = 'c',
        value_name = "PATH",
        help = "Path to the configuration file"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "URL", help = "LDAP server URL (overrides configuration)")]
    pub server: Option<String>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Resolve against a JSON directory snapshot instead of LDAP"
    )]
    pub snapshot: Option<PathBuf>,

    #[arg(long, short = 'V', help = "Print version")]
    pub version: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "members", about = "List the users reachable through e-groups")]
    Members {
        #[arg(required = true, value_name = "GROUP")]
        groups: Vec<String>,

        #[arg(long, help = "Also look up the mail address of every member")]
        mails: bool,

        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,
    },

    #[command(name = "mails", about = "Look up mail addresses of users")]
    Mails {
        #[arg(required = true, value_name = "USER")]
        users: Vec<String>,

        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,
    },
}

#[derive(Serialize)]
struct MailsOutput<'a> {
    users: &'a [String],
    mails: Vec<String>,
}

#[tokio::main]
async fn main() {
    logging::init_logging();

    let cli = Cli::parse();

    if cli.version {
        println!("{}", APP_VERSION);
        std::process::exit(0);
    }

    let Some(command) = &cli.command else {
        println!("No command specified. Use --help for usage information.");
        return;
    };

    if let Err(e) = run(&cli, command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, command: &Commands) -> anyhow::Result<()> {
    let service = init_service(cli).await?;

    let result = match command {
        Commands::Members {
            groups,
            mails,
            pretty,
        } => {
            let query = EgroupQuery {
                groups: groups.clone(),
                query_mails: *mails,
            };
            match service.query(&query).await {
                Ok(report) => print_json(&report, *pretty),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Mails { users, pretty } => match service.mails(users).await {
            Ok(mails) => print_json(&MailsOutput { users, mails }, *pretty),
            Err(e) => Err(e.into()),
        },
    };

    service.shutdown().await;
    result
}

async fn init_service(cli: &Cli) -> anyhow::Result<EgroupService> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        config.ldap.server = server.clone();
        config.validate()?;
    }

    match &cli.snapshot {
        Some(path) => {
            info!("Using directory snapshot {}", path.display());
            let directory = InMemoryDirectory::from_json_file(path)?;
            EgroupService::with_directory(config, Arc::new(directory))
        }
        None => {
            info!("Using LDAP server {}", config.ldap.server);
            EgroupService::connect(config).await
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}
