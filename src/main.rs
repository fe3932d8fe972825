use clap::{Parser, Subcommand};
use relmirror::cancellation;
use relmirror::commands::latest::LatestCommand;
use relmirror::commands::status::StatusCommand;
use relmirror::commands::sync::SyncCommand;
use relmirror::config::MirrorConfig;
use relmirror::error::Result;
use relmirror::logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relmirror")]
#[command(author, version, about = "Release asset mirror", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration directory (default: ~/.relmirror)
    #[arg(short, long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the newest release of every configured launcher
    Sync {
        /// Keep running, re-checking on the configured interval
        #[arg(long)]
        watch: bool,

        /// Disable progress indicators
        #[arg(long)]
        no_progress: bool,
    },

    /// List mirrored versions
    #[command(visible_alias = "ls")]
    Status {
        /// Restrict the listing to one launcher
        launcher: Option<String>,
    },

    /// Show the latest version pointer per launcher
    Latest {
        /// Restrict the output to one launcher
        launcher: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::setup_logger(cli.verbose);

    if let Err(e) = run(cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(MirrorConfig::default_dir);
    let config = MirrorConfig::load(&config_dir)?;

    match cli.command {
        Commands::Sync { watch, no_progress } => {
            let token = cancellation::global_token();
            SyncCommand::new(&config)?.execute(watch, no_progress, &token)
        }
        Commands::Status { launcher } => StatusCommand::new(&config)?.execute(launcher.as_deref()),
        Commands::Latest { launcher } => LatestCommand::new(&config)?.execute(launcher.as_deref()),
    }
}
