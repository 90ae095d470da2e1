mod snapshot;

use std::process::ExitCode;

use clap::Parser;

use intune_explorer::load_settings;
use intune_explorer::logger;
use intune_explorer::report::GroupReport;
use intune_explorer::store::SqliteStore;

/// Exit status when the requested group is not in the snapshot
const NOT_FOUND: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "intune-explorer",
    about = "Show which Intune apps, scripts, policies and profiles reach a group"
)]
struct Cli {
    /// Display name of the group to report on
    group_name: String,

    /// Refresh the cached snapshot before reporting
    #[arg(short, long)]
    reload: bool,

    /// Path to config file (auto-detected if not specified)
    #[arg(short, long)]
    config: Option<String>,

    /// Log file path (enables file logging in addition to stderr)
    #[arg(long)]
    log_file: Option<String>,

    /// Only use the stable API surface for this run
    #[arg(long)]
    stable_only: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .as_deref()
        .map(std::fs::File::create)
        .transpose()?;
    logger::init(logger::verbosity_filter(cli.verbose), log_file)?;

    let mut settings = load_settings(cli.config.as_deref())?;
    if cli.stable_only {
        settings.extended = false;
    }

    let is_new = !settings.cache_path.exists();
    let mut store = SqliteStore::open(&settings.cache_path)?;
    snapshot::ensure(&mut store, &settings, cli.reload || is_new).await?;

    let Some(report) = GroupReport::build(&store, &cli.group_name, settings.extended)? else {
        eprintln!("No group named '{}' in the cached snapshot", cli.group_name);
        if settings.group_prefix.is_empty() {
            eprintln!("Run with --reload if the group was created recently");
        } else {
            eprintln!(
                "Only groups starting with '{}' are cached; run with --reload if the group was created recently",
                settings.group_prefix
            );
        }
        return Ok(ExitCode::from(NOT_FOUND));
    };

    print!("{report}");
    Ok(ExitCode::SUCCESS)
}
