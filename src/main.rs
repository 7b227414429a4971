use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use forum_import::cli::{self, SummaryFormat};
use forum_import::{ImportError, Settings};

#[derive(Parser)]
#[command(
    name = "forum-import",
    about = "Migrate forum data into Discourse through an intermediate database",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Set the log level (overrides the settings file)")]
    log_level: Option<Level>,

    #[arg(long, global = true, value_enum, default_value = "text", help = "Summary output format")]
    format: SummaryFormat,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert the source forum into the intermediate database")]
    Convert {
        #[arg(short = 'c', long, help = "Path to the TOML settings file")]
        config: PathBuf,
    },

    #[command(about = "Import the intermediate database into the destination")]
    Import {
        #[arg(short = 'c', long, help = "Path to the TOML settings file")]
        config: PathBuf,
    },

    #[command(about = "Convert, then import")]
    Run {
        #[arg(short = 'c', long, help = "Path to the TOML settings file")]
        config: PathBuf,
    },

    #[command(about = "Validate settings and print the execution order of every step")]
    Validate {
        #[arg(short = 'c', long, help = "Path to the TOML settings file")]
        config: PathBuf,
    },

    #[command(about = "Delete all ID mappings from the intermediate database")]
    Reset {
        #[arg(short = 'c', long, help = "Path to the TOML settings file")]
        config: PathBuf,

        #[arg(short = 'y', long, help = "Do not ask for confirmation")]
        yes: bool,
    },

    #[command(about = "Print or write a sample settings file")]
    Sample {
        #[arg(short = 'o', long, help = "Output file path")]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn config(&self) -> Option<&Path> {
        match self {
            Commands::Convert { config }
            | Commands::Import { config }
            | Commands::Run { config }
            | Commands::Validate { config }
            | Commands::Reset { config, .. } => Some(config),
            Commands::Sample { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(step) = e.downcast_ref::<ImportError>().and_then(ImportError::failed_step) {
                eprintln!("✗ Step '{}' failed", step);
            }
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let settings = match cli.command.config() {
        Some(path) if !matches!(cli.command, Commands::Validate { .. }) => {
            Some(Settings::from_file(path).await?)
        }
        _ => None,
    };

    // Initialize logging
    let log_level = match (cli.log_level, &settings) {
        (Some(level), _) => level,
        (None, Some(settings)) => settings.pipeline.log_level.parse()?,
        (None, None) => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Convert { .. } => {
            cli::convert(&loaded(settings)?, cli.format).await?;
        }

        Commands::Import { .. } => {
            cli::import(&loaded(settings)?, cli.format).await?;
        }

        Commands::Run { .. } => {
            let settings = loaded(settings)?;
            info!("Running convert and import phases");
            cli::convert(&settings, cli.format).await?;
            cli::import(&settings, cli.format).await?;
        }

        Commands::Validate { config } => {
            info!("Validating settings from {:?}", config);
            cli::validate(&config).await?;
        }

        Commands::Reset { yes, .. } => {
            cli::reset(&loaded(settings)?, yes).await?;
        }

        Commands::Sample { output } => {
            cli::generate_sample(output).await?;
        }
    }

    Ok(())
}

fn loaded(settings: Option<Settings>) -> Result<Settings> {
    settings.ok_or_else(|| anyhow::anyhow!("This command requires a settings file"))
}
