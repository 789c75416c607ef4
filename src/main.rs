//! pmx binary entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pmx::commands;
use pmx::constants;
use pmx::ui;

#[derive(Parser)]
#[command(
    name = "pmx",
    version,
    about = "Process supervisor driven by ecosystem descriptor files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise the apps defined in an ecosystem file
    Start {
        /// Path to the ecosystem file (TOML, or JSON with a .json extension)
        config: PathBuf,
    },
    /// Validate an ecosystem file without starting anything
    Check {
        /// Path to the ecosystem file
        config: PathBuf,
    },
    /// List recorded instances
    Ps,
    /// Stop recorded instances (all of them, or one app/instance)
    Stop {
        /// App or instance name; omit to stop everything
        name: Option<String>,
    },
    /// Print the tail of an instance's combined log
    Logs {
        /// App or instance name
        name: String,
        /// Number of lines to print
        #[arg(long, default_value_t = constants::DEFAULT_LOG_LINES)]
        lines: usize,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config } => commands::start::execute(&config).await,
        Commands::Check { config } => commands::check::execute(&config),
        Commands::Ps => commands::ps::execute(),
        Commands::Stop { name } => commands::stop::execute(name.as_deref()).await,
        Commands::Logs { name, lines } => commands::logs::execute(&name, lines),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pmx", &mut std::io::stdout());
            Ok(())
        },
    };

    if let Err(error) = result {
        ui::print_error_box("pmx failed", Some(&format!("{error:#}")));
        let code = error
            .downcast_ref::<pmx::Error>()
            .map_or(1, pmx::Error::exit_code);
        std::process::exit(code);
    }
}
