#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use ria::{RiaConfig, check_cmd, demo_cmd, run_cmd};

#[derive(Parser, Debug)]
#[command(name = "ria")]
#[command(about = "Run RIA scenario scripts", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set RIA_LOG)
    #[arg(long)]
    verbose: bool,

    /// Engine configuration file (TOML); RIA_* environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a script and run entry points
    Run {
        /// Path to the scenario script (.scr)
        #[arg(long)]
        script: PathBuf,
        /// Entry point to run; repeat to run several in order
        #[arg(long = "entry", required = true)]
        entries: Vec<String>,
        /// String parameter passed to every entry (@0, @1, ...)
        #[arg(long = "param")]
        params: Vec<String>,
        /// Run the entry list this many times
        #[arg(long, default_value_t = 1)]
        repeat: usize,
        /// Engine temp directory (defaults to the configured one)
        #[arg(long)]
        temp_dir: Option<PathBuf>,
        /// Write machine-readable JSON report to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Compile a script without running it
    Check {
        /// Path to the scenario script (.scr)
        #[arg(long)]
        script: PathBuf,
        /// Write the compiled module as JSON to this file
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Run the city listing session through the legacy binding
    Demo {
        /// Path to the scenario script (.scr)
        #[arg(long)]
        script: PathBuf,
        /// Engine temp directory (defaults to a fresh temporary one)
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("RIA_LOG")
        .unwrap_or_else(|_| if verbose { "ria=debug".to_string() } else { "ria=info".to_string() });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { script, entries, params, repeat, temp_dir, json } => {
            RiaConfig::load(cli.config.as_deref())
                .and_then(|config| run_cmd::run(config, script, entries, params, repeat, temp_dir, json))
        }
        Commands::Check { script, dump } => check_cmd::run(script, dump),
        Commands::Demo { script, temp_dir } => RiaConfig::load(cli.config.as_deref()).and_then(|config| {
            ria::runtime::bootstrap(config);
            demo_cmd::run(script, temp_dir)
        }),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
