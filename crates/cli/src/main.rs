mod config;
mod logging;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use promptgate_core::notifier::parse_base_url;
use promptgate_core::DecisionLinks;

use crate::config::Config;

/// Manual approval gate for prompt versions.
#[derive(Parser)]
#[command(
    name = "promptgate",
    version,
    about = "Manual approval gate for prompt versions"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the decision endpoint, version registry and change feed watcher
    Serve {
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Port to listen on (overrides the config file and PROMPTGATE_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Parse and validate a configuration file, then print the resolved settings
    CheckConfig {
        /// Path to the TOML configuration file
        file: PathBuf,
    },

    /// Print the approve and reject links for one version
    Links {
        /// Public base URL of the decision endpoint
        #[arg(long)]
        base_url: String,
        /// Prompt identifier
        prompt_id: String,
        /// Version identifier
        version: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            logging::init_logging(cli.verbose);
            cmd_serve(config.as_deref(), port);
        }
        Commands::CheckConfig { file } => {
            cmd_check_config(&file);
        }
        Commands::Links {
            base_url,
            prompt_id,
            version,
        } => {
            cmd_links(&base_url, &prompt_id, &version);
        }
    }
}

fn cmd_serve(config_path: Option<&Path>, port: Option<u16>) {
    let mut config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    if let Some(port) = port {
        config.server.port = port;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(serve::start_server(config)) {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

fn cmd_check_config(file: &Path) {
    match Config::load(Some(file)) {
        Ok(config) => {
            println!("config ok: {}", file.display());
            print!("{}", config);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn cmd_links(base_url: &str, prompt_id: &str, version: &str) {
    let links = parse_base_url(base_url)
        .and_then(|base| DecisionLinks::build(&base, prompt_id, version));
    match links {
        Ok(links) => {
            println!("approve: {}", links.approve_url);
            println!("reject:  {}", links.reject_url);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
