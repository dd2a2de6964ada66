// Command Line Interface Module
// clap definitions plus the colored console helpers used by every command

pub mod commands;
pub mod reporter;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// Certwarden - Let's Encrypt renewal and deployment dispatcher
#[derive(Parser)]
#[command(name = "certwarden")]
#[command(author = "Certwarden Team")]
#[command(version)]
#[command(about = "Checks certificate expiry, renews through Certbot and deploys through Ansible", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Renew certificates close to expiry and deploy them (run from cron)
    Check {
        #[command(flatten)]
        target: TargetArgs,

        /// Renew every selected certificate regardless of expiry
        #[arg(short, long)]
        force: bool,

        /// Override renewal.threshold_days from the configuration
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Never prompt for confirmation
        #[arg(short = 'y', long)]
        non_interactive: bool,

        /// Report format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show days until expiry for stored certificates without changing anything
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Override renewal.threshold_days from the configuration
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Report format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Issue new certificates via the Cloudflare DNS-01 challenge
    Issue {
        #[command(flatten)]
        target: TargetArgs,

        /// Never prompt for confirmation
        #[arg(short = 'y', long)]
        non_interactive: bool,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

/// Configuration and domain selection shared by the certificate commands
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Only handle this domain (repeatable)
    #[arg(short, long = "domain")]
    pub domains: Vec<String>,

    /// File with one domain per line
    #[arg(long)]
    pub domains_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Ask a yes/no question on stdin; anything but y/yes is a no
pub fn confirm(question: &str) -> std::io::Result<bool> {
    print!("{} {} [y/N] ", "?".cyan().bold(), question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
