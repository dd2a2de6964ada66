// CLI Command Implementations
// Wires configuration, external tools and the dispatcher together for each command

use super::reporter::{days_label, ConsoleReporter};
use super::{confirm, error, info, success, warning, Commands, OutputFormat, TargetArgs};
use crate::config::{load_domain_list, CertwardenConfig};
use crate::deployment::AnsibleDeployer;
use crate::dispatcher::{check_expiry, DispatchOptions, Dispatcher};
use crate::expiry::is_due;
use crate::issue::{issue_all, CertbotIssuer};
use crate::process::{ProcessRunner, SystemRunner};
use crate::renewal::CertbotRenewer;
use crate::store::elevation::Elevation;
use crate::store::CertificateStore;
use crate::timer::SystemdTimers;
use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Exit status when at least one domain ended in a failure state
const EXIT_DOMAIN_FAILURE: u8 = 1;

/// Exit status when the run could not start or the store was unavailable
const EXIT_FATAL: u8 = 2;

/// Execute a CLI command
pub async fn execute(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Check {
            target,
            force,
            threshold,
            non_interactive,
            format,
        } => check_command(target, force, threshold, non_interactive, format).await,
        Commands::Status {
            target,
            threshold,
            format,
        } => status_command(target, threshold, format).await,
        Commands::Issue {
            target,
            non_interactive,
        } => issue_command(target, non_interactive).await,
        Commands::Validate { config } => validate_command(config),
    }
}

/// Union of `--domain` flags and the domain list file; `None` when neither was given
fn selected_domains(target: &TargetArgs) -> anyhow::Result<Option<Vec<String>>> {
    let mut domains: BTreeSet<String> = target
        .domains
        .iter()
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    if let Some(path) = &target.domains_file {
        domains.extend(load_domain_list(path)?);
    }

    if domains.is_empty() && target.domains.is_empty() && target.domains_file.is_none() {
        Ok(None)
    } else {
        Ok(Some(domains.into_iter().collect()))
    }
}

fn effective_threshold(config: &CertwardenConfig, threshold: Option<u32>) -> anyhow::Result<u32> {
    match threshold {
        Some(0) => anyhow::bail!("--threshold must be greater than 0"),
        Some(days) => Ok(days),
        None => Ok(config.renewal.threshold_days),
    }
}

fn open_store(config: &CertwardenConfig, runner: Arc<dyn ProcessRunner>) -> CertificateStore {
    let elevation = Elevation::new(runner, &config.store.elevate_with);
    CertificateStore::new(&config.store.path, &config.store.cert_file, elevation)
}

/// Renew due certificates and deploy them
async fn check_command(
    target: TargetArgs,
    force: bool,
    threshold: Option<u32>,
    non_interactive: bool,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let config = CertwardenConfig::load(&target.config)?;
    let threshold_days = effective_threshold(&config, threshold)?;
    let domains = selected_domains(&target)?;

    if force && !non_interactive && std::io::stdin().is_terminal() {
        let scope = match &domains {
            Some(list) => format!("{} selected certificate(s)", list.len()),
            None => "EVERY stored certificate".to_string(),
        };
        if !confirm(&format!("Force renewal of {}?", scope))? {
            warning("Aborted, nothing renewed");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
    let store = open_store(&config, runner.clone());

    let renewer = CertbotRenewer::new(runner.clone(), &config.renewal.certbot);
    let deployer = AnsibleDeployer::new(
        runner.clone(),
        &config.deploy.ansible_playbook,
        &config.deploy.playbook,
        &config.deploy.inventory,
    )
    .with_hosts(config.deploy.hosts.clone());

    let options = DispatchOptions {
        threshold_days,
        force,
        domains,
        timer_units: if config.timer.manage {
            config.timer.units.clone()
        } else {
            Vec::new()
        },
    };

    let mut dispatcher = Dispatcher::new(
        store,
        Arc::new(renewer),
        Arc::new(deployer),
        Arc::new(ConsoleReporter::new(format)),
        options,
    );
    if config.timer.manage {
        let elevation = Elevation::new(runner.clone(), &config.store.elevate_with);
        dispatcher = dispatcher.with_timers(Arc::new(SystemdTimers::new(runner, elevation)));
    }

    match dispatcher.run().await {
        Ok(summary) if summary.has_failures() => Ok(ExitCode::from(EXIT_DOMAIN_FAILURE)),
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error(&e.to_string());
            Ok(ExitCode::from(EXIT_FATAL))
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusEntry {
    domain: String,
    certificate: PathBuf,
    expires_at: Option<DateTime<Utc>>,
    days_until_expiry: Option<i64>,
    due: Option<bool>,
    error: Option<String>,
}

/// Read-only view of stored certificates
async fn status_command(
    target: TargetArgs,
    threshold: Option<u32>,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let config = CertwardenConfig::load(&target.config)?;
    let threshold_days = effective_threshold(&config, threshold)?;
    let selected = selected_domains(&target)?;

    let store = open_store(&config, Arc::new(SystemRunner));
    let stored = match store.enumerate_domains().await {
        Ok(stored) => stored,
        Err(e) => {
            error(&e.to_string());
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };
    let domains = selected.unwrap_or_else(|| stored.clone());

    let now = Utc::now();
    let mut entries = Vec::with_capacity(domains.len());
    for domain in domains {
        let entry = if stored.binary_search(&domain).is_err() {
            StatusEntry {
                certificate: store.certificate_path(&domain),
                domain,
                expires_at: None,
                days_until_expiry: None,
                due: None,
                error: Some("no directory in certificate store".to_string()),
            }
        } else {
            match check_expiry(&store, &domain, now).await {
                Ok(check) => StatusEntry {
                    domain,
                    certificate: check.certificate,
                    expires_at: Some(check.expires_at),
                    days_until_expiry: Some(check.days_until_expiry),
                    due: Some(is_due(check.days_until_expiry, threshold_days)),
                    error: None,
                },
                Err(e) => StatusEntry {
                    certificate: store.certificate_path(&domain),
                    domain,
                    expires_at: None,
                    days_until_expiry: None,
                    due: None,
                    error: Some(e.to_string()),
                },
            }
        };
        entries.push(entry);
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to encode status")?
        ),
        OutputFormat::Text => {
            println!();
            println!(
                "{} {} {}",
                "Certificates in".bright_white(),
                store.root().display(),
                format!("(renewal threshold {} days)", threshold_days).bright_black()
            );
            for entry in &entries {
                let state = match (entry.due, &entry.error) {
                    (_, Some(reason)) => format!("unreadable: {}", reason).red(),
                    (Some(true), _) => "due".yellow().bold(),
                    _ => "valid".green(),
                };
                let expires = entry
                    .expires_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:<40} {:<20} {:<18} {}",
                    entry.domain,
                    expires,
                    days_label(entry.days_until_expiry),
                    state
                );
            }
            println!();
        }
    }

    if entries.iter().any(|e| e.error.is_some()) {
        Ok(ExitCode::from(EXIT_DOMAIN_FAILURE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Batch issuance through certbot's Cloudflare DNS plugin
async fn issue_command(target: TargetArgs, non_interactive: bool) -> anyhow::Result<ExitCode> {
    let config = CertwardenConfig::load(&target.config)?;
    config.validate_issue()?;

    let domains = selected_domains(&target)?.unwrap_or_default();
    if domains.is_empty() {
        anyhow::bail!("No domains given, use --domain or --domains-file");
    }

    info(&format!(
        "Issuing {} certificate(s): {}",
        domains.len().to_string().bright_white(),
        domains.join(", ").cyan()
    ));
    if !non_interactive && std::io::stdin().is_terminal() && !confirm("Continue?")? {
        warning("Aborted, nothing issued");
        return Ok(ExitCode::SUCCESS);
    }

    let issuer = CertbotIssuer::from_config(Arc::new(SystemRunner), &config.renewal.certbot, &config.issue)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .context("Invalid spinner template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Requesting {} (waiting for DNS propagation)...", domains[0]));

    let total = domains.len();
    let mut done = 0usize;
    let report = issue_all(&issuer, &domains, |domain, result| {
        done += 1;
        spinner.suspend(|| match result {
            Ok(()) => success(&format!("Issued {}", domain.cyan())),
            Err(e) => error(&format!("{}: {}", domain.cyan(), e)),
        });
        if let Some(next) = domains.get(done) {
            spinner.set_message(format!("Requesting {} ({}/{})...", next, done + 1, total));
        }
    })
    .await;
    spinner.finish_and_clear();

    println!();
    if report.has_failures() {
        error(&format!(
            "{} issued, {} failed",
            report.issued.len(),
            report.failed.len()
        ));
        Ok(ExitCode::from(EXIT_DOMAIN_FAILURE))
    } else {
        success(&format!("All {} certificate(s) issued", report.issued.len()));
        info("Certificates will be renewed and deployed by `certwarden check`");
        Ok(ExitCode::SUCCESS)
    }
}

/// Validate configuration file
fn validate_command(config_path: PathBuf) -> anyhow::Result<ExitCode> {
    if !config_path.exists() {
        anyhow::bail!("Configuration file {} does not exist", config_path.display());
    }

    info(&format!("Validating {}", config_path.display().to_string().bright_white()));
    let config = CertwardenConfig::load(&config_path)?;

    success("Configuration file is valid");
    println!();
    println!("  {} {}", "Store:".bright_white(), config.store.path.display());
    println!("  {} {} days", "Threshold:".bright_white(), config.renewal.threshold_days);
    println!("  {} {}", "Playbook:".bright_white(), config.deploy.playbook.display());
    println!("  {} {}", "Inventory:".bright_white(), config.deploy.inventory.display());
    println!();

    if let Err(e) = config.validate_issue() {
        warning(&format!("Issuance not configured: {}", e));
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(domains: &[&str], file: Option<PathBuf>) -> TargetArgs {
        TargetArgs {
            config: PathBuf::from("certwarden.toml"),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            domains_file: file,
        }
    }

    #[test]
    fn test_no_selection_means_whole_store() {
        assert_eq!(selected_domains(&target(&[], None)).unwrap(), None);
    }

    #[test]
    fn test_selection_merges_flags_and_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("domains.txt");
        std::fs::write(&file, "c.com\n# comment\na.com\n").unwrap();

        let selected = selected_domains(&target(&["B.com", "a.com"], Some(file))).unwrap();
        assert_eq!(selected, Some(vec!["a.com".to_string(), "b.com".to_string(), "c.com".to_string()]));
    }

    #[test]
    fn test_threshold_override() {
        let config = CertwardenConfig::default();
        assert_eq!(effective_threshold(&config, None).unwrap(), 30);
        assert_eq!(effective_threshold(&config, Some(7)).unwrap(), 7);
        assert!(effective_threshold(&config, Some(0)).is_err());
    }
}
