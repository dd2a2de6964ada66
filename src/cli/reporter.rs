// Console reporter
// Colored per-domain lines and the final run summary; JSON mode prints only the summary

use super::{error, info, success, warning, OutputFormat};
use crate::report::{DomainRecord, Outcome, Reporter, RunSummary};
use colored::*;
use std::path::Path;

pub struct ConsoleReporter {
    format: OutputFormat,
}

impl ConsoleReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn text(&self) -> bool {
        self.format == OutputFormat::Text
    }
}

/// Colored label for an outcome
pub fn outcome_label(outcome: Outcome) -> ColoredString {
    match outcome {
        Outcome::SkippedValid => outcome.label().bright_black(),
        Outcome::RenewedDeployed => outcome.label().green().bold(),
        Outcome::RenewedDeployFailed => outcome.label().yellow().bold(),
        Outcome::RenewFailed | Outcome::ReadError => outcome.label().red().bold(),
    }
}

/// Colored "N days" text, red once expired
pub fn days_label(days: Option<i64>) -> ColoredString {
    match days {
        Some(days) if days < 0 => format!("expired {} days ago", -days).red(),
        Some(days) => format!("{} days", days).cyan(),
        None => "unknown".bright_black(),
    }
}

impl Reporter for ConsoleReporter {
    fn timer_disabled(&self, unit: &str) {
        if self.text() {
            warning(&format!("Disabled competing renewal timer {}", unit.bright_white()));
        }
    }

    fn store_enumerated(&self, root: &Path, count: usize) {
        if self.text() {
            info(&format!(
                "Found {} certificate(s) in {}",
                count.to_string().bright_white(),
                root.display()
            ));
        }
    }

    fn domain_checked(&self, domain: &str, days_until_expiry: i64, due: bool) {
        if self.text() && due {
            info(&format!(
                "{} expires in {}, renewing",
                domain.cyan(),
                days_label(Some(days_until_expiry))
            ));
        }
    }

    fn domain_finished(&self, record: &DomainRecord) {
        if !self.text() {
            return;
        }
        let domain = record.domain.cyan();
        match record.outcome {
            Outcome::SkippedValid => println!(
                "  {} {} ({})",
                "•".bright_black(),
                domain,
                days_label(record.days_until_expiry)
            ),
            Outcome::RenewedDeployed => success(&format!("{} renewed and deployed", domain)),
            Outcome::RenewedDeployFailed => warning(&format!(
                "{} renewed locally but deployment failed, serving host is stale: {}",
                domain,
                record.detail.as_deref().unwrap_or("unknown error")
            )),
            Outcome::RenewFailed | Outcome::ReadError => error(&format!(
                "{} failed at {} stage: {}",
                domain,
                record.outcome.stage().unwrap_or("unknown"),
                record.detail.as_deref().unwrap_or("unknown error")
            )),
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        match self.format {
            OutputFormat::Json => match serde_json::to_string_pretty(summary) {
                Ok(json) => println!("{}", json),
                Err(e) => error(&format!("Failed to encode summary: {}", e)),
            },
            OutputFormat::Text => print_summary(summary),
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "┌─── Renewal Summary ───────────────────────────┐".bright_white());
    println!(
        "  {} {}   {} {}   {} {}",
        "Renewed:".bright_white(),
        summary.renewed.to_string().green(),
        "Failed:".bright_white(),
        summary.failed.to_string().red(),
        "Untouched:".bright_white(),
        summary.untouched.to_string().bright_black()
    );
    print_partition("Renewed", summary.renewed_records());
    print_partition("Failed", summary.failed_records());
    print_partition("Untouched", summary.untouched_records());
    println!("{}", "└───────────────────────────────────────────────┘".bright_white());
    println!();

    if summary.has_failures() {
        error(&format!("{} domain(s) need attention", summary.failed));
    } else {
        success("All certificates are current");
    }
}

fn print_partition<'a>(title: &str, records: impl Iterator<Item = &'a DomainRecord>) {
    let mut records = records.peekable();
    if records.peek().is_none() {
        return;
    }
    println!("  {}", title.bright_cyan().bold());
    for record in records {
        println!(
            "    {:<40} {:<24} {}",
            record.domain,
            outcome_label(record.outcome),
            days_label(record.days_until_expiry)
        );
    }
}
