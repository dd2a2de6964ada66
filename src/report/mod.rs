// Run Summary and Reporting
// Partitions per-domain outcomes and defines the reporting seam the dispatcher talks to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Terminal state of one domain for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    SkippedValid,
    RenewedDeployed,
    /// Renewed locally but the serving host still has the old certificate
    RenewedDeployFailed,
    RenewFailed,
    ReadError,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::SkippedValid => "skipped-valid",
            Outcome::RenewedDeployed => "renewed-deployed",
            Outcome::RenewedDeployFailed => "renewed-deploy-failed",
            Outcome::RenewFailed => "renew-failed",
            Outcome::ReadError => "read-error",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Outcome::RenewedDeployFailed | Outcome::RenewFailed | Outcome::ReadError
        )
    }

    /// Stage at which a failed domain stopped
    pub fn stage(self) -> Option<&'static str> {
        match self {
            Outcome::ReadError => Some("read"),
            Outcome::RenewFailed => Some("renew"),
            Outcome::RenewedDeployFailed => Some("deploy"),
            Outcome::SkippedValid | Outcome::RenewedDeployed => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One domain found in (or requested from) the certificate store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain: String,
    pub certificate: PathBuf,
    /// Unknown when the certificate could not be read
    pub days_until_expiry: Option<i64>,
    pub outcome: Outcome,
    /// Failure message for non-success outcomes
    pub detail: Option<String>,
}

/// Aggregated result of a dispatcher run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub threshold_days: u32,
    pub renewed: usize,
    pub failed: usize,
    pub untouched: usize,
    pub records: Vec<DomainRecord>,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        threshold_days: u32,
        records: Vec<DomainRecord>,
    ) -> Self {
        let failed = records.iter().filter(|r| r.outcome.is_failure()).count();
        let renewed = records
            .iter()
            .filter(|r| r.outcome == Outcome::RenewedDeployed)
            .count();
        let untouched = records
            .iter()
            .filter(|r| r.outcome == Outcome::SkippedValid)
            .count();

        Self {
            run_id,
            started_at,
            threshold_days,
            renewed,
            failed,
            untouched,
            records,
        }
    }

    pub fn renewed_records(&self) -> impl Iterator<Item = &DomainRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::RenewedDeployed)
    }

    pub fn failed_records(&self) -> impl Iterator<Item = &DomainRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn untouched_records(&self) -> impl Iterator<Item = &DomainRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::SkippedValid)
    }

    pub fn outcome_of(&self, domain: &str) -> Option<Outcome> {
        self.records
            .iter()
            .find(|r| r.domain == domain)
            .map(|r| r.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Presentation seam for dispatcher progress. All methods default to no-ops.
pub trait Reporter: Send + Sync {
    fn timer_disabled(&self, _unit: &str) {}

    fn store_enumerated(&self, _root: &std::path::Path, _count: usize) {}

    fn domain_checked(&self, _domain: &str, _days_until_expiry: i64, _due: bool) {}

    fn domain_finished(&self, _record: &DomainRecord) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Reporter that prints nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(domain: &str, outcome: Outcome) -> DomainRecord {
        DomainRecord {
            domain: domain.to_string(),
            certificate: PathBuf::from(format!("/etc/letsencrypt/live/{}/cert.pem", domain)),
            days_until_expiry: Some(10),
            outcome,
            detail: None,
        }
    }

    #[test]
    fn test_partition_counts() {
        let summary = RunSummary::new(
            Uuid::new_v4(),
            Utc::now(),
            14,
            vec![
                record("a.com", Outcome::RenewedDeployed),
                record("b.com", Outcome::SkippedValid),
                record("c.com", Outcome::RenewedDeployFailed),
                record("d.com", Outcome::RenewFailed),
                record("e.com", Outcome::ReadError),
            ],
        );

        assert_eq!(summary.renewed, 1);
        assert_eq!(summary.untouched, 1);
        assert_eq!(summary.failed, 3);
        assert!(summary.has_failures());
        assert_eq!(summary.outcome_of("c.com"), Some(Outcome::RenewedDeployFailed));
        assert_eq!(
            summary.failed_records().map(|r| r.domain.as_str()).collect::<Vec<_>>(),
            vec!["c.com", "d.com", "e.com"]
        );
    }

    #[test]
    fn test_all_success_has_no_failures() {
        let summary = RunSummary::new(
            Uuid::new_v4(),
            Utc::now(),
            14,
            vec![
                record("a.com", Outcome::RenewedDeployed),
                record("b.com", Outcome::SkippedValid),
            ],
        );
        assert!(!summary.has_failures());
    }

    #[test]
    fn test_outcome_labels_match_serde() {
        for outcome in [
            Outcome::SkippedValid,
            Outcome::RenewedDeployed,
            Outcome::RenewedDeployFailed,
            Outcome::RenewFailed,
            Outcome::ReadError,
        ] {
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.label()));
        }
    }

    #[test]
    fn test_json_summary_reads_back() {
        let mut failed = record("b.com", Outcome::RenewFailed);
        failed.detail = Some("certbot renew for b.com failed with exit code 1".to_string());
        let mut unreadable = record("c.com", Outcome::ReadError);
        unreadable.days_until_expiry = None;

        let summary = RunSummary::new(
            Uuid::new_v4(),
            Utc::now(),
            30,
            vec![record("a.com", Outcome::RenewedDeployed), failed, unreadable],
        );

        let json = serde_json::to_string_pretty(&summary).unwrap();
        let parsed: RunSummary = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.run_id, summary.run_id);
        assert_eq!(parsed.started_at, summary.started_at);
        assert_eq!((parsed.renewed, parsed.failed, parsed.untouched), (1, 2, 0));
        assert_eq!(parsed.outcome_of("b.com"), Some(Outcome::RenewFailed));
        assert_eq!(parsed.records[1].detail, summary.records[1].detail);
        assert_eq!(parsed.records[2].days_until_expiry, None);
        assert!(json.contains("\"outcome\": \"read-error\""));
    }
}
