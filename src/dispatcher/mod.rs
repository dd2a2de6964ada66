// Renewal Dispatcher
// Walks the certificate store one domain at a time: check expiry, renew when due, then deploy
//
// Per-domain lifecycle:
//   Discovered -> SkippedValid | ReadError | DueForRenewal
//   DueForRenewal -> RenewFailed | Renewed
//   Renewed -> RenewedDeployFailed | RenewedDeployed

use crate::deployment::Deployer;
use crate::expiry::{self, days_until_expiry, is_due};
use crate::observability;
use crate::renewal::Renewer;
use crate::report::{DomainRecord, Outcome, Reporter, RunSummary};
use crate::store::{CertificateStore, ReadError, StoreUnavailable};
use crate::timer::{ensure_no_competing_timer, TimerControl};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Knobs for a single dispatcher run
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Renew when remaining days are at or below this value (> 0)
    pub threshold_days: u32,

    /// Treat every readable certificate as due
    pub force: bool,

    /// Restrict the run to these domains; `None` processes the whole store
    pub domains: Option<Vec<String>>,

    /// Timer units that must not run alongside the dispatcher
    pub timer_units: Vec<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            threshold_days: 30,
            force: false,
            domains: None,
            timer_units: Vec::new(),
        }
    }
}

/// Expiry status of one stored certificate
#[derive(Debug, Clone)]
pub struct ExpiryCheck {
    pub certificate: PathBuf,
    pub expires_at: DateTime<Utc>,
    pub days_until_expiry: i64,
}

/// Read a domain's certificate (elevating only on failure) and compute its remaining days
pub async fn check_expiry(
    store: &CertificateStore,
    domain: &str,
    now: DateTime<Utc>,
) -> Result<ExpiryCheck, ReadError> {
    let certificate = store.certificate_path(domain);
    let pem = store.read_certificate(domain).await?;
    let expires_at = expiry::not_after(&pem).map_err(|source| ReadError::Invalid {
        path: certificate.clone(),
        source,
    })?;

    Ok(ExpiryCheck {
        certificate,
        expires_at,
        days_until_expiry: days_until_expiry(expires_at, now),
    })
}

pub struct Dispatcher {
    store: CertificateStore,
    renewer: Arc<dyn Renewer>,
    deployer: Arc<dyn Deployer>,
    timers: Option<Arc<dyn TimerControl>>,
    reporter: Arc<dyn Reporter>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        store: CertificateStore,
        renewer: Arc<dyn Renewer>,
        deployer: Arc<dyn Deployer>,
        reporter: Arc<dyn Reporter>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            store,
            renewer,
            deployer,
            timers: None,
            reporter,
            options,
        }
    }

    /// Disable competing renewal timers through `timers` before each run
    pub fn with_timers(mut self, timers: Arc<dyn TimerControl>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Process every domain once. Only an unreadable store aborts the run;
    /// every per-domain failure ends up in the summary instead.
    pub async fn run(&self) -> Result<RunSummary, StoreUnavailable> {
        let run_id = Uuid::new_v4();
        let span = observability::run_span(run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary, StoreUnavailable> {
        let started_at = Utc::now();
        info!(
            store = %self.store.root().display(),
            threshold_days = self.options.threshold_days,
            force = self.options.force,
            "Renewal run started"
        );

        self.disable_competing_timers().await;

        let stored = self.store.enumerate_domains().await?;
        self.reporter.store_enumerated(self.store.root(), stored.len());

        let targets = match &self.options.domains {
            Some(requested) => requested
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            None => stored.clone(),
        };

        let mut records = Vec::with_capacity(targets.len());
        for domain in &targets {
            let record = if stored.binary_search(domain).is_ok() {
                self.process(domain).await
            } else {
                warn!(domain = %domain, "Requested domain has no directory in the certificate store");
                DomainRecord {
                    domain: domain.clone(),
                    certificate: self.store.certificate_path(domain),
                    days_until_expiry: None,
                    outcome: Outcome::ReadError,
                    detail: Some("no directory in certificate store".to_string()),
                }
            };
            self.reporter.domain_finished(&record);
            records.push(record);
        }

        let summary = RunSummary::new(run_id, started_at, self.options.threshold_days, records);
        info!(
            renewed = summary.renewed,
            failed = summary.failed,
            untouched = summary.untouched,
            "Renewal run finished"
        );
        self.reporter.run_finished(&summary);
        Ok(summary)
    }

    async fn disable_competing_timers(&self) {
        let Some(timers) = &self.timers else {
            return;
        };
        if self.options.timer_units.is_empty() {
            return;
        }

        let sweep = ensure_no_competing_timer(timers.as_ref(), &self.options.timer_units).await;
        for unit in &sweep.disabled {
            self.reporter.timer_disabled(unit);
        }
        for (unit, e) in &sweep.failed {
            warn!(unit = %unit, error = %e, "Competing renewal timer may still be active, continuing");
        }
    }

    /// Drive one domain from Discovered to a terminal outcome
    async fn process(&self, domain: &str) -> DomainRecord {
        let mut record = DomainRecord {
            domain: domain.to_string(),
            certificate: self.store.certificate_path(domain),
            days_until_expiry: None,
            outcome: Outcome::ReadError,
            detail: None,
        };

        let check = match check_expiry(&self.store, domain, Utc::now()).await {
            Ok(check) => check,
            Err(e) => {
                error!(domain = %domain, stage = "read", error = %e, "Cannot determine certificate expiry");
                record.detail = Some(e.to_string());
                return record;
            }
        };

        let days = check.days_until_expiry;
        record.days_until_expiry = Some(days);

        let due = self.options.force || is_due(days, self.options.threshold_days);
        self.reporter.domain_checked(domain, days, due);

        if !due {
            info!(domain = %domain, days_until_expiry = days, "Certificate still valid");
            record.outcome = Outcome::SkippedValid;
            return record;
        }

        info!(domain = %domain, days_until_expiry = days, "Certificate due for renewal");

        if let Err(e) = self.renewer.renew(domain).await {
            error!(domain = %domain, stage = "renew", error = %e, "Renewal failed");
            record.outcome = Outcome::RenewFailed;
            record.detail = Some(e.to_string());
            return record;
        }

        match self.deployer.deploy(domain).await {
            Ok(()) => {
                record.outcome = Outcome::RenewedDeployed;
            }
            Err(e) => {
                error!(
                    domain = %domain,
                    stage = "deploy",
                    error = %e,
                    "Certificate renewed locally but NOT deployed; serving host still has the old certificate"
                );
                record.outcome = Outcome::RenewedDeployFailed;
                record.detail = Some(e.to_string());
            }
        }

        record
    }
}
