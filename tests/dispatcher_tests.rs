// Dispatcher integration tests
// Real certificates in a temporary store, stubbed certbot/ansible/systemd collaborators

use async_trait::async_trait;
use certwarden::deployment::{DeployError, Deployer};
use certwarden::process::{ProcessError, ProcessOutput, ProcessRunner};
use certwarden::renewal::{RenewError, Renewer};
use certwarden::report::{DomainRecord, Outcome, Reporter, RunSummary, SilentReporter};
use certwarden::store::elevation::Elevation;
use certwarden::store::CertificateStore;
use certwarden::timer::{TimerControl, TimerError};
use certwarden::{DispatchOptions, Dispatcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Write `<root>/<domain>/cert.pem` expiring `days` whole days from now
fn write_cert(root: &Path, domain: &str, days: i64) {
    let dir = root.join(domain);
    std::fs::create_dir_all(&dir).unwrap();

    let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]);
    params.not_after =
        time::OffsetDateTime::now_utc() + time::Duration::days(days) + time::Duration::hours(1);
    let pem = rcgen::Certificate::from_params(params)
        .unwrap()
        .serialize_pem()
        .unwrap();
    std::fs::write(dir.join("cert.pem"), pem).unwrap();
}

/// Shared, ordered log of everything the collaborators were asked to do
#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Renewer that behaves like certbot: rewrites the certificate with 90 days of validity
struct StubRenewer {
    root: PathBuf,
    journal: Arc<Journal>,
    failing: HashSet<String>,
    extends_expiry: bool,
}

#[async_trait]
impl Renewer for StubRenewer {
    async fn renew(&self, domain: &str) -> Result<(), RenewError> {
        self.journal.push(format!("renew {}", domain));
        if self.failing.contains(domain) {
            return Err(RenewError::Certbot {
                domain: domain.to_string(),
                detail: "exit code 1: too many certificates already issued".to_string(),
            });
        }
        if self.extends_expiry {
            write_cert(&self.root, domain, 90);
        }
        Ok(())
    }
}

struct StubDeployer {
    journal: Arc<Journal>,
    failing: HashSet<String>,
}

#[async_trait]
impl Deployer for StubDeployer {
    async fn deploy(&self, domain: &str) -> Result<(), DeployError> {
        self.journal.push(format!("deploy {}", domain));
        if self.failing.contains(domain) {
            return Err(DeployError::Playbook {
                domain: domain.to_string(),
                hosts: domain.to_string(),
                detail: "exit code 4: host unreachable".to_string(),
            });
        }
        Ok(())
    }
}

struct StubTimers {
    journal: Arc<Journal>,
    active: Mutex<bool>,
}

#[async_trait]
impl TimerControl for StubTimers {
    async fn exists(&self, _unit: &str) -> Result<bool, TimerError> {
        Ok(true)
    }

    async fn is_active(&self, _unit: &str) -> Result<bool, TimerError> {
        Ok(*self.active.lock().unwrap())
    }

    async fn disable(&self, unit: &str) -> Result<(), TimerError> {
        self.journal.push(format!("disable {}", unit));
        *self.active.lock().unwrap() = false;
        Ok(())
    }
}

/// Runner that must never be reached; elevation is disabled in these tests
struct NoRunner;

#[async_trait]
impl ProcessRunner for NoRunner {
    async fn run(&self, program: &str, _args: &[String]) -> Result<ProcessOutput, ProcessError> {
        panic!("unexpected external command {}", program);
    }
}

#[derive(Default)]
struct CollectingReporter {
    finished: Mutex<Vec<(String, Outcome)>>,
}

impl Reporter for CollectingReporter {
    fn domain_finished(&self, record: &DomainRecord) {
        self.finished
            .lock()
            .unwrap()
            .push((record.domain.clone(), record.outcome));
    }
}

struct Harness {
    temp: TempDir,
    journal: Arc<Journal>,
    renew_failing: HashSet<String>,
    deploy_failing: HashSet<String>,
    extends_expiry: bool,
    threshold_days: u32,
}

impl Harness {
    fn new(threshold_days: u32) -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            journal: Arc::new(Journal::default()),
            renew_failing: HashSet::new(),
            deploy_failing: HashSet::new(),
            extends_expiry: true,
            threshold_days,
        }
    }

    fn root(&self) -> PathBuf {
        self.temp.path().join("live")
    }

    fn cert(&self, domain: &str, days: i64) -> &Self {
        write_cert(&self.root(), domain, days);
        self
    }

    fn dispatcher_with(&self, root: PathBuf, reporter: Arc<dyn Reporter>) -> Dispatcher {
        let store = CertificateStore::new(root, "cert.pem", Elevation::disabled(Arc::new(NoRunner)));
        Dispatcher::new(
            store,
            Arc::new(StubRenewer {
                root: self.root(),
                journal: self.journal.clone(),
                failing: self.renew_failing.clone(),
                extends_expiry: self.extends_expiry,
            }),
            Arc::new(StubDeployer {
                journal: self.journal.clone(),
                failing: self.deploy_failing.clone(),
            }),
            reporter,
            DispatchOptions {
                threshold_days: self.threshold_days,
                ..Default::default()
            },
        )
    }

    fn dispatcher(&self) -> Dispatcher {
        self.dispatcher_with(self.root(), Arc::new(SilentReporter))
    }

    async fn run(&self) -> RunSummary {
        self.dispatcher().run().await.unwrap()
    }
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_due_domain_renewed_valid_domain_skipped() {
    let harness = Harness::new(14);
    harness.cert("a.com", 5).cert("b.com", 30);

    let summary = harness.run().await;

    assert_eq!(summary.outcome_of("a.com"), Some(Outcome::RenewedDeployed));
    assert_eq!(summary.outcome_of("b.com"), Some(Outcome::SkippedValid));
    assert_eq!(harness.journal.entries(), vec!["renew a.com", "deploy a.com"]);

    let a = &summary.records[0];
    assert_eq!(a.domain, "a.com");
    assert_eq!(a.days_until_expiry, Some(5));
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn test_deploy_failure_fails_the_run() {
    let mut harness = Harness::new(14);
    harness.deploy_failing = set(&["a.com"]);
    harness.cert("a.com", 5);

    let summary = harness.run().await;

    assert_eq!(summary.outcome_of("a.com"), Some(Outcome::RenewedDeployFailed));
    assert_eq!(summary.renewed, 0);
    assert_eq!(summary.failed, 1);
    assert!(summary.has_failures());
    assert!(summary.records[0]
        .detail
        .as_deref()
        .unwrap()
        .contains("host unreachable"));
}

#[tokio::test]
async fn test_missing_store_root_is_fatal() {
    let harness = Harness::new(14);
    let reporter = Arc::new(CollectingReporter::default());

    let result = harness
        .dispatcher_with(harness.temp.path().join("nowhere"), reporter.clone())
        .run()
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("nowhere"));
    assert!(reporter.finished.lock().unwrap().is_empty());
    assert!(harness.journal.entries().is_empty());
}

#[tokio::test]
async fn test_corrupt_certificate_is_isolated() {
    let harness = Harness::new(14);
    harness.cert("a.com", 3).cert("c.com", 2);
    std::fs::create_dir_all(harness.root().join("b.com")).unwrap();
    std::fs::write(
        harness.root().join("b.com").join("cert.pem"),
        "-----BEGIN CERTIFICATE-----\ngarbage\n-----END CERTIFICATE-----\n",
    )
    .unwrap();

    let summary = harness.run().await;

    assert_eq!(summary.outcome_of("a.com"), Some(Outcome::RenewedDeployed));
    assert_eq!(summary.outcome_of("b.com"), Some(Outcome::ReadError));
    assert_eq!(summary.outcome_of("c.com"), Some(Outcome::RenewedDeployed));
    assert_eq!(summary.records[1].days_until_expiry, None);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn test_failures_never_stop_later_domains() {
    let mut harness = Harness::new(14);
    harness.renew_failing = set(&["b.com"]);
    harness.deploy_failing = set(&["c.com"]);
    harness.cert("a.com", 1).cert("b.com", 1).cert("c.com", 1).cert("e.com", 1);
    // Domain directory without a certificate file
    std::fs::create_dir_all(harness.root().join("d.com")).unwrap();

    let summary = harness.run().await;

    let outcomes: Vec<_> = summary
        .records
        .iter()
        .map(|r| (r.domain.as_str(), r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("a.com", Outcome::RenewedDeployed),
            ("b.com", Outcome::RenewFailed),
            ("c.com", Outcome::RenewedDeployFailed),
            ("d.com", Outcome::ReadError),
            ("e.com", Outcome::RenewedDeployed),
        ]
    );
    // No deployment after a failed renewal
    assert!(!harness.journal.entries().contains(&"deploy b.com".to_string()));
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.renewed, 2);
}

#[tokio::test]
async fn test_every_subdirectory_becomes_a_record() {
    let harness = Harness::new(30);
    let domains = ["m.net", "a.org", "z.io", "b.com", "k.dev"];
    for (i, domain) in domains.iter().enumerate() {
        harness.cert(domain, 10 * i as i64);
    }
    std::fs::write(harness.root().join("README"), "This directory contains your keys").unwrap();

    let reporter = Arc::new(CollectingReporter::default());
    let summary = harness
        .dispatcher_with(harness.root(), reporter.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.records.len(), domains.len());
    assert_eq!(summary.renewed + summary.failed + summary.untouched, domains.len());

    let order: Vec<_> = reporter
        .finished
        .lock()
        .unwrap()
        .iter()
        .map(|(d, _)| d.clone())
        .collect();
    assert_eq!(order, vec!["a.org", "b.com", "k.dev", "m.net", "z.io"]);
}

#[tokio::test]
async fn test_second_run_skips_freshly_renewed() {
    let harness = Harness::new(14);
    harness.cert("a.com", 5).cert("b.com", 12).cert("c.com", 60);

    let first = harness.run().await;
    assert_eq!(first.renewed, 2);

    let second = harness.run().await;
    assert!(second
        .records
        .iter()
        .all(|r| r.outcome == Outcome::SkippedValid));
    assert_eq!(second.records[0].days_until_expiry, Some(90));
}

#[tokio::test]
async fn test_renewal_that_does_not_extend_is_retriggered() {
    let mut harness = Harness::new(14);
    harness.extends_expiry = false;
    harness.cert("a.com", 5);

    harness.run().await;
    let second = harness.run().await;

    assert_eq!(second.outcome_of("a.com"), Some(Outcome::RenewedDeployed));
    assert_eq!(
        harness.journal.entries(),
        vec!["renew a.com", "deploy a.com", "renew a.com", "deploy a.com"]
    );
}

#[tokio::test]
async fn test_expired_certificate_is_renewed() {
    let harness = Harness::new(7);
    harness.cert("old.com", -3);

    let summary = harness.run().await;

    let record = &summary.records[0];
    assert!(record.days_until_expiry.unwrap() < 0);
    assert_eq!(record.outcome, Outcome::RenewedDeployed);
}

#[tokio::test]
async fn test_competing_timer_disabled_before_scan() {
    let harness = Harness::new(14);
    harness.cert("a.com", 5);

    let timers = Arc::new(StubTimers {
        journal: harness.journal.clone(),
        active: Mutex::new(true),
    });
    let store = CertificateStore::new(harness.root(), "cert.pem", Elevation::disabled(Arc::new(NoRunner)));
    let dispatcher = Dispatcher::new(
        store,
        Arc::new(StubRenewer {
            root: harness.root(),
            journal: harness.journal.clone(),
            failing: HashSet::new(),
            extends_expiry: true,
        }),
        Arc::new(StubDeployer {
            journal: harness.journal.clone(),
            failing: HashSet::new(),
        }),
        Arc::new(SilentReporter),
        DispatchOptions {
            threshold_days: 14,
            timer_units: vec!["snap.certbot.renew.timer".to_string()],
            ..Default::default()
        },
    )
    .with_timers(timers);

    dispatcher.run().await.unwrap();
    dispatcher.run().await.unwrap();

    assert_eq!(
        harness.journal.entries(),
        vec!["disable snap.certbot.renew.timer", "renew a.com", "deploy a.com"]
    );
}
