// Batch certificate issuance
// Requests new certificates from Certbot using the Cloudflare DNS-01 plugin

use crate::config::IssueConfig;
use crate::process::{ProcessError, ProcessRunner};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Spawn(#[from] ProcessError),

    #[error("certbot certonly for {domain} failed with {detail}")]
    Certbot { domain: String, detail: String },
}

/// Issues one certificate lineage per domain, named after the domain so it
/// lands in `<store>/<domain>/`
pub struct CertbotIssuer {
    runner: Arc<dyn ProcessRunner>,
    certbot: String,
    email: String,
    credentials: PathBuf,
    propagation_seconds: u32,
    include_wildcard: bool,
}

impl CertbotIssuer {
    /// Build from the `[issue]` section; email and credentials must be set
    pub fn from_config(
        runner: Arc<dyn ProcessRunner>,
        certbot: impl Into<String>,
        config: &IssueConfig,
    ) -> anyhow::Result<Self> {
        let email = config
            .email
            .clone()
            .context("issue.email is required to issue certificates")?;
        let credentials = config
            .cloudflare_credentials
            .clone()
            .context("issue.cloudflare_credentials is required to issue certificates")?;

        Ok(Self {
            runner,
            certbot: certbot.into(),
            email,
            credentials,
            propagation_seconds: config.propagation_seconds,
            include_wildcard: config.include_wildcard,
        })
    }

    pub fn arguments(&self, domain: &str) -> Vec<String> {
        let mut args = vec![
            "certonly".to_string(),
            "--dns-cloudflare".to_string(),
            "--dns-cloudflare-credentials".to_string(),
            self.credentials.to_string_lossy().into_owned(),
            "--dns-cloudflare-propagation-seconds".to_string(),
            self.propagation_seconds.to_string(),
            "--cert-name".to_string(),
            domain.to_string(),
            "-d".to_string(),
            domain.to_string(),
        ];
        if self.include_wildcard && !domain.starts_with("*.") {
            args.push("-d".to_string());
            args.push(format!("*.{}", domain));
        }
        args.extend(
            [
                "--email",
                self.email.as_str(),
                "--agree-tos",
                "--non-interactive",
                "--keep-until-expiring",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    pub async fn issue(&self, domain: &str) -> Result<(), IssueError> {
        info!(domain = %domain, wildcard = self.include_wildcard, "Issuing certificate");

        let output = self.runner.run(&self.certbot, &self.arguments(domain)).await?;
        if output.success() {
            info!(domain = %domain, "Certificate issued");
            Ok(())
        } else {
            let detail = output.describe();
            error!(domain = %domain, detail = %detail, "Certificate issuance failed");
            Err(IssueError::Certbot {
                domain: domain.to_string(),
                detail,
            })
        }
    }
}

/// Per-domain results of a batch issuance
#[derive(Debug, Default)]
pub struct IssueReport {
    pub issued: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl IssueReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Issue certificates for each domain in turn; one failure does not stop the batch
pub async fn issue_all<F>(issuer: &CertbotIssuer, domains: &[String], mut on_domain: F) -> IssueReport
where
    F: FnMut(&str, &Result<(), IssueError>),
{
    let mut report = IssueReport::default();

    for domain in domains {
        let result = issuer.issue(domain).await;
        on_domain(domain, &result);
        match result {
            Ok(()) => report.issued.push(domain.clone()),
            Err(e) => report.failed.push((domain.clone(), e.to_string())),
        }
    }

    report
}
