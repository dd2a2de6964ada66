// Certificate renewal through Certbot
// Certbot owns the ACME exchange; this module only asks it to renew one lineage

use crate::process::{ProcessError, ProcessRunner};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RenewError {
    #[error(transparent)]
    Spawn(#[from] ProcessError),

    #[error("certbot renew for {domain} failed with {detail}")]
    Certbot { domain: String, detail: String },
}

/// Renews the certificate for one domain
#[async_trait]
pub trait Renewer: Send + Sync {
    async fn renew(&self, domain: &str) -> Result<(), RenewError>;
}

/// Invokes `certbot renew --cert-name <domain> --force-renewal`.
/// The caller has already decided the certificate is due, so certbot's own
/// `renew_before_expiry` window must not turn the request into a no-op.
pub struct CertbotRenewer {
    runner: Arc<dyn ProcessRunner>,
    certbot: String,
}

impl CertbotRenewer {
    pub fn new(runner: Arc<dyn ProcessRunner>, certbot: impl Into<String>) -> Self {
        Self {
            runner,
            certbot: certbot.into(),
        }
    }

    fn arguments(&self, domain: &str) -> Vec<String> {
        vec![
            "renew".to_string(),
            "--cert-name".to_string(),
            domain.to_string(),
            "--non-interactive".to_string(),
            "--quiet".to_string(),
            "--force-renewal".to_string(),
        ]
    }
}

#[async_trait]
impl Renewer for CertbotRenewer {
    async fn renew(&self, domain: &str) -> Result<(), RenewError> {
        info!(domain = %domain, "Renewing certificate");

        let output = self.runner.run(&self.certbot, &self.arguments(domain)).await?;
        if output.success() {
            info!(domain = %domain, "Certificate renewed");
            Ok(())
        } else {
            let detail = output.describe();
            warn!(domain = %domain, detail = %detail, "Certbot renewal failed");
            Err(RenewError::Certbot {
                domain: domain.to_string(),
                detail,
            })
        }
    }
}
