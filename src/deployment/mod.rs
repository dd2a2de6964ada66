// Certificate Deployment Module
// Pushes a renewed certificate to its serving host with an Ansible playbook

use crate::process::{ProcessError, ProcessRunner};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Spawn(#[from] ProcessError),

    #[error("ansible-playbook for {domain} (hosts {hosts}) failed with {detail}")]
    Playbook {
        domain: String,
        hosts: String,
        detail: String,
    },
}

/// Delivers the current certificate of one domain to the host(s) serving it
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, domain: &str) -> Result<(), DeployError>;
}

/// Runs `ansible-playbook` limited to the domain's inventory host.
/// The playbook escalates on the remote side by itself.
pub struct AnsibleDeployer {
    runner: Arc<dyn ProcessRunner>,
    ansible_playbook: String,
    playbook: PathBuf,
    inventory: PathBuf,
    hosts: BTreeMap<String, String>,
}

impl AnsibleDeployer {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        ansible_playbook: impl Into<String>,
        playbook: impl Into<PathBuf>,
        inventory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            ansible_playbook: ansible_playbook.into(),
            playbook: playbook.into(),
            inventory: inventory.into(),
            hosts: BTreeMap::new(),
        }
    }

    /// Map domains to inventory patterns; unmapped domains use their own name
    pub fn with_hosts(mut self, hosts: BTreeMap<String, String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Inventory pattern passed to `--limit`
    pub fn host_pattern<'a>(&'a self, domain: &'a str) -> &'a str {
        self.hosts.get(domain).map(String::as_str).unwrap_or(domain)
    }

    fn arguments(&self, domain: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.inventory.to_string_lossy().into_owned(),
            self.playbook.to_string_lossy().into_owned(),
            "--limit".to_string(),
            self.host_pattern(domain).to_string(),
            "-e".to_string(),
            format!("cert_domain={}", domain),
        ]
    }
}

#[async_trait]
impl Deployer for AnsibleDeployer {
    async fn deploy(&self, domain: &str) -> Result<(), DeployError> {
        let hosts = self.host_pattern(domain).to_string();
        info!(domain = %domain, hosts = %hosts, "Deploying certificate");

        let output = self
            .runner
            .run(&self.ansible_playbook, &self.arguments(domain))
            .await?;

        if output.success() {
            info!(domain = %domain, hosts = %hosts, "Certificate deployed");
            Ok(())
        } else {
            let detail = output.describe();
            warn!(domain = %domain, hosts = %hosts, detail = %detail, "Deployment failed");
            Err(DeployError::Playbook {
                domain: domain.to_string(),
                hosts,
                detail,
            })
        }
    }
}
