// Configuration Management Module
// Handles certwarden.toml loading, defaults, and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "certwarden.toml";

/// Main certwarden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertwardenConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub renewal: RenewalConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub issue: IssueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root of the per-domain certificate directories
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Certificate file inside each domain directory
    #[serde(default = "default_cert_file")]
    pub cert_file: String,

    /// Command used to retry failed reads with elevated privileges; empty disables
    #[serde(default = "default_elevate_with")]
    pub elevate_with: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    /// Renew when this many days or fewer remain
    #[serde(default = "default_threshold_days")]
    pub threshold_days: u32,

    #[serde(default = "default_certbot")]
    pub certbot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_ansible_playbook")]
    pub ansible_playbook: String,

    #[serde(default = "default_playbook")]
    pub playbook: PathBuf,

    #[serde(default = "default_inventory")]
    pub inventory: PathBuf,

    /// Domain -> inventory host pattern; unmapped domains deploy to the host of the same name
    #[serde(default)]
    pub hosts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Disable the certbot packaging's own renewal timer before each run
    #[serde(default = "default_true")]
    pub manage: bool,

    #[serde(default = "default_timer_units")]
    pub units: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueConfig {
    #[serde(default)]
    pub email: Option<String>,

    /// Cloudflare API token ini consumed by certbot-dns-cloudflare
    #[serde(default)]
    pub cloudflare_credentials: Option<PathBuf>,

    #[serde(default = "default_propagation_seconds")]
    pub propagation_seconds: u32,

    /// Also request `*.<domain>` on each certificate
    #[serde(default = "default_true")]
    pub include_wildcard: bool,
}

// Default value functions
fn default_store_path() -> PathBuf { PathBuf::from("/etc/letsencrypt/live") }
fn default_cert_file() -> String { "cert.pem".to_string() }
fn default_elevate_with() -> String { "sudo".to_string() }
fn default_threshold_days() -> u32 { 30 }
fn default_certbot() -> String { "certbot".to_string() }
fn default_ansible_playbook() -> String { "ansible-playbook".to_string() }
fn default_playbook() -> PathBuf { PathBuf::from("/etc/ansible/playbooks/deploy-certs.yml") }
fn default_inventory() -> PathBuf { PathBuf::from("/etc/ansible/hosts") }
fn default_propagation_seconds() -> u32 { 60 }
fn default_true() -> bool { true }
fn default_timer_units() -> Vec<String> {
    vec![
        "snap.certbot.renew.timer".to_string(),
        "certbot-renew.timer".to_string(),
    ]
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            cert_file: default_cert_file(),
            elevate_with: default_elevate_with(),
        }
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
            certbot: default_certbot(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            ansible_playbook: default_ansible_playbook(),
            playbook: default_playbook(),
            inventory: default_inventory(),
            hosts: BTreeMap::new(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            manage: default_true(),
            units: default_timer_units(),
        }
    }
}

impl Default for IssueConfig {
    fn default() -> Self {
        Self {
            email: None,
            cloudflare_credentials: None,
            propagation_seconds: default_propagation_seconds(),
            include_wildcard: default_true(),
        }
    }
}

impl CertwardenConfig {
    /// Load configuration from file. A missing file is only tolerated at the
    /// default location, where built-in defaults are used instead.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

            let config = Self::parse(&contents)
                .with_context(|| format!("Invalid configuration file {}", path.display()))?;
            Ok(config)
        } else if path == Path::new(DEFAULT_CONFIG_PATH) {
            warn!("Configuration file not found, using defaults");
            info!("Create {} to customize configuration", DEFAULT_CONFIG_PATH);
            Ok(Self::default())
        } else {
            anyhow::bail!("Configuration file {} does not exist", path.display());
        }
    }

    /// Parse and validate TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: CertwardenConfig =
            toml::from_str(contents).context("Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration needed by the renewal run
    pub fn validate(&self) -> Result<()> {
        if self.renewal.threshold_days == 0 {
            anyhow::bail!("renewal.threshold_days must be greater than 0");
        }

        if self.store.cert_file.trim().is_empty() {
            anyhow::bail!("store.cert_file cannot be empty");
        }

        if self.renewal.certbot.trim().is_empty() {
            anyhow::bail!("renewal.certbot cannot be empty");
        }

        if self.deploy.playbook.as_os_str().is_empty() {
            anyhow::bail!("deploy.playbook cannot be empty");
        }

        if self.deploy.inventory.as_os_str().is_empty() {
            anyhow::bail!("deploy.inventory cannot be empty");
        }

        Ok(())
    }

    /// Additional checks for batch issuance
    pub fn validate_issue(&self) -> Result<()> {
        match self.issue.email.as_deref() {
            Some(email) if email.contains('@') => {}
            Some(email) => anyhow::bail!("issue.email '{}' is not an email address", email),
            None => anyhow::bail!("issue.email is required to issue certificates"),
        }

        if self.issue.cloudflare_credentials.is_none() {
            anyhow::bail!("issue.cloudflare_credentials is required to issue certificates");
        }

        Ok(())
    }
}

/// Read a domain list file: one domain per line, `#` starts a comment
pub fn load_domain_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read domain list {}", path.display()))?;
    Ok(parse_domain_list(&contents))
}

pub fn parse_domain_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_ascii_lowercase())
        .collect()
}
