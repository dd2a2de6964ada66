// Certificate Store Reader
// Enumerates per-domain directories under the store root and reads their certificates

pub mod elevation;

use crate::expiry::ExpiryError;
use crate::process::args;
use elevation::{Elevation, ElevationError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The store root could not be listed, even with elevated privileges
#[derive(Debug, Error)]
#[error("certificate store {} is unavailable: {reason}", path.display())]
pub struct StoreUnavailable {
    pub path: PathBuf,
    pub reason: String,
}

/// A single domain's certificate could not be read or understood
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("certificate not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {source}; elevated read: {elevated}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        elevated: ElevationError,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ExpiryError,
    },
}

/// Directory of per-domain certificate folders (Certbot's `live/` layout)
#[derive(Clone)]
pub struct CertificateStore {
    root: PathBuf,
    cert_file: String,
    elevation: Elevation,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>, cert_file: impl Into<String>, elevation: Elevation) -> Self {
        Self {
            root: root.into(),
            cert_file: cert_file.into(),
            elevation,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the certificate file for a domain
    pub fn certificate_path(&self, domain: &str) -> PathBuf {
        self.root.join(domain).join(&self.cert_file)
    }

    /// List domain directories, sorted lexicographically.
    /// Falls back to an elevated listing when the direct one fails.
    pub async fn enumerate_domains(&self) -> Result<Vec<String>, StoreUnavailable> {
        let mut domains = match list_subdirectories(&self.root).await {
            Ok(domains) => domains,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(self.unavailable("directory does not exist".to_string()));
            }
            Err(e) => {
                warn!(
                    path = %self.root.display(),
                    error = %e,
                    "Direct listing of certificate store failed"
                );
                self.list_elevated()
                    .await
                    .map_err(|elevated| self.unavailable(format!("{}; elevated listing: {}", e, elevated)))?
            }
        };

        domains.sort();
        domains.dedup();

        info!(
            path = %self.root.display(),
            count = domains.len(),
            "Certificate store enumerated"
        );
        Ok(domains)
    }

    /// Read a domain's certificate bytes, unprivileged first
    pub async fn read_certificate(&self, domain: &str) -> Result<Vec<u8>, ReadError> {
        let path = self.certificate_path(domain);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ReadError::NotFound { path }),
            Err(source) => {
                debug!(domain = %domain, error = %source, "Direct certificate read failed");
                let path_arg = path.to_string_lossy().into_owned();
                match self.elevation.run("cat", &[path_arg]).await {
                    Ok(output) => Ok(output.stdout),
                    Err(elevated) => Err(ReadError::Unreadable {
                        path,
                        source,
                        elevated,
                    }),
                }
            }
        }
    }

    async fn list_elevated(&self) -> Result<Vec<String>, ElevationError> {
        let root = self.root.to_string_lossy().into_owned();
        let output = self
            .elevation
            .run(
                "find",
                &args([
                    root.as_str(),
                    "-mindepth",
                    "1",
                    "-maxdepth",
                    "1",
                    // -xtype follows symlinks like the direct listing does
                    "-xtype",
                    "d",
                    "-printf",
                    "%f\\n",
                ]),
            )
            .await?;

        Ok(output
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn unavailable(&self, reason: String) -> StoreUnavailable {
        StoreUnavailable {
            path: self.root.clone(),
            reason,
        }
    }
}

/// Names of the immediate subdirectories of `root` (symlinks followed).
/// An entry that cannot be resolved fails the listing, so the elevated
/// listing gets a chance instead of the domain silently disappearing.
async fn list_subdirectories(root: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let is_dir = match tokio::fs::metadata(entry.path()).await {
            Ok(meta) => meta.is_dir(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %entry.path().display(), "Skipping dangling symlink");
                false
            }
            // stat can fail on a root that is readable but not searchable;
            // the directory entry still knows a plain directory
            Err(e) => match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => true,
                _ => return Err(e),
            },
        };
        if !is_dir {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(name = ?raw, "Skipping non UTF-8 directory name"),
        }
    }

    Ok(names)
}
