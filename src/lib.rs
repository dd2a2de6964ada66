// Certwarden - Let's Encrypt renewal dispatcher
// Certificate store -> expiry check -> certbot renewal -> ansible deployment -> summary

pub mod cli;
pub mod config;
pub mod deployment;
pub mod dispatcher;
pub mod expiry;
pub mod issue;
pub mod observability;
pub mod process;
pub mod renewal;
pub mod report;
pub mod store;
pub mod timer;

pub use config::CertwardenConfig;
pub use dispatcher::{DispatchOptions, Dispatcher};
pub use report::{DomainRecord, Outcome, Reporter, RunSummary};
