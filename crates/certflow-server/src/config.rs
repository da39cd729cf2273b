//! Server and batch run configuration.

use std::net::SocketAddr;
use std::time::Duration;

use certflow_core::{CertificateConstants, MessageTemplate, RetryPolicy};
use serde::{Deserialize, Serialize};

/// What a batch does when a row fails after its retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed row. Outcomes gathered so far are still
    /// written so a rerun resumes after them.
    #[default]
    Abort,
    /// Record the row as failed and move on.
    Continue,
}

/// When outcomes are written back to the sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One bulk write at the end of the run.
    #[default]
    Batched,
    /// One write after every successful row.
    PerRow,
}

/// Knobs for a single batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub failure_policy: FailurePolicy,
    pub commit_mode: CommitMode,
    pub retry: RetryPolicy,
    /// Overall budget for one run. `None` disables the deadline.
    pub deadline: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            commit_mode: CommitMode::default(),
            retry: RetryPolicy::default(),
            deadline: Some(Duration::from_secs(BatchConfig::DEFAULT_DEADLINE_SECS)),
        }
    }
}

impl BatchConfig {
    pub const DEFAULT_DEADLINE_SECS: u64 = 600;

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Sender identity for delivered certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    /// Address in the `From` header. Gmail sends as the authorized account,
    /// so this should be that account or one of its aliases. When unset the
    /// header is left to Gmail and the display name is not shown.
    pub sender_address: Option<String>,
    /// Display name, also used to sign the message body.
    pub sender_name: String,
    pub template: MessageTemplate,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender_address: None,
            sender_name: "CSI PCE".to_string(),
            template: MessageTemplate::default(),
        }
    }
}

/// Dashboard server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Adds `Secure` to the session cookies. Enable behind HTTPS.
    pub secure_cookies: bool,

    pub batch: BatchConfig,

    pub certificate: CertificateConstants,

    pub mail: MailConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            secure_cookies: false,
            batch: BatchConfig::default(),
            certificate: CertificateConstants::default(),
            mail: MailConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_certificate(mut self, constants: CertificateConstants) -> Self {
        self.certificate = constants;
        self
    }

    pub fn with_mail(mut self, mail: MailConfig) -> Self {
        self.mail = mail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(!config.secure_cookies);
        assert_eq!(config.batch.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.batch.commit_mode, CommitMode::Batched);
        assert_eq!(config.batch.deadline, Some(Duration::from_secs(600)));
        assert_eq!(config.mail.sender_name, "CSI PCE");
        assert_eq!(config.certificate.team_name, "CSI");
    }

    #[test]
    fn builders() {
        let config = ServerConfig::new("0.0.0.0:8080".parse().unwrap())
            .with_secure_cookies(true)
            .with_batch(
                BatchConfig::default()
                    .with_failure_policy(FailurePolicy::Continue)
                    .with_commit_mode(CommitMode::PerRow)
                    .with_retry(RetryPolicy::none())
                    .with_deadline(None),
            );
        assert!(config.secure_cookies);
        assert_eq!(config.batch.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.batch.commit_mode, CommitMode::PerRow);
        assert_eq!(config.batch.retry.max_attempts, 1);
        assert!(config.batch.deadline.is_none());
    }

    #[test]
    fn policy_names() {
        let policy: FailurePolicy = serde_json::from_str("\"continue\"").unwrap();
        assert_eq!(policy, FailurePolicy::Continue);
        let mode: CommitMode = serde_json::from_str("\"per_row\"").unwrap();
        assert_eq!(mode, CommitMode::PerRow);
    }
}
