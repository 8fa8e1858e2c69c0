//! Dispatch orchestrator.
//!
//! Ties the pipeline together: configuration check, message rendering,
//! transport selection, session. Submission fields are not validated here;
//! the HTTP layer owns validation, and the mailer only requires a
//! configured recipient.

use std::sync::Arc;

use crate::compose;
use crate::config::MailerConfig;
use crate::errors::{DispatchError, DispatchResult};
use crate::observability::DispatchMetrics;
use crate::transport::{self, Dialer, TcpDialer};
use crate::types::ContactSubmission;

/// Relays contact-form submissions through the configured SMTP relay.
///
/// Cheap to share across tasks: each call runs its own session, and there
/// is no pooling or other shared mutable state.
pub struct ContactMailer {
    config: MailerConfig,
    dialer: Arc<dyn Dialer>,
    metrics: DispatchMetrics,
}

impl ContactMailer {
    /// Creates a mailer that dials real TCP connections.
    pub fn new(config: MailerConfig) -> Self {
        Self::with_dialer(config, Arc::new(TcpDialer))
    }

    /// Creates a mailer over a custom dialer.
    pub fn with_dialer(config: MailerConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            config,
            dialer,
            metrics: DispatchMetrics::new(),
        }
    }

    /// Renders the submission and relays it as an HTML email.
    ///
    /// Fails fast with a configuration error, before any dial, when no
    /// recipient is configured. All other failures come from the session
    /// and are terminal for this attempt; nothing is queued or retried.
    pub async fn send_contact(&self, submission: &ContactSubmission) -> DispatchResult<()> {
        let recipient = match self.config.recipient.as_deref() {
            Some(recipient) if !recipient.is_empty() => recipient,
            _ => {
                let err = DispatchError::configuration("recipient address is not configured");
                self.metrics.record_failure();
                return Err(err);
            }
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            username = %self.config.username,
            from = %self.config.from_address,
            to = %recipient,
            "Dispatching contact email"
        );

        let message = compose::render(&self.config, recipient, submission);

        let result = transport::dispatch(self.dialer.as_ref(), &self.config, recipient, &message).await;

        match &result {
            Ok(()) => {
                self.metrics.record_success();
                #[cfg(feature = "tracing")]
                tracing::info!(to = %recipient, "Contact email relayed");
            }
            Err(err) => {
                self.metrics.record_failure();
                #[cfg(feature = "tracing")]
                tracing::error!(error = %err, "Contact dispatch failed");
            }
        }

        result
    }

    /// Returns the configuration this mailer was built with.
    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Returns the dispatch counters.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }
}
