//! Error types for contact dispatch.
//!
//! Every failure mode of a dispatch attempt maps to one kind; none of them
//! are retried internally beyond the documented auth fallback.

use std::fmt;
use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatch error kinds categorizing the failure stages of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchErrorKind {
    /// Configuration is invalid or incomplete (e.g. no recipient).
    Configuration,
    /// TCP connect or server greeting failed.
    Dial,
    /// TLS handshake failed, or the relay rejected STARTTLS.
    TlsHandshake,
    /// Authentication failed (all attempted mechanisms).
    Authentication,
    /// MAIL FROM or RCPT TO was rejected by the relay.
    Envelope,
    /// DATA was rejected, or writing the message failed mid-session.
    Transmission,
    /// The relay violated the expected protocol exchange.
    Protocol,
}

impl fmt::Display for DispatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchErrorKind::Configuration => write!(f, "Invalid configuration"),
            DispatchErrorKind::Dial => write!(f, "Connection failed"),
            DispatchErrorKind::TlsHandshake => write!(f, "TLS negotiation failed"),
            DispatchErrorKind::Authentication => write!(f, "Authentication failed"),
            DispatchErrorKind::Envelope => write!(f, "Envelope rejected"),
            DispatchErrorKind::Transmission => write!(f, "Message transmission failed"),
            DispatchErrorKind::Protocol => write!(f, "Protocol error"),
        }
    }
}

/// Dispatch error with the relay's status code and underlying cause.
#[derive(Error, Debug)]
pub struct DispatchError {
    kind: DispatchErrorKind,
    message: String,
    smtp_code: Option<u16>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DispatchError {
    /// Creates a new dispatch error.
    pub fn new(kind: DispatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            cause: None,
        }
    }

    /// Sets the SMTP status code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> DispatchErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SMTP status code if the relay supplied one.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Returns the per-mechanism failures when both auth mechanisms were
    /// tried and rejected.
    pub fn auth_attempts(&self) -> Option<&AuthAttempts> {
        self.cause
            .as_deref()
            .and_then(|c| c.downcast_ref::<AuthAttempts>())
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::Configuration, message)
    }

    /// Creates a dial error.
    pub fn dial(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::Dial, message)
    }

    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::TlsHandshake, message)
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::Protocol, message)
    }

    /// Creates an authentication error preserving the failure of each
    /// mechanism that was tried.
    pub fn authentication_exhausted(plain: DispatchError, login: DispatchError) -> Self {
        let message = format!("tried PLAIN: {}; LOGIN: {}", plain, login);
        Self::new(DispatchErrorKind::Authentication, message)
            .with_cause(AuthAttempts { plain, login })
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.smtp_code {
            write!(f, " (SMTP {})", code)?;
        }
        Ok(())
    }
}

/// The per-mechanism failures behind an exhausted authentication attempt.
#[derive(Error, Debug)]
#[error("PLAIN: {plain}; LOGIN: {login}")]
pub struct AuthAttempts {
    /// Why the PLAIN attempt failed.
    pub plain: DispatchError,
    /// Why the LOGIN attempt failed.
    pub login: DispatchError,
}
