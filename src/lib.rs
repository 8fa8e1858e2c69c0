//! # Contact Relay
//!
//! An SMTP dispatch client that relays web contact-form submissions as
//! HTML email through an external mail relay:
//! - Implicit TLS (port 465) or STARTTLS transport, selected by port
//! - PLAIN authentication with a LOGIN fallback over a fresh connection
//! - HTML-escaped message rendering with a fixed RFC 5322 header layout
//! - One fully sequential session per dispatch; no pooling, no queuing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use contact_relay::{ContactMailer, ContactSubmission, MailerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MailerConfig::builder()
//!         .host("smtp.example.com")
//!         .port(587)
//!         .credentials("mailer@example.com", "password")
//!         .from_address("mailer@example.com")
//!         .from_display_name("Example Web")
//!         .recipient("inbox@example.com")
//!         .build()?;
//!
//!     let mailer = ContactMailer::new(config);
//!
//!     let submission = ContactSubmission::new(
//!         "Ana",
//!         "ana@example.com",
//!         "Me gustaría más información.",
//!     )
//!     .with_phone("+34 600 000 000");
//!
//!     mailer.send_contact(&submission).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Protocol layer
pub mod protocol;

// Transport layer and session driver
pub mod transport;

// Authentication
pub mod auth;

// Message composition
pub mod compose;

// Observability
pub mod observability;

// Orchestrator
pub mod client;

// Scripted doubles for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{AuthOutcome, AuthStrategy, LoginAuth, Mechanism, PlainAuth};
pub use client::ContactMailer;
pub use compose::{escape_html, render, RenderedMessage};
pub use config::{MailerConfig, MailerConfigBuilder, IMPLICIT_TLS_PORT};
pub use errors::{AuthAttempts, DispatchError, DispatchErrorKind, DispatchResult};
pub use observability::{DispatchMetrics, MetricsSnapshot};
pub use protocol::{SmtpCommand, SmtpResponse};
pub use transport::{Dialer, SmtpConnection, TcpDialer};
pub use types::ContactSubmission;
