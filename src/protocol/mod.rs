//! SMTP protocol primitives.
//!
//! Covers exactly the command surface a dispatch session uses: EHLO,
//! STARTTLS, AUTH, MAIL FROM, RCPT TO, DATA, QUIT. No pipelining, no DSN.

use std::fmt;

use crate::auth::Mechanism;
use crate::errors::{DispatchError, DispatchErrorKind, DispatchResult};

/// SMTP commands issued by the dispatch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// Extended HELLO with client identity.
    Ehlo(String),
    /// Start TLS negotiation on a plaintext session.
    StartTls,
    /// Begin authentication.
    Auth {
        /// Authentication mechanism.
        mechanism: Mechanism,
        /// Base64 initial response, if the mechanism sends one.
        initial_response: Option<String>,
    },
    /// Open a mail transaction.
    MailFrom {
        /// Envelope sender address.
        address: String,
    },
    /// Add the envelope recipient.
    RcptTo {
        /// Envelope recipient address.
        address: String,
    },
    /// Begin message transfer.
    Data,
    /// Close the session.
    Quit,
}

impl SmtpCommand {
    /// Formats the command for the wire, without the trailing CRLF.
    pub fn to_smtp_string(&self) -> String {
        match self {
            SmtpCommand::Ehlo(domain) => format!("EHLO {}", domain),
            SmtpCommand::StartTls => "STARTTLS".to_string(),
            SmtpCommand::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(response) => format!("AUTH {} {}", mechanism.name(), response),
                None => format!("AUTH {}", mechanism.name()),
            },
            SmtpCommand::MailFrom { address } => format!("MAIL FROM:<{}>", address),
            SmtpCommand::RcptTo { address } => format!("RCPT TO:<{}>", address),
            SmtpCommand::Data => "DATA".to_string(),
            SmtpCommand::Quit => "QUIT".to_string(),
        }
    }
}

impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_smtp_string())
    }
}

/// SMTP reply from the relay.
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// Status code (e.g. 250, 334, 354, 535).
    pub code: u16,
    /// Reply text lines.
    pub message: Vec<String>,
}

impl SmtpResponse {
    /// Creates a single-line response.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: vec![message.into()],
        }
    }

    /// Parses a reply from its raw lines (CRLF already stripped).
    pub fn parse(lines: &[String]) -> DispatchResult<Self> {
        if lines.is_empty() {
            return Err(DispatchError::protocol("empty reply from relay"));
        }

        let mut message = Vec::with_capacity(lines.len());
        let mut code = 0u16;

        for (i, line) in lines.iter().enumerate() {
            if line.len() < 3 {
                return Err(DispatchError::protocol(format!("reply too short: {:?}", line)));
            }

            let parsed: u16 = line[..3]
                .parse()
                .map_err(|_| DispatchError::protocol(format!("invalid status code: {:?}", line)))?;

            if i == 0 {
                code = parsed;
            } else if parsed != code {
                return Err(DispatchError::protocol(
                    "inconsistent status codes in multiline reply",
                ));
            }

            message.push(line.get(4..).unwrap_or("").to_string());
        }

        Ok(Self { code, message })
    }

    /// Returns true for a 2xx reply.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Returns true for a 3xx reply (server expects more input).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Returns the first reply line.
    pub fn first_message(&self) -> &str {
        self.message.first().map(String::as_str).unwrap_or("")
    }

    /// Returns all reply lines joined.
    pub fn full_message(&self) -> String {
        self.message.join("\n")
    }

    /// Converts this reply into a dispatch error of the given kind.
    pub fn to_error(&self, kind: DispatchErrorKind) -> DispatchError {
        DispatchError::new(kind, self.full_message()).with_smtp_code(self.code)
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.first_message())
    }
}

/// Reply codes the session driver checks for.
pub mod codes {
    /// Service ready (greeting, STARTTLS go-ahead).
    pub const SERVICE_READY: u16 = 220;
    /// Service closing (QUIT acknowledged).
    pub const SERVICE_CLOSING: u16 = 221;
    /// Authentication successful.
    pub const AUTH_SUCCESS: u16 = 235;
    /// OK.
    pub const OK: u16 = 250;
    /// Continue (AUTH challenge follows).
    pub const AUTH_CONTINUE: u16 = 334;
    /// Start mail input.
    pub const START_MAIL_INPUT: u16 = 354;
}
