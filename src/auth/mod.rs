//! SMTP authentication mechanisms.
//!
//! Two mechanisms are supported, tried in a fixed order: PLAIN (RFC 4616)
//! first, LOGIN as the fallback. Each is a stateless challenge/response
//! strategy over the credentials it holds; the session driver owns the
//! round-trip loop and the fallback policy.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::{DispatchError, DispatchResult};

/// Authentication mechanisms supported by the dispatch client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// PLAIN: credentials in a single initial response.
    Plain,
    /// LOGIN: username and password prompted in separate rounds.
    Login,
}

impl Mechanism {
    /// Returns the SMTP AUTH mechanism name.
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Login => "LOGIN",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A challenge/response authentication strategy.
///
/// `initial_response` and replies from `respond` are base64-encoded, ready
/// for the wire. Challenges arrive already base64-decoded; the driver
/// decodes the relay's 334 payload before dispatching on it.
pub trait AuthStrategy: Send + Sync {
    /// The mechanism this strategy implements.
    fn mechanism(&self) -> Mechanism;

    /// The initial response sent with the AUTH command, if any.
    fn initial_response(&self) -> Option<String>;

    /// Produces the reply for a server challenge, or a protocol error when
    /// the challenge is not one this mechanism understands.
    fn respond(&self, challenge: &str) -> DispatchResult<String>;
}

/// Outcome of one mechanism attempt.
///
/// `Retry` is a mechanism-level failure (relay rejected the credentials or
/// issued a challenge the mechanism does not understand): the session
/// driver discards the connection and falls back to the next mechanism.
/// `Fatal` is a transport-level failure that aborts the dispatch outright.
#[derive(Debug)]
pub enum AuthOutcome {
    /// The relay accepted the credentials.
    Accepted,
    /// The mechanism failed; fall back after reconnecting.
    Retry(DispatchError),
    /// The session is unusable; no fallback.
    Fatal(DispatchError),
}

/// PLAIN authentication: one round, no challenge loop.
pub struct PlainAuth {
    username: String,
    password: SecretString,
}

impl PlainAuth {
    /// Creates a PLAIN strategy over the given credentials.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl AuthStrategy for PlainAuth {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Plain
    }

    fn initial_response(&self) -> Option<String> {
        // \0username\0password, per RFC 4616 with an empty authzid.
        let payload = format!(
            "\0{}\0{}",
            self.username,
            self.password.expose_secret()
        );
        Some(BASE64.encode(payload))
    }

    fn respond(&self, challenge: &str) -> DispatchResult<String> {
        Err(DispatchError::protocol(format!(
            "unexpected challenge during PLAIN auth: {:?}",
            challenge
        )))
    }
}

impl fmt::Debug for PlainAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// LOGIN authentication: the relay prompts for username and password in
/// separate rounds.
pub struct LoginAuth {
    username: String,
    password: SecretString,
}

impl LoginAuth {
    /// Creates a LOGIN strategy over the given credentials.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl AuthStrategy for LoginAuth {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Login
    }

    fn initial_response(&self) -> Option<String> {
        None
    }

    fn respond(&self, challenge: &str) -> DispatchResult<String> {
        // Fixed prompt table, compared case-sensitively. Anything else is a
        // mechanism this client does not understand; abort rather than send
        // the wrong credential.
        match challenge {
            "Username:" => Ok(BASE64.encode(&self.username)),
            "Password:" => Ok(BASE64.encode(self.password.expose_secret())),
            other => Err(DispatchError::protocol(format!(
                "unknown LOGIN challenge: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DispatchErrorKind;

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    #[test]
    fn test_plain_initial_response() {
        let auth = PlainAuth::new("user", secret("password"));
        let encoded = auth.initial_response().unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, b"\0user\0password");
    }

    #[test]
    fn test_plain_rejects_challenges() {
        let auth = PlainAuth::new("user", secret("password"));
        let err = auth.respond("Username:").unwrap_err();
        assert_eq!(err.kind(), DispatchErrorKind::Protocol);
    }

    #[test]
    fn test_login_challenge_table() {
        let auth = LoginAuth::new("user", secret("password"));
        assert!(auth.initial_response().is_none());

        assert_eq!(auth.respond("Username:").unwrap(), BASE64.encode("user"));
        assert_eq!(auth.respond("Password:").unwrap(), BASE64.encode("password"));
    }

    #[test]
    fn test_login_aborts_on_unknown_challenge() {
        let auth = LoginAuth::new("user", secret("password"));

        for challenge in ["username:", "USERNAME:", "Token:", ""] {
            let err = auth.respond(challenge).unwrap_err();
            assert_eq!(err.kind(), DispatchErrorKind::Protocol);
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = LoginAuth::new("user", secret("password"));
        let debug = format!("{:?}", auth);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("password\""));
    }
}
