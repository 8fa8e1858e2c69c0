//! Relay configuration.
//!
//! Configuration is an explicit value threaded into each dispatch call:
//! build it once (from code or from the environment) and hand it to the
//! mailer. It is immutable for the duration of a send.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

/// Port on which relays speak TLS immediately, before any SMTP command.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Default timeout for the TCP dial. The SMTP conversation itself carries
/// no deadline; callers needing bounded latency wrap the whole dispatch.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Relay connection and message addressing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Relay hostname. Also used for TLS server-name verification.
    pub host: String,
    /// Relay port. 465 selects implicit TLS; anything else STARTTLS.
    pub port: u16,
    /// Authentication username.
    pub username: String,
    /// Authentication password (never serialized).
    #[serde(skip, default = "empty_secret")]
    pub password: SecretString,
    /// Envelope-from and From-header address.
    pub from_address: String,
    /// Optional display name for the From header.
    pub from_display_name: Option<String>,
    /// Recipient address. Absence is a hard configuration error at
    /// dispatch time.
    pub recipient: Option<String>,
    /// TCP dial timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl MailerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> MailerConfigBuilder {
        MailerConfigBuilder::default()
    }

    /// Loads the configuration from the process environment.
    ///
    /// Reads `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`,
    /// `SMTP_FROM`, `SMTP_FROM_NAME` and `CONTACT_EMAIL`. An unset or
    /// unparsable port is a configuration error; an unset recipient is
    /// deferred to dispatch time.
    pub fn from_env() -> DispatchResult<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();

        let port_raw = var("SMTP_PORT");
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| DispatchError::configuration(format!("invalid SMTP_PORT: {:?}", port_raw)))?;

        Self::builder()
            .host(var("SMTP_HOST"))
            .port(port)
            .credentials(var("SMTP_USER"), var("SMTP_PASSWORD"))
            .from_address(var("SMTP_FROM"))
            .from_display_name_opt(non_empty(var("SMTP_FROM_NAME")))
            .recipient_opt(non_empty(var("CONTACT_EMAIL")))
            .build()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.host.is_empty() {
            return Err(DispatchError::configuration("relay host is required"));
        }
        if self.port == 0 {
            return Err(DispatchError::configuration("relay port must be non-zero"));
        }
        if self.from_address.is_empty() {
            return Err(DispatchError::configuration("from address is required"));
        }
        Ok(())
    }

    /// Returns the full relay address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true if the configured port selects implicit TLS.
    pub fn uses_implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }

    /// Returns the From header value: `Name <addr>` when a display name is
    /// configured, else the bare address.
    pub fn from_header(&self) -> String {
        match self.from_display_name.as_deref() {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.from_address),
            _ => self.from_address.clone(),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Builder for [`MailerConfig`].
#[derive(Debug, Default)]
pub struct MailerConfigBuilder {
    host: Option<String>,
    port: u16,
    username: String,
    password: Option<SecretString>,
    from_address: String,
    from_display_name: Option<String>,
    recipient: Option<String>,
    connect_timeout: Duration,
}

impl MailerConfigBuilder {
    /// Sets the relay host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the relay port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the authentication credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the envelope-from address.
    pub fn from_address(mut self, address: impl Into<String>) -> Self {
        self.from_address = address.into();
        self
    }

    /// Sets the From display name.
    pub fn from_display_name(mut self, name: impl Into<String>) -> Self {
        self.from_display_name = Some(name.into());
        self
    }

    fn from_display_name_opt(mut self, name: Option<String>) -> Self {
        self.from_display_name = name;
        self
    }

    /// Sets the recipient address.
    pub fn recipient(mut self, address: impl Into<String>) -> Self {
        self.recipient = Some(address.into());
        self
    }

    fn recipient_opt(mut self, address: Option<String>) -> Self {
        self.recipient = address;
        self
    }

    /// Sets the TCP dial timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> DispatchResult<MailerConfig> {
        let config = MailerConfig {
            host: self
                .host
                .ok_or_else(|| DispatchError::configuration("relay host is required"))?,
            port: self.port,
            username: self.username,
            password: self.password.unwrap_or_else(empty_secret),
            from_address: self.from_address,
            from_display_name: self.from_display_name,
            recipient: self.recipient,
            connect_timeout: if self.connect_timeout == Duration::ZERO {
                DEFAULT_CONNECT_TIMEOUT
            } else {
                self.connect_timeout
            },
        };

        config.validate()?;
        Ok(config)
    }
}

// Humantime serde support
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> MailerConfigBuilder {
        MailerConfig::builder()
            .host("smtp.example.com")
            .port(587)
            .credentials("user@example.com", "hunter2")
            .from_address("noreply@example.com")
    }

    #[test]
    fn test_builder() {
        let config = base_builder()
            .from_display_name("Web")
            .recipient("inbox@example.com")
            .build()
            .unwrap();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.address(), "smtp.example.com:587");
        assert_eq!(config.recipient.as_deref(), Some("inbox@example.com"));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_validation() {
        // Missing host
        assert!(MailerConfig::builder().port(587).build().is_err());

        // Zero port
        assert!(MailerConfig::builder()
            .host("smtp.example.com")
            .port(0)
            .from_address("noreply@example.com")
            .build()
            .is_err());

        // Missing from address
        assert!(MailerConfig::builder()
            .host("smtp.example.com")
            .port(587)
            .build()
            .is_err());
    }

    #[test]
    fn test_transport_selection_by_port() {
        let implicit = base_builder().port(465).build().unwrap();
        assert!(implicit.uses_implicit_tls());

        let submission = base_builder().port(587).build().unwrap();
        assert!(!submission.uses_implicit_tls());
    }

    #[test]
    fn test_from_header_formatting() {
        let bare = base_builder().build().unwrap();
        assert_eq!(bare.from_header(), "noreply@example.com");

        let named = base_builder().from_display_name("Acme Web").build().unwrap();
        assert_eq!(named.from_header(), "Acme Web <noreply@example.com>");
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let config = base_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
    }
}
