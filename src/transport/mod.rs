//! Transport layer and SMTP session driver.
//!
//! The configured port selects the transport: 465 dials TLS directly and
//! speaks SMTP inside it; any other port dials plaintext and upgrades in
//! place with STARTTLS. The session driver then runs authentication (PLAIN
//! with a LOGIN fallback), the envelope, the message transfer and QUIT
//! against a single connection, reconnecting exactly once if the primary
//! auth mechanism is rejected.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::auth::{AuthOutcome, AuthStrategy, LoginAuth, PlainAuth};
use crate::compose::{frame_for_data, RenderedMessage};
use crate::config::MailerConfig;
use crate::errors::{DispatchError, DispatchErrorKind, DispatchResult};
use crate::protocol::{codes, SmtpCommand, SmtpResponse};

/// Client identity sent with EHLO.
const CLIENT_HELLO: &str = "localhost";

/// One SMTP connection to the relay.
///
/// Implementations own their socket; `close` releases it and is safe to
/// call on every exit path.
#[async_trait]
pub trait SmtpConnection: Send {
    /// Sends a command and reads the relay's reply.
    async fn command(&mut self, command: &SmtpCommand) -> DispatchResult<SmtpResponse>;

    /// Writes a bare line (used for AUTH continuation replies).
    async fn write_line(&mut self, line: &str) -> DispatchResult<()>;

    /// Reads one reply without sending anything.
    async fn read_reply(&mut self) -> DispatchResult<SmtpResponse>;

    /// Writes the framed message bytes of the DATA phase.
    async fn send_payload(&mut self, payload: &[u8]) -> DispatchResult<()>;

    /// Upgrades the connection to TLS in place, verifying `host`.
    async fn starttls(&mut self, host: &str) -> DispatchResult<()>;

    /// Releases the connection. Best effort; never fails.
    async fn close(&mut self);
}

/// Opens connections to the relay.
///
/// The seam that lets the session driver run against scripted connections
/// in tests.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Opens a plaintext connection and consumes the greeting.
    async fn dial_plain(&self, config: &MailerConfig) -> DispatchResult<Box<dyn SmtpConnection>>;

    /// Opens an implicit-TLS connection and consumes the greeting.
    async fn dial_tls(&self, config: &MailerConfig) -> DispatchResult<Box<dyn SmtpConnection>>;
}

/// Dispatches a rendered message through the configured relay.
///
/// One fully sequential session per call; the only internal retry is the
/// documented auth fallback, which discards the first connection before
/// opening the second.
pub async fn dispatch(
    dialer: &dyn Dialer,
    config: &MailerConfig,
    recipient: &str,
    message: &RenderedMessage,
) -> DispatchResult<()> {
    let payload = frame_for_data(message.to_wire().as_bytes());

    let mut conn = open_session(dialer, config).await?;

    let plain = PlainAuth::new(config.username.clone(), config.password.clone());
    let mut conn = match authenticate(conn.as_mut(), &plain).await {
        AuthOutcome::Accepted => conn,
        AuthOutcome::Fatal(err) => {
            conn.close().await;
            return Err(err);
        }
        AuthOutcome::Retry(plain_err) => {
            // Relays may lock or poison the session after a failed AUTH;
            // the first connection is fully closed before the second opens.
            conn.close().await;
            drop(conn);

            #[cfg(feature = "tracing")]
            tracing::warn!(error = %plain_err, "PLAIN auth rejected, retrying with LOGIN");

            let mut retry = open_session(dialer, config).await?;
            let login = LoginAuth::new(config.username.clone(), config.password.clone());
            match authenticate(retry.as_mut(), &login).await {
                AuthOutcome::Accepted => retry,
                AuthOutcome::Fatal(err) => {
                    retry.close().await;
                    return Err(err);
                }
                AuthOutcome::Retry(login_err) => {
                    retry.close().await;
                    return Err(DispatchError::authentication_exhausted(plain_err, login_err));
                }
            }
        }
    };

    let result = transact(conn.as_mut(), config, recipient, &payload).await;
    conn.close().await;
    result
}

/// Opens a connection per the port-based decision rule and brings it to the
/// authenticated-ready state: greeting consumed, EHLO exchanged, TLS in
/// place.
async fn open_session(
    dialer: &dyn Dialer,
    config: &MailerConfig,
) -> DispatchResult<Box<dyn SmtpConnection>> {
    let mut conn = if config.uses_implicit_tls() {
        dialer.dial_tls(config).await?
    } else {
        dialer.dial_plain(config).await?
    };

    if let Err(err) = hello(conn.as_mut()).await {
        conn.close().await;
        return Err(err);
    }

    if !config.uses_implicit_tls() {
        if let Err(err) = upgrade_starttls(conn.as_mut(), &config.host).await {
            conn.close().await;
            return Err(err);
        }
        // Capabilities reset across the upgrade; greet again inside TLS.
        if let Err(err) = hello(conn.as_mut()).await {
            conn.close().await;
            return Err(err);
        }
    }

    Ok(conn)
}

async fn hello(conn: &mut dyn SmtpConnection) -> DispatchResult<()> {
    let reply = conn
        .command(&SmtpCommand::Ehlo(CLIENT_HELLO.to_string()))
        .await?;
    if !reply.is_success() {
        return Err(reply.to_error(DispatchErrorKind::Protocol));
    }
    Ok(())
}

async fn upgrade_starttls(conn: &mut dyn SmtpConnection, host: &str) -> DispatchResult<()> {
    let reply = conn.command(&SmtpCommand::StartTls).await?;
    if reply.code != codes::SERVICE_READY {
        return Err(reply.to_error(DispatchErrorKind::TlsHandshake));
    }
    conn.starttls(host).await
}

/// Runs one mechanism attempt to a terminal outcome.
///
/// `Retry` covers the relay rejecting the mechanism and challenges the
/// mechanism does not understand; `Fatal` covers transport failures that
/// leave the session unusable.
async fn authenticate(conn: &mut dyn SmtpConnection, strategy: &dyn AuthStrategy) -> AuthOutcome {
    let command = SmtpCommand::Auth {
        mechanism: strategy.mechanism(),
        initial_response: strategy.initial_response(),
    };

    let mut reply = match conn.command(&command).await {
        Ok(reply) => reply,
        Err(err) => return AuthOutcome::Fatal(err),
    };

    loop {
        match reply.code {
            codes::AUTH_SUCCESS => return AuthOutcome::Accepted,
            codes::AUTH_CONTINUE => {
                let challenge = match decode_challenge(reply.first_message()) {
                    Ok(text) => text,
                    Err(err) => return AuthOutcome::Retry(err),
                };
                let answer = match strategy.respond(&challenge) {
                    Ok(answer) => answer,
                    Err(err) => return AuthOutcome::Retry(err),
                };
                if let Err(err) = conn.write_line(&answer).await {
                    return AuthOutcome::Fatal(err);
                }
                reply = match conn.read_reply().await {
                    Ok(reply) => reply,
                    Err(err) => return AuthOutcome::Fatal(err),
                };
            }
            _ => return AuthOutcome::Retry(reply.to_error(DispatchErrorKind::Authentication)),
        }
    }
}

fn decode_challenge(raw: &str) -> DispatchResult<String> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|err| DispatchError::protocol(format!("undecodable AUTH challenge: {}", err)))?;
    String::from_utf8(bytes)
        .map_err(|_| DispatchError::protocol("AUTH challenge is not valid UTF-8"))
}

/// Envelope, data and quit against an authenticated session. No partial
/// retries: the first rejection aborts.
async fn transact(
    conn: &mut dyn SmtpConnection,
    config: &MailerConfig,
    recipient: &str,
    payload: &[u8],
) -> DispatchResult<()> {
    let reply = conn
        .command(&SmtpCommand::MailFrom {
            address: config.from_address.clone(),
        })
        .await?;
    if !reply.is_success() {
        return Err(reply.to_error(DispatchErrorKind::Envelope));
    }

    let reply = conn
        .command(&SmtpCommand::RcptTo {
            address: recipient.to_string(),
        })
        .await?;
    if !reply.is_success() {
        return Err(reply.to_error(DispatchErrorKind::Envelope));
    }

    let reply = conn.command(&SmtpCommand::Data).await?;
    if reply.code != codes::START_MAIL_INPUT {
        return Err(reply.to_error(DispatchErrorKind::Transmission));
    }

    conn.send_payload(payload).await?;

    let reply = conn.read_reply().await?;
    if !reply.is_success() {
        return Err(reply.to_error(DispatchErrorKind::Transmission));
    }

    let reply = conn.command(&SmtpCommand::Quit).await?;
    if reply.code != codes::SERVICE_CLOSING {
        return Err(reply.to_error(DispatchErrorKind::Protocol));
    }

    Ok(())
}

/// Dialer backed by real TCP sockets.
#[derive(Debug, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial_plain(&self, config: &MailerConfig) -> DispatchResult<Box<dyn SmtpConnection>> {
        let stream = connect_tcp(config).await?;
        let mut conn = Connection {
            stream: Stream::Plain(BufReader::new(stream)),
        };
        read_greeting(&mut conn).await?;
        Ok(Box::new(conn))
    }

    async fn dial_tls(&self, config: &MailerConfig) -> DispatchResult<Box<dyn SmtpConnection>> {
        #[cfg(feature = "rustls-tls")]
        {
            let stream = connect_tcp(config).await?;
            let tls_stream = tls::handshake(stream, &config.host, config.connect_timeout).await?;
            let mut conn = Connection {
                stream: Stream::Tls(BufReader::new(tls_stream)),
            };
            read_greeting(&mut conn).await?;
            Ok(Box::new(conn))
        }

        #[cfg(not(feature = "rustls-tls"))]
        {
            let _ = config;
            Err(DispatchError::configuration("no TLS implementation available"))
        }
    }
}

async fn connect_tcp(config: &MailerConfig) -> DispatchResult<TcpStream> {
    let address = config.address();

    let stream = timeout(config.connect_timeout, TcpStream::connect(&address))
        .await
        .map_err(|_| DispatchError::dial(format!("connect to {} timed out", address)))?
        .map_err(|err| {
            DispatchError::dial(format!("connect to {} failed", address)).with_cause(err)
        })?;

    stream.set_nodelay(true).ok();
    Ok(stream)
}

async fn read_greeting(conn: &mut Connection) -> DispatchResult<()> {
    let greeting = conn
        .read_reply()
        .await
        .map_err(|err| DispatchError::dial("failed to read relay greeting").with_cause(err))?;
    if greeting.code != codes::SERVICE_READY {
        return Err(greeting.to_error(DispatchErrorKind::Dial));
    }
    Ok(())
}

/// TCP connection with optional TLS.
pub struct Connection {
    stream: Stream,
}

enum Stream {
    Plain(BufReader<TcpStream>),
    #[cfg(feature = "rustls-tls")]
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
    Closed,
}

impl Connection {
    async fn read_reply_inner<R>(reader: &mut R) -> DispatchResult<SmtpResponse>
    where
        R: AsyncBufReadExt + Unpin,
    {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(map_io_error)?;

            if read == 0 {
                return Err(DispatchError::new(
                    DispatchErrorKind::Transmission,
                    "relay closed the connection",
                ));
            }

            let line = line.trim_end().to_string();
            let is_continuation = line.len() >= 4 && line.as_bytes()[3] == b'-';
            lines.push(line);

            if !is_continuation {
                break;
            }
        }

        SmtpResponse::parse(&lines)
    }

    async fn write_bytes<W>(writer: &mut W, data: &[u8]) -> DispatchResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(data).await.map_err(map_io_error)?;
        writer.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> DispatchResult<()> {
        match &mut self.stream {
            Stream::Plain(reader) => Self::write_bytes(reader.get_mut(), data).await,
            #[cfg(feature = "rustls-tls")]
            Stream::Tls(reader) => Self::write_bytes(reader.get_mut(), data).await,
            Stream::Closed => Err(closed_error()),
        }
    }
}

fn map_io_error(err: io::Error) -> DispatchError {
    DispatchError::new(DispatchErrorKind::Transmission, "connection I/O failed").with_cause(err)
}

fn closed_error() -> DispatchError {
    DispatchError::new(DispatchErrorKind::Transmission, "connection already closed")
}

#[async_trait]
impl SmtpConnection for Connection {
    async fn command(&mut self, command: &SmtpCommand) -> DispatchResult<SmtpResponse> {
        #[cfg(feature = "tracing")]
        match command {
            SmtpCommand::Auth { mechanism, .. } => {
                tracing::debug!(mechanism = %mechanism, "Sending AUTH")
            }
            _ => tracing::debug!(command = %command, "Sending SMTP command"),
        }

        let line = format!("{}\r\n", command.to_smtp_string());
        self.write(line.as_bytes()).await?;
        self.read_reply().await
    }

    async fn write_line(&mut self, line: &str) -> DispatchResult<()> {
        self.write(format!("{}\r\n", line).as_bytes()).await
    }

    async fn read_reply(&mut self) -> DispatchResult<SmtpResponse> {
        let reply = match &mut self.stream {
            Stream::Plain(reader) => Self::read_reply_inner(reader).await?,
            #[cfg(feature = "rustls-tls")]
            Stream::Tls(reader) => Self::read_reply_inner(reader).await?,
            Stream::Closed => return Err(closed_error()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(code = reply.code, message = %reply.first_message(), "Received SMTP reply");

        Ok(reply)
    }

    async fn send_payload(&mut self, payload: &[u8]) -> DispatchResult<()> {
        self.write(payload).await
    }

    async fn starttls(&mut self, host: &str) -> DispatchResult<()> {
        #[cfg(feature = "rustls-tls")]
        {
            let stream = match std::mem::replace(&mut self.stream, Stream::Closed) {
                Stream::Plain(reader) => reader.into_inner(),
                other => {
                    self.stream = other;
                    return Err(DispatchError::tls("session is not eligible for STARTTLS"));
                }
            };

            let tls_stream =
                tls::handshake(stream, host, std::time::Duration::from_secs(30)).await?;
            self.stream = Stream::Tls(BufReader::new(tls_stream));
            Ok(())
        }

        #[cfg(not(feature = "rustls-tls"))]
        {
            let _ = host;
            Err(DispatchError::configuration("no TLS implementation available"))
        }
    }

    async fn close(&mut self) {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Plain(reader) => {
                let mut stream = reader.into_inner();
                let _ = stream.shutdown().await;
            }
            #[cfg(feature = "rustls-tls")]
            Stream::Tls(reader) => {
                let mut stream = reader.into_inner();
                let _ = stream.shutdown().await;
            }
            Stream::Closed => {}
        }
    }
}

#[cfg(feature = "rustls-tls")]
mod tls {
    use std::sync::Arc;
    use std::time::Duration;

    use rustls::pki_types::ServerName;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    use crate::errors::{DispatchError, DispatchResult};

    pub(super) async fn handshake(
        stream: TcpStream,
        host: &str,
        deadline: Duration,
    ) -> DispatchResult<tokio_rustls::client::TlsStream<TcpStream>> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| DispatchError::tls(format!("invalid server name: {}", host)))?;

        timeout(deadline, connector.connect(server_name, stream))
            .await
            .map_err(|_| DispatchError::tls("TLS handshake timed out"))?
            .map_err(|err| DispatchError::tls("TLS handshake failed").with_cause(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DispatchErrorKind;
    use crate::mocks::{DialMode, MockDialer, ScriptedConnection};
    use crate::{compose, types::ContactSubmission};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    fn config(port: u16) -> MailerConfig {
        MailerConfig::builder()
            .host("smtp.example.com")
            .port(port)
            .credentials("user@example.com", "secret")
            .from_address("noreply@example.com")
            .from_display_name("Acme Web")
            .recipient("inbox@example.com")
            .build()
            .unwrap()
    }

    fn message(config: &MailerConfig) -> compose::RenderedMessage {
        let submission = ContactSubmission::new("Ana", "ana@example.com", "Hola");
        compose::render(config, "inbox@example.com", &submission)
    }

    fn ok(text: &str) -> SmtpResponse {
        SmtpResponse::new(codes::OK, text)
    }

    /// EHLO 250, AUTH 235, MAIL 250, RCPT 250, DATA 354, body 250, QUIT 221.
    fn happy_session() -> ScriptedConnection {
        let conn = ScriptedConnection::new();
        conn.queue(ok("smtp.example.com Hello"));
        conn.queue(SmtpResponse::new(codes::AUTH_SUCCESS, "Accepted"));
        conn.queue(ok("sender ok"));
        conn.queue(ok("recipient ok"));
        conn.queue(SmtpResponse::new(codes::START_MAIL_INPUT, "go ahead"));
        conn.queue(ok("queued as 12345"));
        conn.queue(SmtpResponse::new(codes::SERVICE_CLOSING, "bye"));
        conn
    }

    #[tokio::test]
    async fn test_implicit_tls_path_chosen_for_port_465() {
        let config = config(465);
        let dialer = MockDialer::new();
        let conn = dialer.push(happy_session());

        dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap();

        assert_eq!(dialer.dials(), vec![DialMode::ImplicitTls]);
        assert!(conn.closed());

        let commands = conn.commands();
        assert!(matches!(commands[0], SmtpCommand::Ehlo(_)));
        assert!(!commands.iter().any(|c| matches!(c, SmtpCommand::StartTls)));
        assert!(matches!(commands.last(), Some(SmtpCommand::Quit)));
    }

    #[tokio::test]
    async fn test_starttls_path_chosen_for_other_ports() {
        let config = config(587);
        let dialer = MockDialer::new();

        let conn = ScriptedConnection::new();
        conn.queue(ok("smtp.example.com Hello"));
        conn.queue(SmtpResponse::new(codes::SERVICE_READY, "ready for TLS"));
        conn.queue(ok("smtp.example.com Hello again"));
        conn.queue(SmtpResponse::new(codes::AUTH_SUCCESS, "Accepted"));
        conn.queue(ok("sender ok"));
        conn.queue(ok("recipient ok"));
        conn.queue(SmtpResponse::new(codes::START_MAIL_INPUT, "go ahead"));
        conn.queue(ok("queued"));
        conn.queue(SmtpResponse::new(codes::SERVICE_CLOSING, "bye"));
        let conn = dialer.push(conn);

        dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap();

        assert_eq!(dialer.dials(), vec![DialMode::Plaintext]);
        assert!(conn.tls_upgraded());

        let commands = conn.commands();
        assert!(matches!(commands[1], SmtpCommand::StartTls));
        assert!(matches!(commands[2], SmtpCommand::Ehlo(_)));
    }

    #[tokio::test]
    async fn test_starttls_rejection_aborts_with_tls_error() {
        let config = config(587);
        let dialer = MockDialer::new();

        let conn = ScriptedConnection::new();
        conn.queue(ok("smtp.example.com Hello"));
        conn.queue(SmtpResponse::new(502, "not today"));
        let conn = dialer.push(conn);

        let err = dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DispatchErrorKind::TlsHandshake);
        assert_eq!(err.smtp_code(), Some(502));
        assert!(conn.closed());
        assert!(!conn.tls_upgraded());
    }

    #[tokio::test]
    async fn test_plain_rejected_then_login_succeeds_after_reconnect() {
        let config = config(465);
        let dialer = MockDialer::new();

        let first = ScriptedConnection::new();
        first.queue(ok("smtp.example.com Hello"));
        first.queue(SmtpResponse::new(535, "authentication failed"));
        let first = dialer.push(first);

        let second = ScriptedConnection::new();
        second.queue(ok("smtp.example.com Hello"));
        second.queue(SmtpResponse::new(
            codes::AUTH_CONTINUE,
            BASE64.encode("Username:"),
        ));
        second.queue(SmtpResponse::new(
            codes::AUTH_CONTINUE,
            BASE64.encode("Password:"),
        ));
        second.queue(SmtpResponse::new(codes::AUTH_SUCCESS, "Accepted"));
        second.queue(ok("sender ok"));
        second.queue(ok("recipient ok"));
        second.queue(SmtpResponse::new(codes::START_MAIL_INPUT, "go ahead"));
        second.queue(ok("queued"));
        second.queue(SmtpResponse::new(codes::SERVICE_CLOSING, "bye"));
        let second = dialer.push(second);

        dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap();

        assert_eq!(dialer.dials(), vec![DialMode::ImplicitTls, DialMode::ImplicitTls]);
        // The failed session is discarded before the fallback dials anew.
        assert!(first.closed_before(&second));

        let lines = second.lines();
        assert_eq!(lines[0], BASE64.encode("user@example.com"));
        assert_eq!(lines[1], BASE64.encode("secret"));
    }

    #[tokio::test]
    async fn test_both_mechanisms_rejected_reports_both_causes() {
        let config = config(465);
        let dialer = MockDialer::new();

        let first = ScriptedConnection::new();
        first.queue(ok("smtp.example.com Hello"));
        first.queue(SmtpResponse::new(535, "PLAIN not accepted"));
        dialer.push(first);

        let second = ScriptedConnection::new();
        second.queue(ok("smtp.example.com Hello"));
        second.queue(SmtpResponse::new(535, "LOGIN not accepted"));
        dialer.push(second);

        let err = dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DispatchErrorKind::Authentication);
        let attempts = err.auth_attempts().expect("both causes preserved");
        assert_eq!(attempts.plain.smtp_code(), Some(535));
        assert_eq!(attempts.login.smtp_code(), Some(535));
        assert!(attempts.plain.message().contains("PLAIN not accepted"));
        assert!(attempts.login.message().contains("LOGIN not accepted"));
    }

    #[tokio::test]
    async fn test_unknown_login_challenge_falls_through_as_protocol_error() {
        let config = config(465);
        let dialer = MockDialer::new();

        let first = ScriptedConnection::new();
        first.queue(ok("smtp.example.com Hello"));
        first.queue(SmtpResponse::new(535, "PLAIN not accepted"));
        dialer.push(first);

        let second = ScriptedConnection::new();
        second.queue(ok("smtp.example.com Hello"));
        second.queue(SmtpResponse::new(
            codes::AUTH_CONTINUE,
            BASE64.encode("Token:"),
        ));
        let second = dialer.push(second);

        let err = dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap_err();

        let attempts = err.auth_attempts().expect("both causes preserved");
        assert_eq!(attempts.login.kind(), DispatchErrorKind::Protocol);
        // The wrong credential is never sent.
        assert!(second.lines().is_empty());
    }

    #[tokio::test]
    async fn test_envelope_rejection_surfaces_with_relay_code() {
        let config = config(465);
        let dialer = MockDialer::new();

        let conn = ScriptedConnection::new();
        conn.queue(ok("smtp.example.com Hello"));
        conn.queue(SmtpResponse::new(codes::AUTH_SUCCESS, "Accepted"));
        conn.queue(ok("sender ok"));
        conn.queue(SmtpResponse::new(550, "mailbox unavailable"));
        let conn = dialer.push(conn);

        let err = dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DispatchErrorKind::Envelope);
        assert_eq!(err.smtp_code(), Some(550));
        assert!(conn.closed());
        // The session never reaches DATA.
        assert!(!conn.commands().iter().any(|c| matches!(c, SmtpCommand::Data)));
    }

    #[tokio::test]
    async fn test_payload_is_framed_for_data() {
        let config = config(465);
        let dialer = MockDialer::new();
        let conn = dialer.push(happy_session());

        dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap();

        let payloads = conn.payloads();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].ends_with(b"\r\n.\r\n"));
        let text = String::from_utf8(payloads[0].clone()).unwrap();
        assert!(text.starts_with("From: Acme Web <noreply@example.com>\r\n"));
    }

    #[tokio::test]
    async fn test_envelope_addresses_come_from_config_and_recipient() {
        let config = config(465);
        let dialer = MockDialer::new();
        let conn = dialer.push(happy_session());

        dispatch(&dialer, &config, "inbox@example.com", &message(&config))
            .await
            .unwrap();

        let commands = conn.commands();
        assert!(commands.iter().any(|c| matches!(
            c,
            SmtpCommand::MailFrom { address } if address == "noreply@example.com"
        )));
        assert!(commands.iter().any(|c| matches!(
            c,
            SmtpCommand::RcptTo { address } if address == "inbox@example.com"
        )));
    }
}
