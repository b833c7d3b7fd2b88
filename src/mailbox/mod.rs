//! Mailbox ingestion: turns the newest inbox message into a support ticket.
//!
//! Each fetch opens its own TLS connection, runs a short command sequence,
//! and logs out. Mailbox I/O is blocking and runs on the blocking pool.

pub mod imap;
pub mod ticket;

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::{ClientConnection, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::MailboxError;
pub use imap::ImapSession;
pub use ticket::{
    MessageKind, Sender, Ticket, TicketMessage, TicketStatus, build_ticket, decode_with_fallback,
    truncate_description,
};

const INBOX: &str = "INBOX";

/// Connection settings for the support mailbox.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Applied to connect, read, and write.
    pub timeout: Duration,
}

impl MailboxConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            port: 993,
            username: username.into(),
            password,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Result of the mailbox connection diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxReport {
    pub mailboxes: Vec<String>,
    pub inbox_messages: u32,
}

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Open a TLS connection to the configured IMAP server.
pub fn connect(config: &MailboxConfig) -> Result<ImapSession<TlsStream>, MailboxError> {
    let connect_err = |reason: String| MailboxError::Connect {
        host: config.host.clone(),
        reason,
    };

    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| connect_err(e.to_string()))?
        .next()
        .ok_or_else(|| connect_err("host did not resolve".into()))?;
    let tcp = TcpStream::connect_timeout(&addr, config.timeout)
        .map_err(|e| connect_err(e.to_string()))?;
    tcp.set_read_timeout(Some(config.timeout))?;
    tcp.set_write_timeout(Some(config.timeout))?;

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MailboxError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let conn = ClientConnection::new(Arc::new(tls_config), server_name)
        .map_err(|e| MailboxError::Tls(e.to_string()))?;

    debug!(host = %config.host, port = config.port, "IMAP connection established");
    ImapSession::new(StreamOwned::new(conn, tcp))
}

/// Build a ticket from the newest message in `mailbox`.
///
/// An empty mailbox is `Ok(None)`.
pub fn latest_ticket<S>(
    session: &mut ImapSession<S>,
    mailbox: &str,
) -> Result<Option<Ticket>, MailboxError>
where
    S: std::io::Read + std::io::Write,
{
    session.select(mailbox)?;
    let sequence = match session.search_all()?.pop() {
        Some(seq) => seq,
        None => return Ok(None),
    };
    let raw = session.fetch_rfc822(&sequence)?;
    let ticket = build_ticket(&sequence, &raw);
    if ticket.is_none() {
        warn!(sequence = %sequence, "Newest message could not be parsed");
    }
    Ok(ticket)
}

/// Log in, fetch the newest inbox message, log out.
pub fn fetch_latest(config: &MailboxConfig) -> Result<Option<Ticket>, MailboxError> {
    let ticket = with_session(connect(config)?, config, |s| latest_ticket(s, INBOX))?;
    info!(found = ticket.is_some(), "Mailbox fetch finished");
    Ok(ticket)
}

/// Log in, list mailboxes, and count inbox messages.
pub fn check_connection(config: &MailboxConfig) -> Result<MailboxReport, MailboxError> {
    with_session(connect(config)?, config, inspect)
}

/// Log in, run `work`, then log out.
///
/// Once `work` has succeeded its result is returned even if `LOGOUT` fails.
fn with_session<S, T>(
    mut session: ImapSession<S>,
    config: &MailboxConfig,
    work: impl FnOnce(&mut ImapSession<S>) -> Result<T, MailboxError>,
) -> Result<T, MailboxError>
where
    S: std::io::Read + std::io::Write,
{
    session.login(&config.username, &config.password)?;
    let result = work(&mut session)?;
    if let Err(e) = session.logout() {
        warn!(error = %e, "IMAP LOGOUT failed");
    }
    Ok(result)
}

fn inspect<S>(session: &mut ImapSession<S>) -> Result<MailboxReport, MailboxError>
where
    S: std::io::Read + std::io::Write,
{
    let mailboxes = session.list()?;
    let inbox_messages = session.select(INBOX)?;
    Ok(MailboxReport {
        mailboxes,
        inbox_messages,
    })
}

/// Source of inbound tickets for the HTTP layer.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// The ticket for the most recent message, if there is one.
    async fn fetch_latest_ticket(&self) -> Result<Option<Ticket>, MailboxError>;
}

/// [`TicketSource`] backed by a live IMAP mailbox.
pub struct ImapMailbox {
    config: Arc<MailboxConfig>,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn check_connection(&self) -> Result<MailboxReport, MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || check_connection(&config))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))?
    }
}

#[async_trait]
impl TicketSource for ImapMailbox {
    async fn fetch_latest_ticket(&self) -> Result<Option<Ticket>, MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_latest(&config))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))?
    }
}

/// [`TicketSource`] used when no mailbox credentials are configured.
pub struct UnconfiguredMailbox;

#[async_trait]
impl TicketSource for UnconfiguredMailbox {
    async fn fetch_latest_ticket(&self) -> Result<Option<Ticket>, MailboxError> {
        Err(MailboxError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::imap::testing::{ScriptedStream, sent_text};
    use super::*;

    const MESSAGE: &str = "From: Ana Lopez <ana@example.com>\r\n\
        Subject: Cannot log in\r\n\
        Date: Wed, 15 Oct 2025 10:00:00 +0000\r\n\
        \r\n\
        The password reset link is broken.\r\n";

    #[test]
    fn latest_ticket_fetches_highest_sequence() {
        let script = format!(
            "* OK ready\r\n\
             * 3 EXISTS\r\n\
             A1 OK SELECT completed\r\n\
             * SEARCH 1 2 3\r\n\
             A2 OK SEARCH completed\r\n\
             * 3 FETCH (RFC822 {{{}}}\r\n{MESSAGE})\r\n\
             A3 OK FETCH completed\r\n\
             A4 OK LOGOUT completed\r\n",
            MESSAGE.len()
        );
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();
        let mut session = ImapSession::new(stream).unwrap();

        let ticket = latest_ticket(&mut session, INBOX).unwrap().unwrap();
        session.logout().unwrap();

        assert_eq!(ticket.id, 3);
        assert_eq!(ticket.title, "Cannot log in");
        assert_eq!(ticket.sender.email, "ana@example.com");
        assert!(ticket.description.contains("password reset link"));

        let sent = sent_text(&sent);
        assert!(sent.contains("A1 SELECT \"INBOX\"\r\n"));
        assert!(sent.contains("A2 SEARCH ALL\r\n"));
        assert!(sent.contains("A3 FETCH 3 RFC822\r\n"));
        assert!(sent.ends_with("A4 LOGOUT\r\n"));
    }

    #[test]
    fn ticket_survives_server_hanging_up_on_logout() {
        let script = format!(
            "* OK ready\r\n\
             A1 OK LOGIN completed\r\n\
             * 1 EXISTS\r\n\
             A2 OK SELECT completed\r\n\
             * SEARCH 1\r\n\
             A3 OK SEARCH completed\r\n\
             * 1 FETCH (RFC822 {{{}}}\r\n{MESSAGE})\r\n\
             A4 OK FETCH completed\r\n\
             * BYE logging out\r\n",
            MESSAGE.len()
        );
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();
        let session = ImapSession::new(stream).unwrap();
        let config = MailboxConfig::new("imap.example.com", "desk", SecretString::from("pw"));

        let ticket = with_session(session, &config, |s| latest_ticket(s, INBOX))
            .unwrap()
            .unwrap();
        assert_eq!(ticket.id, 1);
        assert_eq!(ticket.title, "Cannot log in");
        assert!(sent_text(&sent).ends_with("A5 LOGOUT\r\n"));
    }

    #[test]
    fn failed_login_skips_work() {
        let script = "* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] nope\r\n";
        let session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        let config = MailboxConfig::new("imap.example.com", "desk", SecretString::from("pw"));

        let result = with_session(session, &config, |_| -> Result<(), MailboxError> {
            panic!("work must not run after a failed login")
        });
        assert!(matches!(result, Err(MailboxError::Auth { .. })));
    }

    #[test]
    fn empty_mailbox_is_none() {
        let script = "* OK ready\r\n\
             * 0 EXISTS\r\n\
             A1 OK SELECT completed\r\n\
             * SEARCH\r\n\
             A2 OK SEARCH completed\r\n";
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();
        let mut session = ImapSession::new(stream).unwrap();

        assert!(latest_ticket(&mut session, INBOX).unwrap().is_none());
        drop(session);
        assert!(!sent_text(&sent).contains("FETCH"));
    }

    #[test]
    fn failed_select_still_logs_out() {
        let script = "* OK ready\r\nA1 NO mailbox unavailable\r\nA2 OK LOGOUT completed\r\n";
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();
        let result = {
            let mut session = ImapSession::new(stream).unwrap();
            latest_ticket(&mut session, INBOX)
        };
        assert!(matches!(result, Err(MailboxError::Command { .. })));
        assert!(sent_text(&sent).ends_with("A2 LOGOUT\r\n"));
    }

    #[test]
    fn inspect_lists_and_counts() {
        let script = "* OK ready\r\n\
             * LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n\
             * LIST (\\HasNoChildren) \"/\" \"Support\"\r\n\
             A1 OK LIST completed\r\n\
             * 12 EXISTS\r\n\
             A2 OK SELECT completed\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        let report = inspect(&mut session).unwrap();
        assert_eq!(report.mailboxes, vec!["INBOX", "Support"]);
        assert_eq!(report.inbox_messages, 12);
    }

    #[test]
    fn default_config_uses_imaps_port() {
        let config = MailboxConfig::new("imap.example.com", "desk", SecretString::from("s3cret"));
        assert_eq!(config.port, 993);
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
