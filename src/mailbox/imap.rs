//! Minimal IMAP4rev1 client session.
//!
//! Only the handful of commands the support desk needs. Generic over the
//! stream so it runs over TLS in production and over an in-memory script in
//! tests.

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::error::MailboxError;

static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}\r?\n$").expect("valid regex"));

static EXISTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\* (\d+) EXISTS").expect("valid regex"));

static LIST_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\* LIST \([^)]*\) (?:"[^"]*"|NIL) (?:"((?:[^"\\]|\\.)*)"|(\S+))"#)
        .expect("valid regex")
});

/// Untagged data returned by one command.
#[derive(Debug, Default)]
pub struct Response {
    /// Untagged lines, CRLF stripped.
    pub lines: Vec<String>,
    /// Literal payloads, in the order they appeared.
    pub literals: Vec<Vec<u8>>,
}

/// An authenticated-or-not IMAP connection.
///
/// Sends `LOGOUT` on drop unless [`ImapSession::logout`] already did.
pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
    closed: bool,
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap a freshly opened stream and consume the server greeting.
    pub fn new(stream: S) -> Result<Self, MailboxError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            next_tag: 1,
            closed: false,
        };
        let greeting = session.read_line()?;
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            session.closed = true;
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailboxError::Protocol("connection closed by server".into()));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Send one tagged command and collect everything up to its completion.
    ///
    /// `NO` and `BAD` completions become [`MailboxError::Command`], labelled
    /// with the command verb only so arguments (credentials) stay out of
    /// error messages.
    pub fn command(&mut self, command: &str) -> Result<Response, MailboxError> {
        self.run(&[Arg::Atom(command.into())])
    }

    /// Like [`command`](Self::command), but arguments may be synchronizing
    /// literals: each `{n}` is sent alone and its bytes follow only after
    /// the server's `+` continuation.
    fn run(&mut self, args: &[Arg<'_>]) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let verb = match args.first() {
            Some(Arg::Atom(text)) => text.split_whitespace().next().unwrap_or("").to_string(),
            _ => String::new(),
        };
        let tagged = format!("{tag} ");
        let mut response = Response::default();

        let mut line = tag.clone().into_bytes();
        for arg in args {
            line.push(b' ');
            match arg {
                Arg::Atom(text) => line.extend_from_slice(text.as_bytes()),
                Arg::Literal(bytes) => {
                    line.extend_from_slice(format!("{{{}}}\r\n", bytes.len()).as_bytes());
                    self.write_all(&line)?;
                    line.clear();
                    self.await_continuation(&tagged, &verb, &mut response)?;
                    line.extend_from_slice(bytes);
                }
            }
        }
        line.extend_from_slice(b"\r\n");
        self.write_all(&line)?;

        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&tagged) {
                return completion(&verb, status).map(|()| response);
            }
            self.collect_untagged(line, &mut response)?;
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), MailboxError> {
        let writer = self.stream.get_mut();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Wait for `+` before sending literal bytes. A tagged reply here means
    /// the server refused the command early.
    fn await_continuation(
        &mut self,
        tagged: &str,
        verb: &str,
        response: &mut Response,
    ) -> Result<(), MailboxError> {
        loop {
            let line = self.read_line()?;
            if line.starts_with('+') {
                return Ok(());
            }
            if let Some(status) = line.strip_prefix(tagged) {
                completion(verb, status)?;
                return Err(MailboxError::Protocol(format!(
                    "{verb} completed before its literal was sent"
                )));
            }
            self.collect_untagged(line, response)?;
        }
    }

    fn collect_untagged(
        &mut self,
        line: String,
        response: &mut Response,
    ) -> Result<(), MailboxError> {
        if let Some(size) = LITERAL
            .captures(&line)
            .and_then(|c| c[1].parse::<usize>().ok())
        {
            let mut literal = vec![0u8; size];
            self.stream.read_exact(&mut literal)?;
            response.literals.push(literal);
        }
        response.lines.push(line.trim_end().to_string());
        Ok(())
    }

    /// Log in. Values that cannot travel as a quoted string (non-ASCII,
    /// CR, LF) go out as literals.
    pub fn login(&mut self, user: &str, password: &SecretString) -> Result<(), MailboxError> {
        let args = [
            Arg::Atom("LOGIN".into()),
            astring(user),
            astring(password.expose_secret()),
        ];
        match self.run(&args) {
            Ok(_) => Ok(()),
            Err(MailboxError::Command { .. }) => Err(MailboxError::Auth {
                user: user.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Select `mailbox`, returning its message count.
    pub fn select(&mut self, mailbox: &str) -> Result<u32, MailboxError> {
        let response = self.command(&format!("SELECT {}", quote(mailbox)))?;
        Ok(response
            .lines
            .iter()
            .find_map(|l| EXISTS.captures(l).and_then(|c| c[1].parse().ok()))
            .unwrap_or(0))
    }

    /// Sequence numbers of every message in the selected mailbox.
    pub fn search_all(&mut self) -> Result<Vec<String>, MailboxError> {
        let response = self.command("SEARCH ALL")?;
        Ok(response
            .lines
            .iter()
            .filter_map(|l| l.strip_prefix("* SEARCH"))
            .flat_map(|rest| rest.split_whitespace().map(str::to_string))
            .collect())
    }

    /// Raw RFC 822 bytes of message `sequence`.
    pub fn fetch_rfc822(&mut self, sequence: &str) -> Result<Vec<u8>, MailboxError> {
        let mut response = self.command(&format!("FETCH {sequence} RFC822"))?;
        if response.literals.is_empty() {
            return Err(MailboxError::Protocol(format!(
                "FETCH {sequence} returned no message body"
            )));
        }
        Ok(response.literals.swap_remove(0))
    }

    /// Names of all mailboxes visible to the user.
    pub fn list(&mut self) -> Result<Vec<String>, MailboxError> {
        let response = self.command("LIST \"\" \"*\"")?;
        Ok(response
            .lines
            .iter()
            .filter_map(|l| {
                let caps = LIST_ENTRY.captures(l)?;
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().replace("\\\"", "\"").replace("\\\\", "\\"))
            })
            .collect())
    }

    /// End the session politely.
    pub fn logout(mut self) -> Result<(), MailboxError> {
        self.closed = true;
        self.command("LOGOUT").map(|_| ())
    }
}

impl<S: Read + Write> Drop for ImapSession<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.command("LOGOUT") {
            tracing::debug!(error = %e, "LOGOUT on drop failed");
        }
    }
}

/// One command argument.
enum Arg<'a> {
    /// Sent inline as-is.
    Atom(Cow<'a, str>),
    /// Sent as a `{n}` synchronizing literal.
    Literal(&'a [u8]),
}

/// Tagged completion status: `OK` or a command error.
fn completion(verb: &str, status: &str) -> Result<(), MailboxError> {
    let status = status.trim_end();
    if status.starts_with("OK") {
        return Ok(());
    }
    Err(MailboxError::Command {
        command: verb.to_string(),
        response: status.to_string(),
    })
}

/// Quoted string when the value allows it, literal otherwise.
fn astring(value: &str) -> Arg<'_> {
    let quotable = value
        .bytes()
        .all(|b| b.is_ascii() && !matches!(b, b'\0' | b'\r' | b'\n'));
    if quotable {
        Arg::Atom(quote(value).into())
    } else {
        Arg::Literal(value.as_bytes())
    }
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedStream, sent_text};
    use super::*;

    const GREETING: &str = "* OK IMAP4rev1 ready\r\n";

    #[test]
    fn rejects_bad_greeting() {
        let stream = ScriptedStream::new("* BYE go away\r\n");
        let sent = stream.sent_handle();
        assert!(matches!(
            ImapSession::new(stream),
            Err(MailboxError::Protocol(_))
        ));
        // No LOGOUT attempted on a session that never opened.
        assert!(sent_text(&sent).is_empty());
    }

    #[test]
    fn login_and_logout() {
        let script = format!("{GREETING}A1 OK LOGIN completed\r\nA2 OK LOGOUT completed\r\n");
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();

        let mut session = ImapSession::new(stream).unwrap();
        session
            .login("desk@example.com", &SecretString::from("p\"ss"))
            .unwrap();
        session.logout().unwrap();

        let sent = sent_text(&sent);
        assert_eq!(
            sent,
            "A1 LOGIN \"desk@example.com\" \"p\\\"ss\"\r\nA2 LOGOUT\r\n"
        );
    }

    #[test]
    fn non_ascii_password_goes_out_as_literal() {
        let script = format!(
            "{GREETING}+ Ready for literal data\r\nA1 OK LOGIN completed\r\nA2 OK LOGOUT completed\r\n"
        );
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();

        let mut session = ImapSession::new(stream).unwrap();
        session
            .login("desk@example.com", &SecretString::from("contraseña"))
            .unwrap();
        session.logout().unwrap();

        assert_eq!(
            sent_text(&sent),
            "A1 LOGIN \"desk@example.com\" {11}\r\ncontraseña\r\nA2 LOGOUT\r\n"
        );
    }

    #[test]
    fn literal_refused_before_continuation_is_auth_error() {
        let script = format!("{GREETING}A1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let stream = ScriptedStream::new(script);
        let sent = stream.sent_handle();
        let mut session = ImapSession::new(stream).unwrap();

        let err = session
            .login("desk@example.com", &SecretString::from("señal"))
            .unwrap_err();
        assert!(matches!(err, MailboxError::Auth { .. }));
        // The literal bytes were never sent.
        assert!(!sent_text(&sent).contains("señal"));
    }

    #[test]
    fn astring_picks_quoted_or_literal() {
        assert!(matches!(astring("plain"), Arg::Atom(ref a) if a == "\"plain\""));
        assert!(matches!(astring("ñ"), Arg::Literal(b) if b == "ñ".as_bytes()));
        assert!(matches!(astring("two\r\nlines"), Arg::Literal(_)));
    }

    #[test]
    fn rejected_login_is_auth_error_without_password() {
        let script = format!("{GREETING}A1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();

        let err = session
            .login("desk@example.com", &SecretString::from("hunter2"))
            .unwrap_err();
        assert!(matches!(err, MailboxError::Auth { ref user } if user == "desk@example.com"));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn drop_sends_logout() {
        let stream = ScriptedStream::new(GREETING);
        let sent = stream.sent_handle();
        {
            let _session = ImapSession::new(stream).unwrap();
        }
        // The server hung up, but the LOGOUT was still written.
        assert_eq!(sent_text(&sent), "A1 LOGOUT\r\n");
    }

    #[test]
    fn select_reports_message_count() {
        let script = format!(
            "{GREETING}* FLAGS (\\Seen)\r\n* 42 EXISTS\r\n* 0 RECENT\r\nA1 OK [READ-WRITE] SELECT completed\r\n"
        );
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        assert_eq!(session.select("INBOX").unwrap(), 42);
    }

    #[test]
    fn search_collects_sequence_numbers() {
        let script = format!("{GREETING}* SEARCH 1 2 7\r\nA1 OK SEARCH completed\r\n");
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        assert_eq!(session.search_all().unwrap(), vec!["1", "2", "7"]);
    }

    #[test]
    fn empty_search_is_empty() {
        let script = format!("{GREETING}* SEARCH\r\nA1 OK SEARCH completed\r\n");
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        assert!(session.search_all().unwrap().is_empty());
    }

    #[test]
    fn fetch_reads_literal_by_byte_count() {
        // The body contains a line that looks like a tagged completion.
        let body = "Subject: hi\r\n\r\nA1 OK not really\r\n";
        let script = format!(
            "{GREETING}* 3 FETCH (RFC822 {{{}}}\r\n{body})\r\nA1 OK FETCH completed\r\n",
            body.len()
        );
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        let raw = session.fetch_rfc822("3").unwrap();
        assert_eq!(raw, body.as_bytes());
    }

    #[test]
    fn fetch_without_literal_is_protocol_error() {
        let script = format!("{GREETING}A1 OK FETCH completed\r\n");
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        assert!(matches!(
            session.fetch_rfc822("3"),
            Err(MailboxError::Protocol(_))
        ));
    }

    #[test]
    fn bad_completion_is_command_error() {
        let script = format!("{GREETING}A1 BAD unknown mailbox\r\n");
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        match session.select("Nope") {
            Err(MailboxError::Command { command, response }) => {
                assert_eq!(command, "SELECT");
                assert!(response.starts_with("BAD"));
            }
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[test]
    fn list_parses_quoted_and_atom_names() {
        let script = format!(
            "{GREETING}* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n\
             * LIST (\\HasChildren \\Noselect) \"/\" \"[Gmail]\"\r\n\
             * LIST (\\HasNoChildren) \"/\" Archive\r\n\
             A1 OK LIST completed\r\n"
        );
        let mut session = ImapSession::new(ScriptedStream::new(script)).unwrap();
        assert_eq!(session.list().unwrap(), vec!["INBOX", "[Gmail]", "Archive"]);
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}
