//! Ticket model: one support ticket built from one mailbox message.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};
use serde::{Deserialize, Serialize};

/// Characters of body kept in a ticket description.
pub const DESCRIPTION_LIMIT: usize = 200;

const NO_SUBJECT: &str = "No Subject";

/// Ticket workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    New,
    Open,
    Pending,
    Closed,
}

/// Direction of a ticket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Received,
    Sent,
}

/// A message attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: String,
    pub subject: String,
    pub content: String,
    pub from_address: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

/// Who opened the ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

impl Sender {
    /// Parse a `From` header value such as `"Ana Lopez <ana@example.com>"`.
    ///
    /// Without `<`, the whole value is used as both email and name.
    pub fn from_header(value: &str) -> Self {
        let value = value.trim();
        match value.split_once('<') {
            Some((name, rest)) => {
                let email = rest.trim_end().trim_end_matches('>').trim().to_string();
                let name = name.trim().trim_matches('"').trim();
                Self {
                    name: if name.is_empty() {
                        email.clone()
                    } else {
                        name.to_string()
                    },
                    email,
                }
            }
            None => Self {
                email: value.to_string(),
                name: value.to_string(),
            },
        }
    }
}

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub origin: String,
    pub messages: Vec<TicketMessage>,
    pub created: DateTime<Utc>,
    pub last_message: DateTime<Utc>,
    pub sender: Sender,
    pub status: TicketStatus,
}

impl Ticket {
    /// Content of the most recent message, if any.
    pub fn latest_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// First [`DESCRIPTION_LIMIT`] characters of `content`, plus `...` when cut.
pub fn truncate_description(content: &str) -> String {
    if content.chars().count() > DESCRIPTION_LIMIT {
        let head: String = content.chars().take(DESCRIPTION_LIMIT).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// Decode a text payload, falling back to Latin-1 when the declared charset
/// does not decode cleanly. Never fails.
pub fn decode_with_fallback(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.map(|c| c.trim().to_ascii_lowercase());
    match charset.as_deref() {
        None | Some("utf-8" | "utf8" | "us-ascii" | "ascii") => {
            match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "Body is not valid UTF-8, decoding as Latin-1");
                    decode_latin1(bytes)
                }
            }
        }
        Some("iso-8859-1" | "latin1" | "latin-1") => decode_latin1(bytes),
        Some("windows-1252" | "cp1252") => decode_cp1252(bytes),
        Some(other) => {
            tracing::debug!(charset = other, "Unsupported charset, trying UTF-8 then Latin-1");
            String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| decode_latin1(bytes))
        }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// windows-1252 code points for bytes 0x80..=0x9F. The five unassigned
/// bytes keep their Latin-1 value.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn decode_cp1252(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[usize::from(b - 0x80)],
            _ => char::from(b),
        })
        .collect()
}

/// Readable text of a parsed message.
///
/// Prefers the first text body as decoded by `mail-parser`. Text parts it
/// left as raw bytes go through [`decode_with_fallback`].
pub fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.into_owned();
    }

    for part in &parsed.parts {
        let Some(ct) = part.content_type() else {
            continue;
        };
        if !ct.ctype().eq_ignore_ascii_case("text") {
            continue;
        }
        if let PartType::Binary(bytes) | PartType::InlineBinary(bytes) = &part.body {
            return decode_with_fallback(bytes, ct.attribute("charset"));
        }
    }

    String::new()
}

/// Message date as UTC, or now when the header is missing.
fn message_date(parsed: &mail_parser::Message) -> DateTime<Utc> {
    parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now)
}

/// Sender of a parsed message, rendered as a `From` header and split.
fn message_sender(parsed: &mail_parser::Message) -> Sender {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return Sender::from_header("unknown");
    };
    let header = match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => "unknown".to_string(),
    };
    Sender::from_header(&header)
}

/// Build a ticket from a raw RFC 822 message fetched at `sequence`.
///
/// Returns `None` if the bytes cannot be parsed as a message.
pub fn build_ticket(sequence: &str, raw: &[u8]) -> Option<Ticket> {
    let parsed = MessageParser::default().parse(raw)?;

    let title = parsed
        .subject()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_SUBJECT)
        .to_string();
    let content = extract_text(&parsed);
    let date = message_date(&parsed);
    let sender = message_sender(&parsed);

    let message = TicketMessage {
        id: sequence.to_string(),
        subject: title.clone(),
        content: content.clone(),
        from_address: sender.email.clone(),
        timestamp: date,
        kind: MessageKind::Received,
    };

    Some(Ticket {
        id: sequence.trim().parse().unwrap_or(1),
        title,
        description: truncate_description(&content),
        origin: "email".to_string(),
        messages: vec![message],
        created: date,
        last_message: date,
        sender,
        status: TicketStatus::New,
    })
}
