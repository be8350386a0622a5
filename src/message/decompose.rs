//! Turning a completed transfer into a parsed message and a storable record.

use chrono::{DateTime, Local};
use mail_parser::Message;

use crate::{error::ParseError, Mail};

use super::{addresses, parse};

/// Where and when a message was received.
#[derive(Debug, Clone)]
pub struct Reception<'a> {
    pub hostname: &'a str,
    pub peer: &'a str,
    pub at: DateTime<Local>,
}

impl Reception<'_> {
    /// `<nanos.pid@peer>`
    pub fn message_id(&self) -> String {
        format!(
            "<{}.{}@{}>",
            self.at.timestamp_nanos_opt().unwrap_or_default(),
            std::process::id(),
            self.peer
        )
    }

    /// `Received`, `Date` and `Message-ID` lines, CRLF-terminated.
    pub fn trace_headers(&self) -> String {
        let date = self.at.to_rfc2822();
        format!(
            "Received: from {} by {} (naive-mail); {}\r\nDate: {}\r\nMessage-ID: {}\r\n",
            self.peer,
            self.hostname,
            date,
            date,
            self.message_id()
        )
    }
}

/// Sender, recipients and subject of a message, taken from its headers or,
/// where those are absent, from the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
}

impl Summary {
    fn new(message: Option<&Message<'_>>, mail: &Mail, reception: &Reception<'_>) -> Self {
        let from = message
            .and_then(|message| message.from())
            .map(addresses)
            .filter(|from| !from.is_empty())
            .map(|from| from.join(", "))
            .unwrap_or_else(|| mail.from.clone().unwrap_or_default());
        let to = message
            .and_then(|message| message.to())
            .map(addresses)
            .filter(|to| !to.is_empty())
            .unwrap_or_else(|| mail.to.clone());
        let subject = message
            .and_then(|message| message.subject())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "[SMTP Server] Message received at {}",
                    reception.at.format("%Y-%m-%d %H:%M:%S")
                )
            });

        Self { from, to, subject }
    }
}

#[derive(Debug)]
pub struct Decomposed<'a> {
    /// `None` when the payload could not be parsed at all.
    pub message: Option<Message<'a>>,
    pub summary: Summary,
    /// Trace headers followed by the payload exactly as received.
    pub record: Vec<u8>,
    pub parse_error: Option<ParseError>,
}

/// Parse `mail.data`, summarize it with envelope fallbacks, and build the
/// record to store.
pub fn decompose<'a>(mail: &'a Mail, reception: &Reception<'_>) -> Decomposed<'a> {
    let (message, parse_error) = match parse(&mail.data) {
        Ok(message) => (Some(message), None),
        Err(e) => {
            tracing::warn!("Message from {} could not be parsed: {}", reception.peer, e);
            (None, Some(e))
        }
    };
    let summary = Summary::new(message.as_ref(), mail, reception);

    let trace = reception.trace_headers();
    let mut record = Vec::with_capacity(trace.len() + mail.data.len());
    record.extend_from_slice(trace.as_bytes());
    record.extend_from_slice(&mail.data);

    Decomposed {
        message,
        summary,
        record,
        parse_error,
    }
}
