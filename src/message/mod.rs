//! Parsing of received payloads.

pub mod decompose;
pub mod mime;

use mail_parser::{Address, Message, MessageParser};

use crate::error::ParseError;

/// Parse a DATA payload into headers and parts.
pub fn parse(raw: &[u8]) -> Result<Message<'_>, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }
    MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Unparseable)
}

/// Bare addresses of an address header, display names dropped.
pub(crate) fn addresses(address: &Address<'_>) -> Vec<String> {
    address
        .iter()
        .filter_map(|addr| addr.address())
        .map(str::to_string)
        .collect()
}
