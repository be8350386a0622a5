//! Attachment extraction from `multipart/*` messages.
//!
//! Only the top level of a multipart body is walked. A part that is itself
//! multipart is classified by its own headers like any other part and its
//! children are not visited.

use std::path::PathBuf;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use chrono::{DateTime, Local};
use mail_parser::{ContentType, Message, MessagePart, MimeHeaders, PartType};

use crate::{error::ExtractionError, storage::Store};

/// Standard alphabet, padding optional, for bodies produced by sloppy clients.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One direct child of a multipart message.
#[derive(Debug, Clone, Copy)]
pub struct Part<'a> {
    inner: &'a MessagePart<'a>,
    /// Body bytes exactly as transferred, still encoded.
    pub body: &'a [u8],
}

impl<'a> Part<'a> {
    fn new(raw: &'a [u8], inner: &'a MessagePart<'a>) -> Self {
        Self {
            inner,
            body: raw_body(raw, inner),
        }
    }

    /// `type/subtype` of the part, `text/plain` when undeclared.
    pub fn media_type(&self) -> String {
        self.inner
            .content_type()
            .map_or_else(|| "text/plain".to_string(), media_type)
    }

    /// `filename` from `Content-Disposition`, reduced to its last path
    /// component.
    pub fn declared_filename(&self) -> Option<String> {
        self.inner
            .content_disposition()
            .and_then(|disposition| disposition.attribute("filename"))
            .and_then(base_name)
    }

    /// Declared filename, else the `name` parameter of `Content-Type`.
    pub fn filename(&self) -> Option<String> {
        self.inner.attachment_name().and_then(base_name)
    }

    /// Whether the part is stored as a file rather than treated as text.
    pub fn is_attachment(&self) -> bool {
        let disposition = self
            .inner
            .content_disposition()
            .map(|disposition| disposition.ctype().to_ascii_lowercase())
            .unwrap_or_default();
        let application = self
            .inner
            .content_type()
            .is_some_and(|content_type| content_type.ctype().eq_ignore_ascii_case("application"));

        disposition.contains("attachment")
            || application
            || (disposition.contains("inline") && self.declared_filename().is_some())
    }

    /// The body with any base64 transfer encoding removed. Other encodings
    /// are passed through untouched.
    pub fn decoded_body(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let base64 = self
            .inner
            .content_transfer_encoding()
            .is_some_and(|encoding| encoding.to_ascii_lowercase().contains("base64"));
        if !base64 {
            return Ok(self.body.to_vec());
        }

        let compact: Vec<u8> = self
            .body
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        BASE64.decode(compact)
    }
}

fn media_type(content_type: &ContentType<'_>) -> String {
    match content_type.subtype() {
        Some(subtype) => format!("{}/{}", content_type.ctype(), subtype),
        None => content_type.ctype().to_string(),
    }
}

/// Slice of the raw message holding the body of `part`.
fn raw_body<'a>(raw: &'a [u8], part: &MessagePart<'_>) -> &'a [u8] {
    let start = (part.offset_body as usize).min(raw.len());
    let end = (part.offset_end as usize).clamp(start, raw.len());
    let body = &raw[start..end];

    // the line break before a delimiter belongs to the delimiter
    if raw[end..].starts_with(b"--") {
        if let Some(body) = body.strip_suffix(b"\n") {
            return body.strip_suffix(b"\r").unwrap_or(body);
        }
    }
    body
}

fn base_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Whether the message declares a multipart body at all.
pub fn is_multipart(message: &Message<'_>) -> bool {
    message
        .root_part()
        .content_type()
        .is_some_and(|content_type| content_type.ctype().eq_ignore_ascii_case("multipart"))
}

/// Direct children of a multipart message, in order.
pub fn parts<'a>(message: &'a Message<'a>) -> Result<Vec<Part<'a>>, ExtractionError> {
    let root = message.root_part();
    let content_type = root
        .content_type()
        .ok_or(ExtractionError::MissingContentType)?;
    if !content_type.ctype().eq_ignore_ascii_case("multipart") {
        return Err(ExtractionError::NotMultipart(media_type(content_type)));
    }

    let boundary = content_type
        .attribute("boundary")
        .filter(|boundary| !boundary.is_empty())
        .ok_or(ExtractionError::MissingBoundary)?;
    let children = match &root.body {
        PartType::Multipart(children) if !children.is_empty() => children,
        _ => return Err(ExtractionError::NoParts(boundary.to_string())),
    };

    let raw = message.raw_message();
    Ok(children
        .iter()
        .filter_map(|id| message.part(*id))
        .map(|part| Part::new(raw, part))
        .collect())
}

/// Store every attachment part of `message`, returning the written paths.
///
/// Attachment indices count attachment parts only. Extraction stops at the
/// first undecodable body or write failure; files written before that stay
/// in place.
pub async fn extract_attachments(
    message: &Message<'_>,
    store: &Store,
    received_at: &DateTime<Local>,
) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut saved = Vec::new();
    let mut attachment_index = 0;

    for (part_index, part) in parts(message)?.into_iter().enumerate() {
        let media_type = part.media_type();

        if !part.is_attachment() {
            tracing::debug!(
                "Inline part {} ({}): {}",
                part_index,
                media_type,
                String::from_utf8_lossy(part.body)
            );
            continue;
        }

        let filename = part
            .filename()
            .unwrap_or_else(|| format!("part{attachment_index}.bin"));
        tracing::info!("Found attachment {} ({})", filename, media_type);

        let content = part
            .decoded_body()
            .map_err(|source| ExtractionError::Decode {
                index: part_index,
                source,
            })?;
        let path = store
            .write_attachment(received_at, attachment_index, &filename, &content)
            .await?;
        tracing::info!("Attachment saved to {:?} ({} bytes)", path, content.len());

        saved.push(path);
        attachment_index += 1;
    }

    Ok(saved)
}
