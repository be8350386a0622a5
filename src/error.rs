//! Error types, one per failure class of the server.
//!
//! Only [`TransportError`] ends a connection. Everything else is turned into a
//! response line and a log entry by whoever handles it.

use std::path::PathBuf;

use thiserror::Error;

/// Failure on the connection itself.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("no data received for {0:?}")]
    Timeout(std::time::Duration),

    /// The line was drained and discarded; the connection is still usable.
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },
}

impl TransportError {
    /// Whether the connection must be dropped after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::LineTooLong { .. })
    }
}

/// A malformed or unsupported command, reported with a 5xx reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmtpError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("command not implemented")]
    NotImplemented,

    #[error("missing argument: expected {0}")]
    MissingArgument(&'static str),

    #[error("no <address> found in {0:?}")]
    NoAddress(String),

    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("message too large (max {max} bytes)")]
    MessageTooLarge { max: usize },
}

impl SmtpError {
    pub fn to_response_code(&self) -> u16 {
        match self {
            SmtpError::UnknownCommand(_) => 500,
            SmtpError::NotImplemented => 502,
            SmtpError::MissingArgument(_) => 501,
            SmtpError::NoAddress(_) => 501,
            SmtpError::LineTooLong { .. } => 500,
            SmtpError::MessageTooLarge { .. } => 552,
        }
    }

    pub fn to_response_message(&self) -> String {
        match self {
            SmtpError::UnknownCommand(_) => "5.5.1 Unknown command".to_string(),
            SmtpError::NotImplemented => "5.5.1 Command not implemented".to_string(),
            SmtpError::MissingArgument(expected) => format!("5.5.4 Syntax: {expected}"),
            SmtpError::NoAddress(_) => "5.1.3 No <address> given".to_string(),
            SmtpError::LineTooLong { max } => format!("5.5.2 Line too long (max {max} bytes)"),
            SmtpError::MessageTooLarge { max } => {
                format!("5.3.4 Message exceeds fixed maximum message size ({max} bytes)")
            }
        }
    }
}

/// The received payload could not be split into headers and body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty message")]
    Empty,

    #[error("payload has no recognisable message structure")]
    Unparseable,
}

/// Attachment extraction stopped early for one message.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("message has no usable Content-Type")]
    MissingContentType,

    #[error("media type {0:?} is not multipart")]
    NotMultipart(String),

    #[error("multipart Content-Type has no boundary parameter")]
    MissingBoundary,

    #[error("no parts delimited by boundary {0:?}")]
    NoParts(String),

    #[error("part {index} is not valid base64: {source}")]
    Decode {
        index: usize,
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Writing a message record or attachment to disk failed.
#[derive(Error, Debug)]
#[error("failed to write {path:?}: {source}")]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure of the outbound client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read attachment {path:?}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server rejected {command}: {code} {text}")]
    Rejected {
        command: String,
        code: u16,
        text: String,
    },

    #[error("malformed reply {0:?}")]
    MalformedReply(String),

    #[error("connection closed by server")]
    Closed,
}
