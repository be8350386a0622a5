//! Replies sent to the client.

use crate::error::SmtpError;

/// A numeric reply with one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        debug_assert!(!lines.is_empty());
        Self { code, lines }
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, format!("{hostname} SMTP service ready"))
    }

    pub fn helo(hostname: &str) -> Self {
        Self::new(250, format!("{hostname} Hello, welcome"))
    }

    /// EHLO reply advertising `SIZE` as `max_message_size`.
    pub fn ehlo(hostname: &str, max_message_size: usize) -> Self {
        Self::multiline(
            250,
            vec![
                format!("{hostname} Hello, it is OK"),
                "8BITMIME".to_string(),
                "PIPELINING".to_string(),
                "SMTPUTF8".to_string(),
                "AUTH LOGIN PLAIN CRAM-MD5".to_string(),
                format!("SIZE {max_message_size}"),
                "STARTTLS".to_string(),
                "HELP".to_string(),
            ],
        )
    }

    pub fn help() -> Self {
        Self::new(214, "No help available")
    }

    pub fn data_start() -> Self {
        Self::new(354, "Enter mail, end with \".\" on a line by itself")
    }

    pub fn accepted() -> Self {
        Self::new(250, "OK: message accepted")
    }

    /// Local failure while processing an accepted transfer.
    pub fn processing_error() -> Self {
        Self::new(451, "4.3.0 Error in processing email")
    }

    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    pub fn timeout() -> Self {
        Self::new(421, "4.4.2 Idle timeout, closing connection")
    }

    pub fn from_error(error: &SmtpError) -> Self {
        Self::new(error.to_response_code(), error.to_response_message())
    }

    /// Wire form: `code-text` for every line but the last, `code text` for
    /// the last, each terminated by CRLF.
    pub fn format(&self) -> String {
        let mut result = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            result.push_str(&format!("{}{}{}\r\n", self.code, separator, line));
        }
        result
    }
}
