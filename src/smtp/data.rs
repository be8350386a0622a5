//! Accumulation of the DATA payload up to the terminating `.` line.
//!
//! Lines are stored exactly as received. Leading dots are not unstuffed, so a
//! client-stuffed `..` line is kept as `..`.

use crate::error::SmtpError;

/// Whether `line` ends the transfer: a lone `.` followed by CRLF or LF.
pub fn is_sentinel(line: &[u8]) -> bool {
    line == b".\r\n" || line == b".\n"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLine {
    /// Line stored, keep reading.
    Pending,
    /// Sentinel seen, the payload is complete.
    End,
}

/// Growable payload buffer with a size cap.
///
/// Once the cap is exceeded the buffer drops what it has and ignores further
/// lines until the sentinel, so the transfer can still be read to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBuffer {
    bytes: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl DataBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    pub fn push_line(&mut self, line: &[u8]) -> DataLine {
        if is_sentinel(line) {
            return DataLine::End;
        }

        if !self.overflowed && self.bytes.len() + line.len() > self.limit {
            tracing::warn!("DATA payload exceeds {} bytes, discarding", self.limit);
            self.overflow();
        }
        if !self.overflowed {
            self.bytes.extend_from_slice(line);
        }

        DataLine::Pending
    }

    /// Mark the transfer as rejected, e.g. after an over-long line.
    pub fn overflow(&mut self) {
        self.overflowed = true;
        self.bytes = Vec::new();
    }

    /// Hand out the payload and leave the buffer empty.
    pub fn take(&mut self) -> Result<Vec<u8>, SmtpError> {
        let overflowed = std::mem::replace(&mut self.overflowed, false);
        let bytes = std::mem::take(&mut self.bytes);
        if overflowed {
            Err(SmtpError::MessageTooLarge { max: self.limit })
        } else {
            Ok(bytes)
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.overflowed = false;
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() && !self.overflowed
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        assert!(is_sentinel(b".\r\n"));
        assert!(is_sentinel(b".\n"));
        assert!(!is_sentinel(b"."));
        assert!(!is_sentinel(b"..\r\n"));
        assert!(!is_sentinel(b". \r\n"));
        assert!(!is_sentinel(b".foo\r\n"));
    }

    #[test]
    fn test_lines_kept_verbatim() {
        let mut buffer = DataBuffer::new(1024);
        assert_eq!(buffer.push_line(b"Subject: hi\r\n"), DataLine::Pending);
        assert_eq!(buffer.push_line(b"\r\n"), DataLine::Pending);
        assert_eq!(buffer.push_line(b"..dotted\r\n"), DataLine::Pending);
        assert_eq!(buffer.push_line(b".more\n"), DataLine::Pending);
        assert_eq!(buffer.push_line(b".\r\n"), DataLine::End);

        assert_eq!(
            buffer.take().unwrap(),
            b"Subject: hi\r\n\r\n..dotted\r\n.more\n".to_vec()
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_discards_until_sentinel() {
        let mut buffer = DataBuffer::new(10);
        buffer.push_line(b"12345\r\n");
        buffer.push_line(b"67890\r\n");
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.push_line(b"x\r\n"), DataLine::Pending);
        assert_eq!(buffer.push_line(b".\r\n"), DataLine::End);

        assert_eq!(buffer.take(), Err(SmtpError::MessageTooLarge { max: 10 }));
        // the next transfer starts clean
        buffer.push_line(b"ok\r\n");
        assert_eq!(buffer.take().unwrap(), b"ok\r\n".to_vec());
    }

    #[test]
    fn test_clear() {
        let mut buffer = DataBuffer::new(10);
        buffer.push_line(b"abc\r\n");
        buffer.overflow();
        assert!(!buffer.is_empty());
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
