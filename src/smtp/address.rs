//! Tolerant extraction of `<address>` tokens from MAIL and RCPT arguments.

/// Result of scanning a command argument for addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Whether the argument started with the expected label, e.g. `FROM:`.
    pub prefix_matched: bool,
    /// Every non-empty `<...>` interior, in order of appearance.
    pub addresses: Vec<String>,
}

impl Extracted {
    pub fn first(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

/// Scan `argument` for bracketed addresses.
///
/// The prefix is compared case-insensitively and its absence does not stop
/// the scan. Text outside the brackets is ignored, as are empty `<>` pairs
/// and a trailing `<` without a closing `>`.
pub fn extract(argument: &str, expected_prefix: &str) -> Extracted {
    let prefix_matched = argument
        .get(..expected_prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(expected_prefix));

    let mut addresses = Vec::new();
    let mut rest = argument;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        let inner = after[..close].trim();
        if !inner.is_empty() {
            addresses.push(inner.to_string());
        }
        rest = &after[close + 1..];
    }

    Extracted {
        prefix_matched,
        addresses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_address() {
        let extracted = extract("FROM:<a@x.com>", "FROM:");
        assert!(extracted.prefix_matched);
        assert_eq!(extracted.addresses, vec!["a@x.com"]);
        assert_eq!(extracted.first(), Some("a@x.com"));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        assert!(extract("from: <a@x.com>", "FROM:").prefix_matched);
        assert!(extract("TO:<b@y.com>", "To:").prefix_matched);
    }

    #[test]
    fn test_prefix_mismatch_still_scans() {
        let extracted = extract("<a@x.com> SIZE=100", "FROM:");
        assert!(!extracted.prefix_matched);
        assert_eq!(extracted.addresses, vec!["a@x.com"]);
    }

    #[test]
    fn test_multiple_addresses_keep_order() {
        let extracted = extract("To:<b@y.com>, <c@z.com> <d@w.com>", "To:");
        assert_eq!(extracted.addresses, vec!["b@y.com", "c@z.com", "d@w.com"]);
    }

    #[test]
    fn test_no_addresses() {
        for argument in ["FROM:", "FROM:a@x.com", "FROM:<>", "FROM:<a@x.com", ""] {
            let extracted = extract(argument, "FROM:");
            assert!(extracted.addresses.is_empty(), "{argument:?}");
            assert_eq!(extracted.first(), None);
        }
    }

    #[test]
    fn test_short_argument_does_not_match_prefix() {
        assert!(!extract("FR", "FROM:").prefix_matched);
        // multi-byte characters must not split inside a code point
        assert!(!extract("fröm:<a@x.com>", "FROM:").prefix_matched);
    }
}
