//! Splitting a command line into verb and argument.

/// Verbs understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Helo,
    Ehlo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Help,
    Vrfy,
    Expn,
    StartTls,
    Auth,
    Quit,
    /// `GET`, `POST` and `CONNECT` from HTTP clients pointed at the wrong port.
    Http,
    Unknown(String),
}

impl Verb {
    fn from_token(token: &str) -> Self {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "HELO" => Verb::Helo,
            "EHLO" => Verb::Ehlo,
            "MAIL" => Verb::Mail,
            "RCPT" => Verb::Rcpt,
            "DATA" => Verb::Data,
            "RSET" => Verb::Rset,
            "NOOP" => Verb::Noop,
            "HELP" => Verb::Help,
            "VRFY" => Verb::Vrfy,
            "EXPN" => Verb::Expn,
            "STARTTLS" => Verb::StartTls,
            "AUTH" => Verb::Auth,
            "QUIT" => Verb::Quit,
            "GET" | "POST" | "CONNECT" => Verb::Http,
            _ => Verb::Unknown(upper),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    /// Everything after the first space, if anything.
    pub argument: Option<String>,
}

impl Command {
    /// Parse one line. Surrounding whitespace, including the terminator, is
    /// ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, argument) = match line.split_once(' ') {
            Some((verb, argument)) => (verb, Some(argument.to_string())),
            None => (line, None),
        };

        Self {
            verb: Verb::from_token(verb),
            argument,
        }
    }

    /// The argument, or `None` if it is missing or blank.
    pub fn argument(&self) -> Option<&str> {
        self.argument
            .as_deref()
            .map(str::trim)
            .filter(|argument| !argument.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_is_case_insensitive() {
        assert_eq!(Command::parse("helo x").verb, Verb::Helo);
        assert_eq!(Command::parse("Ehlo x").verb, Verb::Ehlo);
        assert_eq!(Command::parse("StartTLS").verb, Verb::StartTls);
    }

    #[test]
    fn test_argument_is_rest_of_line() {
        let command = Command::parse("MAIL FROM:<a@x.com> SIZE=10\r\n");
        assert_eq!(command.verb, Verb::Mail);
        assert_eq!(command.argument(), Some("FROM:<a@x.com> SIZE=10"));
    }

    #[test]
    fn test_missing_and_blank_argument() {
        assert_eq!(Command::parse("NOOP").argument, None);
        assert_eq!(Command::parse("MAIL   ").argument(), None);
    }

    #[test]
    fn test_http_and_unknown() {
        assert_eq!(Command::parse("GET / HTTP/1.1").verb, Verb::Http);
        assert_eq!(Command::parse("CONNECT host:443").verb, Verb::Http);
        assert_eq!(
            Command::parse("foo bar").verb,
            Verb::Unknown("FOO".to_string())
        );
        assert_eq!(Command::parse("").verb, Verb::Unknown(String::new()));
    }
}
