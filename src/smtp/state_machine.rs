use crate::{error::SmtpError, Mail};

use super::{
    address,
    command::{Command, Verb},
    data::{DataBuffer, DataLine},
    response::Response,
};

/// Protocol mode of a connection.
///
/// Commands are accepted in any order while `Ready`; nothing is gated on a
/// prior HELO, MAIL or RCPT. `InData` is the only nested mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    InData,
}

/// Per-connection transaction state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub sender: Option<String>,
    /// Replaced as a whole by every successful RCPT.
    pub recipients: Vec<String>,
    /// Non-empty only while in [`State::InData`].
    pub payload: DataBuffer,
}

impl Session {
    fn new(max_message_size: usize) -> Self {
        Self {
            sender: None,
            recipients: Vec::new(),
            payload: DataBuffer::new(max_message_size),
        }
    }

    pub fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.payload.clear();
    }
}

/// What the connection should do after a line has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write the response and keep reading.
    Respond(Response),
    /// Data line consumed, nothing to write.
    Wait,
    /// The transfer is complete; deliver it and write the resulting response.
    Deliver(Mail),
    /// Write the response and close the connection.
    Quit(Response),
}

/// State machine which is capable of handling SMTP commands
/// for receiving mail.
///
/// # Usage
///
/// Feed every received line, terminator included, to `handle_smtp`.
#[derive(Debug)]
pub struct StateMachine {
    pub state: State,
    pub session: Session,
    hostname: String,
    max_message_size: usize,
}

impl StateMachine {
    pub fn new(hostname: impl AsRef<str>, max_message_size: usize) -> Self {
        Self {
            state: State::Ready,
            session: Session::new(max_message_size),
            hostname: hostname.as_ref().to_string(),
            max_message_size,
        }
    }

    pub fn greeting(&self) -> Response {
        Response::greeting(&self.hostname)
    }

    /// Handle a single received line and decide how to answer.
    pub fn handle_smtp(&mut self, raw_line: &[u8]) -> Reply {
        match self.state {
            State::InData => self.handle_data_line(raw_line),
            State::Ready => {
                let line = String::from_utf8_lossy(raw_line);
                tracing::trace!("Received {:?} in state {:?}", line, self.state);

                let command = Command::parse(&line);
                match self.handle_command(&command) {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::debug!("Rejecting {:?}: {}", command.verb, e);
                        Reply::Respond(Response::from_error(&e))
                    }
                }
            }
        }
    }

    /// A line longer than the transport allows was discarded.
    pub fn reject_long_line(&mut self, max: usize) -> Reply {
        match self.state {
            State::InData => {
                self.session.payload.overflow();
                Reply::Wait
            }
            State::Ready => Reply::Respond(Response::from_error(&SmtpError::LineTooLong { max })),
        }
    }

    fn handle_command(&mut self, command: &Command) -> Result<Reply, SmtpError> {
        let response = match &command.verb {
            Verb::Helo => Response::helo(&self.hostname),
            Verb::Ehlo => Response::ehlo(&self.hostname, self.max_message_size),
            Verb::Mail => self.handle_mail(command)?,
            Verb::Rcpt => self.handle_rcpt(command)?,
            Verb::Data => {
                tracing::trace!("Receiving data");
                self.session.payload.clear();
                self.state = State::InData;
                Response::data_start()
            }
            Verb::Rset => {
                self.session.reset();
                Response::ok()
            }
            Verb::Noop | Verb::Http => Response::ok(),
            Verb::Help => Response::help(),
            Verb::Vrfy | Verb::Expn => return Err(SmtpError::NotImplemented),
            Verb::StartTls | Verb::Auth => {
                tracing::trace!("Acknowledging {:?} without effect", command.verb);
                Response::ok()
            }
            Verb::Quit => return Ok(Reply::Quit(Response::quit())),
            Verb::Unknown(verb) => return Err(SmtpError::UnknownCommand(verb.clone())),
        };

        Ok(Reply::Respond(response))
    }

    fn handle_mail(&mut self, command: &Command) -> Result<Response, SmtpError> {
        let argument = command
            .argument()
            .ok_or(SmtpError::MissingArgument("MAIL FROM:<address>"))?;

        let extracted = address::extract(argument, "FROM:");
        if !extracted.prefix_matched {
            tracing::warn!("MAIL argument {:?} does not start with FROM:", argument);
        }
        let sender = extracted
            .first()
            .ok_or_else(|| SmtpError::NoAddress(argument.to_string()))?;

        tracing::debug!("FROM: {}", sender);
        self.session.sender = Some(sender.to_string());
        Ok(Response::ok())
    }

    fn handle_rcpt(&mut self, command: &Command) -> Result<Response, SmtpError> {
        let argument = command
            .argument()
            .ok_or(SmtpError::MissingArgument("RCPT TO:<address>"))?;

        let extracted = address::extract(argument, "To:");
        if !extracted.prefix_matched {
            tracing::warn!("RCPT argument {:?} does not start with TO:", argument);
        }
        if extracted.addresses.is_empty() {
            tracing::warn!("RCPT argument {:?} holds no <address>", argument);
        }

        tracing::debug!("TO: {}", extracted.addresses.join(", "));
        self.session.recipients = extracted.addresses;
        Ok(Response::ok())
    }

    fn handle_data_line(&mut self, raw_line: &[u8]) -> Reply {
        tracing::trace!("Data line {:?}", String::from_utf8_lossy(raw_line));
        if self.session.payload.push_line(raw_line) == DataLine::Pending {
            return Reply::Wait;
        }

        self.state = State::Ready;
        let payload = self.session.payload.take();
        let from = self.session.sender.take();
        let to = std::mem::take(&mut self.session.recipients);
        self.session.reset();

        match payload {
            Ok(data) => Reply::Deliver(Mail { from, to, data }),
            Err(e) => {
                tracing::warn!("Rejecting message from {:?}: {}", from, e);
                Reply::Respond(Response::from_error(&e))
            }
        }
    }

    /// Abandon a transfer cut short by the transport.
    pub fn abort_data(&mut self) {
        if self.state == State::InData {
            tracing::info!(
                "Discarding {} bytes of unfinished DATA",
                self.session.payload.len()
            );
            self.state = State::Ready;
            self.session.reset();
        }
    }
}
