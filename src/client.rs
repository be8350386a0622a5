//! Outbound submission of a message with file attachments.
//!
//! Used to exercise the server from the outside: no TLS and no
//! authentication.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use tokio::{
    io::{
        AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
    },
    net::{TcpStream, ToSocketAddrs},
};

use crate::error::ClientError;

const LINE_WIDTH: usize = 76;

/// A message to submit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Files sent as `application/octet-stream` parts.
    pub attachments: Vec<PathBuf>,
}

/// Boundary token derived from the current time.
pub fn boundary() -> String {
    format!("boundary_{}", Utc::now().timestamp())
}

/// Build the `multipart/mixed` payload for `mail`.
pub async fn compose(mail: &OutgoingMail, boundary: &str) -> Result<Vec<u8>, ClientError> {
    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", mail.from));
    out.push_str(&format!("To: {}\r\n", mail.to.join(",")));
    out.push_str(&format!("Subject: {}\r\n", mail.subject));
    out.push_str(&format!(
        "Content-Type: multipart/mixed; boundary={boundary}\r\n\r\n"
    ));

    out.push_str(&format!("--{boundary}\r\n"));
    out.push_str("Content-Type: text/plain; charset=UTF-8\r\n\r\n");
    out.push_str(&mail.body);
    out.push_str("\r\n");

    for path in &mail.attachments {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Attachment {
                path: path.clone(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str("Content-Type: application/octet-stream\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str(&format!(
            "Content-Disposition: attachment; filename={filename}\r\n\r\n"
        ));

        let encoded = STANDARD.encode(&content);
        for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
            // base64 output is ASCII
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
    }

    out.push_str(&format!("--{boundary}--\r\n"));
    Ok(out.into_bytes())
}

/// Prepare `payload` for DATA: bare LF becomes CRLF, a leading `.` is
/// doubled, and the result ends with CRLF.
pub fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64 + 2);
    let mut at_line_start = true;

    for (i, &byte) in payload.iter().enumerate() {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && (i == 0 || payload[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// A reply read from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerReply {
    code: u16,
    lines: Vec<String>,
}

impl ServerReply {
    fn text(&self) -> String {
        self.lines.join(" / ")
    }
}

struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn read_reply(&mut self) -> Result<ServerReply, ClientError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(ClientError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']);

            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| ClientError::MalformedReply(line.to_string()))?;
            let continued = match line.as_bytes().get(3) {
                None | Some(b' ') => false,
                Some(b'-') => true,
                Some(_) => return Err(ClientError::MalformedReply(line.to_string())),
            };
            lines.push(line.get(4..).unwrap_or_default().to_string());

            if !continued {
                return Ok(ServerReply { code, lines });
            }
        }
    }

    /// Read a reply and fail unless it carries `expected`.
    async fn expect(&mut self, what: &str, expected: u16) -> Result<ServerReply, ClientError> {
        let reply = self.read_reply().await?;
        tracing::trace!("{} -> {} {}", what, reply.code, reply.text());
        if reply.code != expected {
            return Err(ClientError::Rejected {
                command: what.to_string(),
                code: reply.code,
                text: reply.text(),
            });
        }
        Ok(reply)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn command(&mut self, line: &str, expected: u16) -> Result<ServerReply, ClientError> {
        self.write(format!("{line}\r\n").as_bytes()).await?;
        self.expect(line, expected).await
    }
}

/// Submit `mail` over an established connection.
pub async fn send<S>(stream: S, helo: &str, mail: &OutgoingMail) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite,
{
    let payload = compose(mail, &boundary()).await?;
    let mut connection = Connection::new(stream);

    connection.expect("greeting", 220).await?;
    connection.command(&format!("EHLO {helo}"), 250).await?;
    connection
        .command(&format!("MAIL FROM:<{}>", mail.from), 250)
        .await?;
    for recipient in &mail.to {
        connection
            .command(&format!("RCPT TO:<{recipient}>"), 250)
            .await?;
    }
    connection.command("DATA", 354).await?;

    connection.write(&dot_stuff(&payload)).await?;
    connection.write(b".\r\n").await?;
    connection.expect("end of DATA", 250).await?;
    tracing::info!(
        "Sent {} bytes with {} attachment(s) to {}",
        payload.len(),
        mail.attachments.len(),
        mail.to.join(", ")
    );

    connection.command("QUIT", 221).await?;
    Ok(())
}

/// Connect to `addr` and submit `mail`.
pub async fn send_to(
    addr: impl ToSocketAddrs,
    helo: &str,
    mail: &OutgoingMail,
) -> Result<(), ClientError> {
    let stream = TcpStream::connect(addr).await?;
    send(stream, helo, mail).await
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tempfile::TempDir;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{
        config::Config,
        delivery::Delivery,
        smtp::server::{self, Server},
        storage::Store,
    };

    fn mail_with(attachments: Vec<PathBuf>) -> OutgoingMail {
        OutgoingMail {
            from: "sender@example.com".to_string(),
            to: vec!["one@example.com".to_string(), "two@example.com".to_string()],
            subject: "Attachment test".to_string(),
            body: "Please find the files attached.".to_string(),
            attachments,
        }
    }

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            hostname: "mx.test".to_string(),
            message_dir: tmp.path().join("emails"),
            attachment_dir: tmp.path().join("attachments"),
            idle_timeout: Duration::from_secs(5),
            ..Config::default()
        }
    }

    #[test]
    fn test_boundary_token() {
        let token = boundary();
        let seconds = token.strip_prefix("boundary_").unwrap();
        assert!(seconds.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_dot_stuff() {
        assert_eq!(dot_stuff(b".hidden\r\nok\r\n"), b"..hidden\r\nok\r\n");
        assert_eq!(dot_stuff(b"a\n.\nb"), b"a\r\n..\r\nb\r\n");
        assert_eq!(dot_stuff(b"x.y\r\n"), b"x.y\r\n");
        assert_eq!(dot_stuff(b""), b"\r\n");
    }

    #[tokio::test]
    async fn test_compose_layout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        std::fs::write(&path, vec![7u8; 200]).unwrap();

        let payload = compose(&mail_with(vec![path]), "boundary_42").await.unwrap();
        let text = String::from_utf8(payload).unwrap();

        assert!(text.starts_with(
            "From: sender@example.com\r\nTo: one@example.com,two@example.com\r\n"
        ));
        assert!(text.contains("Content-Type: multipart/mixed; boundary=boundary_42\r\n\r\n"));
        assert!(text.contains("Content-Disposition: attachment; filename=blob.bin\r\n"));
        assert!(text.ends_with("\r\n--boundary_42--\r\n"));

        let encoded: Vec<&str> = text
            .split("\r\n")
            .skip_while(|line| !line.starts_with("Content-Disposition"))
            .skip(2)
            .take_while(|line| !line.is_empty())
            .collect();
        assert!(encoded.len() > 1);
        assert!(encoded[..encoded.len() - 1]
            .iter()
            .all(|line| line.len() == LINE_WIDTH));
        assert_eq!(STANDARD.decode(encoded.concat()).unwrap(), vec![7u8; 200]);
    }

    #[tokio::test]
    async fn test_missing_attachment() {
        let err = compose(&mail_with(vec!["/nonexistent/file".into()]), "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Attachment { .. }));
    }

    #[tokio::test]
    async fn test_send_to_server() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let delivery = Arc::new(Delivery::new(Store::from_config(&config), &config.hostname));

        let original: Vec<u8> = (0..=255u8).collect();
        let path = tmp.path().join("image.png");
        std::fs::write(&path, &original).unwrap();

        let (client, stream) = tokio::io::duplex(64 * 1024);
        let worker = tokio::spawn(Server::new(&config, delivery, stream, "test").serve());

        send(client, "localhost", &mail_with(vec![path])).await.unwrap();
        worker.await.unwrap().unwrap();

        let saved: Vec<PathBuf> = std::fs::read_dir(tmp.path().join("attachments"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].to_string_lossy().ends_with("_0_image.png"));
        assert_eq!(std::fs::read(&saved[0]).unwrap(), original);
    }

    #[tokio::test]
    async fn test_send_over_tcp() {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(test_config(&tmp));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_loop = tokio::spawn(server::run(listener, config));

        send_to(addr, "localhost", &mail_with(Vec::new()))
            .await
            .unwrap();
        accept_loop.abort();

        let records = std::fs::read_dir(tmp.path().join("emails")).unwrap().count();
        assert_eq!(records, 1);
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let (client, server) = tokio::io::duplex(4096);
        let fake = tokio::spawn(async move {
            let (reader, mut writer) = tokio::io::split(server);
            let mut reader = BufReader::new(reader);
            writer.write_all(b"220 ready\r\n").await.unwrap();

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            writer
                .write_all(b"250-fake\r\n250 HELP\r\n")
                .await
                .unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            writer.write_all(b"550 no thanks\r\n").await.unwrap();
        });

        let err = send(client, "localhost", &mail_with(Vec::new()))
            .await
            .unwrap_err();
        fake.await.unwrap();

        match err {
            ClientError::Rejected { command, code, text } => {
                assert_eq!(command, "MAIL FROM:<sender@example.com>");
                assert_eq!(code, 550);
                assert_eq!(text, "no thanks");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
