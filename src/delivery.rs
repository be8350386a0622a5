use std::path::PathBuf;

use chrono::Local;

use crate::{
    message::{
        decompose::{decompose, Reception},
        mime,
    },
    smtp::response::Response,
    storage::Store,
    Mail,
};

/// What happened to one delivered message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub record: Option<PathBuf>,
    pub attachments: Vec<PathBuf>,
}

/// Turns completed transfers into stored records and attachments.
#[derive(Debug, Clone)]
pub struct Delivery {
    store: Store,
    hostname: String,
}

impl Delivery {
    pub fn new(store: Store, hostname: impl AsRef<str>) -> Self {
        Self {
            store,
            hostname: hostname.as_ref().to_string(),
        }
    }

    /// Store `mail` and extract its attachments.
    ///
    /// Returns the response for the end of DATA: 250 normally, 451 if the
    /// payload could not be parsed or the record could not be written.
    /// Attachment problems are logged only.
    pub async fn deliver(&self, mail: Mail, peer: &str) -> (Response, Outcome) {
        let reception = Reception {
            hostname: &self.hostname,
            peer,
            at: Local::now(),
        };
        let decomposed = decompose(&mail, &reception);
        let mut outcome = Outcome::default();

        match self.store.write_record(&reception.at, &decomposed.record).await {
            Ok(path) => {
                tracing::info!("Message record saved to {:?}", path);
                outcome.record = Some(path);
            }
            Err(e) => {
                tracing::error!("Failed to store message from {}: {}", peer, e);
                return (Response::processing_error(), outcome);
            }
        }

        let summary = &decomposed.summary;
        tracing::info!(
            "Received mail from {} to {} (Subject: {:?})",
            summary.from,
            summary.to.join(", "),
            summary.subject
        );

        match &decomposed.message {
            Some(message) if mime::is_multipart(message) => {
                match mime::extract_attachments(message, &self.store, &reception.at).await {
                    Ok(paths) => outcome.attachments = paths,
                    Err(e) => tracing::warn!("Attachment extraction stopped: {}", e),
                }
            }
            _ => tracing::debug!("Message body: {}", String::from_utf8_lossy(&mail.data)),
        }

        let response = match decomposed.parse_error {
            Some(_) => Response::processing_error(),
            None => Response::accepted(),
        };
        (response, outcome)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn delivery(tmp: &TempDir) -> Delivery {
        Delivery::new(
            Store::new(tmp.path().join("emails"), tmp.path().join("attachments")),
            "mx.local",
        )
    }

    #[tokio::test]
    async fn test_plain_message() {
        let tmp = TempDir::new().unwrap();
        let mail = Mail {
            from: Some("a@x.com".into()),
            to: vec!["b@y.com".into()],
            data: b"Subject: plain\r\n\r\nline one\r\nline two\r\n".to_vec(),
        };

        let (response, outcome) = delivery(&tmp).deliver(mail, "10.0.0.1:5000").await;
        assert_eq!(response.code, 250);
        assert!(outcome.attachments.is_empty());

        let record = std::fs::read(outcome.record.unwrap()).unwrap();
        assert!(record.starts_with(b"Received: from 10.0.0.1:5000 by mx.local"));
        assert!(record.ends_with(b"\r\nline one\r\nline two\r\n"));
        assert!(!tmp.path().join("attachments").exists());
    }

    #[tokio::test]
    async fn test_unparseable_payload_still_stored() {
        let tmp = TempDir::new().unwrap();

        let (response, outcome) = delivery(&tmp).deliver(Mail::default(), "peer").await;
        assert_eq!(response.code, 451);
        assert!(outcome.record.is_some());
    }

    #[tokio::test]
    async fn test_missing_boundary_does_not_fail_delivery() {
        let tmp = TempDir::new().unwrap();
        let mail = Mail {
            data: b"Content-Type: multipart/mixed\r\n\r\n--x\r\n\r\nhi\r\n--x--\r\n".to_vec(),
            ..Default::default()
        };

        let (response, outcome) = delivery(&tmp).deliver(mail, "peer").await;
        assert_eq!(response.code, 250);
        assert!(outcome.record.is_some());
        assert!(outcome.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_store() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let delivery = Delivery::new(Store::new(blocker.join("emails"), blocker.join("a")), "mx");

        let (response, outcome) = delivery.deliver(Mail::default(), "peer").await;
        assert_eq!(response.code, 451);
        assert_eq!(outcome, Outcome::default());
    }

    #[tokio::test]
    async fn test_attachment_write_failure_keeps_reply() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("attachments");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let delivery = Delivery::new(Store::new(tmp.path().join("emails"), &blocker), "mx");
        let mail = Mail {
            data: b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=data.bin\r\n\
\r\n\
payload\r\n\
--b--\r\n"
                .to_vec(),
            ..Default::default()
        };

        let (response, outcome) = delivery.deliver(mail, "peer").await;
        assert_eq!(response.code, 250);
        assert!(outcome.record.is_some());
        assert!(outcome.attachments.is_empty());
        assert!(blocker.is_file());
    }
}
