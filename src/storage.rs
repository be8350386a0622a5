use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};

use crate::{config::Config, error::PersistenceError};

/// Flat-directory storage for message records and attachments.
///
/// Files are only ever created, never overwritten: a name that already
/// exists gets a numeric suffix.
#[derive(Debug, Clone)]
pub struct Store {
    message_dir: PathBuf,
    attachment_dir: PathBuf,
}

impl Store {
    pub fn new(message_dir: impl Into<PathBuf>, attachment_dir: impl Into<PathBuf>) -> Self {
        Self {
            message_dir: message_dir.into(),
            attachment_dir: attachment_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.message_dir, &config.attachment_dir)
    }

    /// Store a message record as `email_<nanos>.eml`.
    pub async fn write_record(
        &self,
        received_at: &DateTime<Local>,
        record: &[u8],
    ) -> Result<PathBuf, PersistenceError> {
        let name = format!(
            "email_{}.eml",
            received_at.timestamp_nanos_opt().unwrap_or_default()
        );
        create_unique(&self.message_dir, &name, record).await
    }

    /// Store attachment bytes as `<YYYYmmdd_HHMMSS>_<index>_<filename>`.
    pub async fn write_attachment(
        &self,
        received_at: &DateTime<Local>,
        index: usize,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, PersistenceError> {
        let name = format!(
            "{}_{}_{}",
            received_at.format("%Y%m%d_%H%M%S"),
            index,
            filename
        );
        create_unique(&self.attachment_dir, &name, content).await
    }
}

async fn create_unique(
    dir: &Path,
    name: &str,
    content: &[u8],
) -> Result<PathBuf, PersistenceError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| PersistenceError {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut attempt = 0;
    loop {
        let path = dir.join(candidate(name, attempt));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        let file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                attempt += 1;
                continue;
            }
            Err(source) => return Err(PersistenceError { path, source }),
        };

        return fill(file, path, content).await;
    }
}

/// Write `content` to the freshly created `path`, removing it again if the
/// write fails part way.
async fn fill<W: AsyncWrite + Unpin>(
    mut file: W,
    path: PathBuf,
    content: &[u8],
) -> Result<PathBuf, PersistenceError> {
    let written = async {
        file.write_all(content).await?;
        file.flush().await
    }
    .await;
    drop(file);

    match written {
        Ok(()) => Ok(path),
        Err(source) => {
            fs::remove_file(&path).await.ok();
            Err(PersistenceError { path, source })
        }
    }
}

/// `name` for the first attempt, then `stem-N.ext`.
fn candidate(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{attempt}.{ext}"),
        _ => format!("{name}-{attempt}"),
    }
}
