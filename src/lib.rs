pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod message;
pub mod smtp;
pub mod storage;

/// A completed mail transaction, handed from the SMTP session to delivery.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Mail {
    pub from: Option<String>,
    pub to: Vec<String>,
    /// Everything received between `DATA` and the terminating `.` line,
    /// line terminators included.
    pub data: Vec<u8>,
}
