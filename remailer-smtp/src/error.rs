//! Error types for the SMTP client.

use std::io;

use remailer_common::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server sent something that is not an SMTP reply.
    #[error("Failed to parse SMTP response: {0}")]
    Parse(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

impl ClientError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } | Self::Tls(_) => ErrorKind::SmtpConnection,
            Self::Io(_) | Self::Parse(_) | Self::ConnectionClosed => ErrorKind::MailDelivery,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
