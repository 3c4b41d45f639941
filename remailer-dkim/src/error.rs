use std::io;

use remailer_common::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DkimError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Key directory {path} is not usable: {reason}")]
    InvalidDirectory { path: String, reason: &'static str },

    #[error("Unable to read key file {path}: {source}")]
    KeyFile { path: String, source: io::Error },

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("Invalid PKCS#1 key: {0}")]
    Pkcs1(#[from] rsa::pkcs1::Error),

    #[error("Invalid PKCS#8 key: {0}")]
    Pkcs8(#[from] rsa::pkcs8::Error),

    #[error("Invalid PEM: {0}")]
    Pem(#[from] pem::PemError),

    #[error("Unexpected PEM block {found}, expected {expected}")]
    PemTag {
        expected: &'static str,
        found: String,
    },

    #[error("Invalid Ed25519 key length {0}")]
    Ed25519Length(usize),

    #[error("Unsupported hash algorithm {0}, only sha256 is supported")]
    UnsupportedHash(String),

    #[error("Selector {0} must sign the From header")]
    MissingFrom(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl DkimError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Signing(_) => ErrorKind::MailProcessing,
            Self::Io(_) => ErrorKind::Io,
            _ => ErrorKind::DkimConfig,
        }
    }
}

pub type Result<T> = std::result::Result<T, DkimError>;
