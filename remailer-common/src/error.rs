//! Error taxonomy shared across crates.
//!
//! Each crate keeps its own `thiserror` enum; [`ErrorKind`] is the coarse
//! classification they all map onto so the supervisor and the output sinks can
//! reason about failures without knowing every concrete type.

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration field.
    Config,
    /// Required header missing or unparseable address.
    MailValidation,
    /// A pipeline step failed.
    MailProcessing,
    /// SMTP session error after connecting.
    MailDelivery,
    /// Dial failure or TLS handshake failure.
    SmtpConnection,
    /// The resolver errored.
    DnsLookup,
    /// The resolver answered with no usable MX hosts.
    MxRecord,
    /// Selector or key could not be loaded.
    DkimConfig,
    /// Filesystem or tracker store failure.
    Io,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::MailValidation => "mail-validation",
            Self::MailProcessing => "mail-processing",
            Self::MailDelivery => "mail-delivery",
            Self::SmtpConnection => "smtp-connection",
            Self::DnsLookup => "dns-lookup",
            Self::MxRecord => "mx-record",
            Self::DkimConfig => "dkim-config",
            Self::Io => "io",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
