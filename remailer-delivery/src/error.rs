use std::time::Duration;

use remailer_common::ErrorKind;
use remailer_smtp::{ClientError, Response};
use thiserror::Error;

use crate::{dialer::DialError, dns::DnsError};

/// Why a recipient did not get its message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Dial(#[from] DialError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("Server rejected {step}: {response}")]
    Rejected {
        step: &'static str,
        response: Response,
    },

    #[error("Mail has no sender address")]
    MissingSender,

    #[error("No usable MX host for {0}")]
    NoHost(String),
}

impl DeliveryError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Dns(err) => err.kind(),
            Self::Dial(_) => ErrorKind::SmtpConnection,
            Self::Client(err) => err.kind(),
            Self::Timeout { .. } | Self::Rejected { .. } => ErrorKind::MailDelivery,
            Self::MissingSender => ErrorKind::MailValidation,
            Self::NoHost(_) => ErrorKind::MxRecord,
        }
    }

    /// The server reply behind a rejection, if any.
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Rejected { response, .. } => Some(response),
            _ => None,
        }
    }
}
