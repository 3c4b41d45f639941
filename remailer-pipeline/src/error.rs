use remailer_common::{ErrorKind, address_parser::AddressError};
use remailer_dkim::DkimError;
use remailer_spool::{SpoolError, TrackerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown {stage} type: {name}")]
    UnknownStage { stage: &'static str, name: String },

    #[error("Invalid arguments for {name}: {source}")]
    InvalidArgs {
        name: &'static str,
        source: serde_yaml::Error,
    },

    #[error("Mail validation failed: {0}")]
    MailValidation(String),

    #[error("Invalid {field} address: {source}")]
    Address {
        field: &'static str,
        source: AddressError,
    },

    #[error("Mail processing failed: {0}")]
    MailProcessing(String),

    #[error(transparent)]
    Spool(#[from] SpoolError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("DKIM error: {0}")]
    Dkim(#[from] DkimError),
}

impl PipelineError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownStage { .. } | Self::InvalidArgs { .. } => ErrorKind::Config,
            Self::MailValidation(_) | Self::Address { .. } => ErrorKind::MailValidation,
            Self::MailProcessing(_) => ErrorKind::MailProcessing,
            Self::Spool(err) => err.kind(),
            Self::Tracker(err) => err.kind(),
            Self::Dkim(err) => err.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let unknown = PipelineError::UnknownStage {
            stage: "processor",
            name: "rot13".to_string(),
        };
        assert_eq!(unknown.kind(), ErrorKind::Config);
        assert_eq!(unknown.to_string(), "Unknown processor type: rot13");

        assert_eq!(
            PipelineError::MailValidation("no From".to_string()).kind(),
            ErrorKind::MailValidation
        );
        assert_eq!(
            PipelineError::Dkim(DkimError::Signing("bad".to_string())).kind(),
            ErrorKind::MailProcessing
        );
        assert_eq!(
            PipelineError::Dkim(DkimError::UnsupportedHash("sha1".to_string())).kind(),
            ErrorKind::DkimConfig
        );
    }
}
