use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Lifecycle of a spool file pair.
///
/// The integer codes are what the tracker store persists, so they must stay
/// stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i64)]
pub enum FileStatus {
    #[default]
    Init = 0,
    Processing = 1,
    BodyRead = 2,
    HeadersRead = 3,
    HeadersParse = 4,
    MailProcess = 5,
    Delivered = 6,
    Done = 7,
    Error = 8,
}

impl FileStatus {
    pub const fn code(self) -> i64 {
        self as i64
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Init,
            1 => Self::Processing,
            2 => Self::BodyRead,
            3 => Self::HeadersRead,
            4 => Self::HeadersParse,
            5 => Self::MailProcess,
            6 => Self::Delivered,
            7 => Self::Done,
            8 => Self::Error,
            _ => return None,
        })
    }

    /// Statuses that prevent another worker from claiming the file: every
    /// in-flight or terminal status. Only INIT is claimable.
    pub const fn blocks_claim(self) -> bool {
        !matches!(self, Self::Init)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Processing => "PROCESSING",
            Self::BodyRead => "BODY_READ",
            Self::HeadersRead => "HEADERS_READ",
            Self::HeadersParse => "HEADERS_PARSE",
            Self::MailProcess => "MAIL_PROCESS",
            Self::Delivered => "DELIVERED",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
