use std::{path::PathBuf, sync::Arc};

use remailer_common::FileStatus;
use tokio::{fs::File, io::AsyncReadExt};

use crate::{SpoolError, Tracker, TrackerError};

/// Paths of one `df`/`qf` pair as observed by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolPair {
    pub id: String,
    pub body_path: PathBuf,
    pub control_path: PathBuf,
}

/// A claimed spool pair.
///
/// Held by exactly one worker between claim and a terminal status. The file
/// streams are opened when the unit is handed out and consumed by the first
/// read.
#[derive(Debug)]
pub struct FileUnit {
    pub id: String,
    pub body_path: PathBuf,
    pub control_path: PathBuf,
    body: Option<File>,
    control: Option<File>,
    status: FileStatus,
    tracker: Option<Arc<Tracker>>,
}

impl FileUnit {
    pub fn new(pair: SpoolPair) -> Self {
        Self {
            id: pair.id,
            body_path: pair.body_path,
            control_path: pair.control_path,
            body: None,
            control: None,
            status: FileStatus::Init,
            tracker: None,
        }
    }

    /// Publish every later status change to `tracker`.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<Tracker>, status: FileStatus) -> Self {
        self.tracker = Some(tracker);
        self.status = status;
        self
    }

    /// Open both files of the pair.
    pub async fn open(&mut self) -> std::io::Result<()> {
        self.body = Some(File::open(&self.body_path).await?);
        self.control = Some(File::open(&self.control_path).await?);
        Ok(())
    }

    pub async fn read_body(&mut self) -> Result<Vec<u8>, SpoolError> {
        let file = match self.body.take() {
            Some(file) => file,
            None => File::open(&self.body_path).await?,
        };
        read_all(file).await
    }

    pub async fn read_control(&mut self) -> Result<Vec<u8>, SpoolError> {
        let file = match self.control.take() {
            Some(file) => file,
            None => File::open(&self.control_path).await?,
        };
        read_all(file).await
    }

    pub const fn status(&self) -> FileStatus {
        self.status
    }

    /// Record `status` locally and, when attached, in the tracker.
    pub async fn set_status(&mut self, status: FileStatus) -> Result<(), TrackerError> {
        self.status = status;
        if let Some(tracker) = &self.tracker {
            tracker.upsert_status(&self.id, status).await?;
        }
        Ok(())
    }
}

async fn read_all(mut file: File) -> Result<Vec<u8>, SpoolError> {
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    Ok(buf)
}
