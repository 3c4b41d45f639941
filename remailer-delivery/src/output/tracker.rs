use std::sync::Arc;

use async_trait::async_trait;
use remailer_common::{FileStatus, Mail};
use remailer_spool::Tracker;

use super::{Output, OutputError};
use crate::{Errors, Responses};

/// Marks the unit DONE in the read tracker.
#[derive(Debug)]
pub struct TrackerOutput {
    tracker: Arc<Tracker>,
}

impl TrackerOutput {
    pub const NAME: &'static str = "tracker";

    pub const fn new(tracker: Arc<Tracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Output for TrackerOutput {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn sets_done(&self) -> bool {
        true
    }

    async fn write(&self, mail: &Mail, _: &Responses, _: &Errors) -> Result<(), OutputError> {
        self.tracker.upsert_status(&mail.id, FileStatus::Done).await?;
        Ok(())
    }
}
