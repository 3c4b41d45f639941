use async_trait::async_trait;
use remailer_common::{FileStatus, Mail};
use remailer_spool::FileUnit;

use super::Transformer;
use crate::{Result, stage::Stage};

/// Reads the whole body file into `mail.body`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Body;

impl Body {
    pub const NAME: &'static str = "body";
}

impl Stage for Body {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[async_trait]
impl Transformer for Body {
    async fn transform(&self, unit: &mut FileUnit, mut mail: Mail) -> Result<Mail> {
        mail.body = unit.read_body().await?;
        unit.set_status(FileStatus::BodyRead).await?;
        Ok(mail)
    }
}
