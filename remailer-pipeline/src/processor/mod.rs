//! Processors rewrite an assembled [`Mail`] in place until `final_body` is
//! ready to send.

mod body;
mod dkim;
mod headers;

use remailer_common::Mail;

pub use self::{
    body::{Body, UnixDos},
    dkim::Dkim,
    headers::{BodyHeaders, MergeBody, MergeHeaders},
};
use crate::{
    Result,
    stage::{Registry, Stage, StageConfig},
};

pub trait Processor: Stage {
    fn process(&self, mail: &mut Mail) -> Result<()>;
}

/// Registry of the built-in processors.
pub fn registry() -> Registry<dyn Processor> {
    let mut registry: Registry<dyn Processor> = Registry::new("processor");
    registry.register(UnixDos::NAME, || Box::new(UnixDos));
    registry.register(Body::NAME, || Box::new(Body));
    registry.register(BodyHeaders::NAME, || Box::new(BodyHeaders::default()));
    registry.register(MergeHeaders::NAME, || Box::new(MergeHeaders));
    registry.register(Dkim::NAME, || Box::new(Dkim::default()));
    registry.register(MergeBody::NAME, || Box::new(MergeBody));
    registry
}

/// The canonical chain, without signing.
pub fn default_configs() -> Vec<StageConfig> {
    [
        UnixDos::NAME,
        Body::NAME,
        BodyHeaders::NAME,
        MergeHeaders::NAME,
        MergeBody::NAME,
    ]
    .into_iter()
    .zip(0..)
    .map(|(name, index)| StageConfig::new(name, index))
    .collect()
}

/// Ordered processors, run one after another on each mail.
#[derive(Debug)]
pub struct ProcessorChain {
    stages: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    pub fn from_config(configs: &[StageConfig]) -> Result<Self> {
        Ok(Self {
            stages: registry().build(configs)?,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every processor on `mail`, stopping at the first failure.
    pub fn run(&self, mail: &mut Mail) -> Result<()> {
        for stage in &self.stages {
            tracing::trace!(unit = %mail.id, stage = stage.name(), "Processing");
            stage.process(mail)?;
        }

        Ok(())
    }
}
