//! Transformers build a [`Mail`] out of a claimed spool unit.

mod body;
mod fields;
mod headers;

use async_trait::async_trait;
use remailer_common::Mail;
use remailer_spool::FileUnit;

pub use self::{
    body::Body,
    fields::{
        AddressMode, HeaderContentType, HeaderFrom, HeaderMessageId, HeaderSubject, HeaderTo,
        MessageIdMode,
    },
    headers::Headers,
};
use crate::{
    Result,
    stage::{Registry, Stage, StageConfig},
};

#[async_trait]
pub trait Transformer: Stage {
    async fn transform(&self, unit: &mut FileUnit, mail: Mail) -> Result<Mail>;
}

/// Registry of the built-in transformers.
pub fn registry() -> Registry<dyn Transformer> {
    let mut registry: Registry<dyn Transformer> = Registry::new("transformer");
    registry.register(Headers::NAME, || Box::new(Headers::default()));
    registry.register(HeaderFrom::NAME, || Box::new(HeaderFrom::default()));
    registry.register(HeaderTo::NAME, || Box::new(HeaderTo::default()));
    registry.register(HeaderSubject::NAME, || Box::new(HeaderSubject::default()));
    registry.register(HeaderContentType::NAME, || Box::new(HeaderContentType::default()));
    registry.register(HeaderMessageId::NAME, || Box::new(HeaderMessageId::default()));
    registry.register(Body::NAME, || Box::new(Body));
    registry
}

/// The chain used when no `file-mails` are configured: sendmail style `H??`
/// control files, followed by every field extractor.
pub fn default_configs() -> Vec<StageConfig> {
    let mut headers = StageConfig::new(Headers::NAME, 0);
    headers.default_arg("prefix", "H??");

    vec![
        headers,
        StageConfig::new(Body::NAME, 1),
        StageConfig::new(HeaderFrom::NAME, 2),
        StageConfig::new(HeaderTo::NAME, 3),
        StageConfig::new(HeaderSubject::NAME, 4),
        StageConfig::new(HeaderContentType::NAME, 5),
        StageConfig::new(HeaderMessageId::NAME, 6),
    ]
}

/// Feed the read-file `from-type` and `default-from` settings to every
/// `header_from` stage that does not set them itself.
pub fn apply_from_defaults(
    configs: &mut [StageConfig],
    from_type: Option<&str>,
    default_from: Option<&str>,
) {
    for config in configs.iter_mut().filter(|config| config.kind == HeaderFrom::NAME) {
        if let Some(from_type) = from_type {
            config.default_arg("mode", from_type);
        }
        if let Some(default_from) = default_from {
            config.default_arg("default", default_from);
        }
    }
}

/// Ordered transformers, run one after another on each unit.
#[derive(Debug)]
pub struct TransformerChain {
    stages: Vec<Box<dyn Transformer>>,
}

impl TransformerChain {
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

    /// Build the mail for `unit`, stopping at the first failing stage.
    pub async fn run(&self, unit: &mut FileUnit) -> Result<Mail> {
        let mut mail = Mail::new(unit.id.clone());

        for stage in &self.stages {
            tracing::trace!(unit = %unit.id, stage = stage.name(), "Transforming");
            mail = stage.transform(unit, mail).await?;
        }

        Ok(mail)
    }
}
