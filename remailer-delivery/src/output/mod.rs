//! Where delivery outcomes go.
//!
//! Sinks are built from `{type, args}` entries in configuration order and run
//! one after another for every delivered mail. A failing sink does not stop
//! the others.

mod file;
mod tracker;

use std::{fmt::Debug, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use remailer_common::{ErrorKind, Mail};
use remailer_spool::{Tracker, TrackerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::{FileArgs, FileOutput, Naming};
pub use tracker::TrackerOutput;

use crate::{Errors, Responses};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output configuration error: {0}")]
    Config(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl OutputError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Io { .. } | Self::Csv(_) | Self::Tracker(_) => ErrorKind::Io,
        }
    }
}

#[async_trait]
pub trait Output: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Whether this sink moves the unit to DONE itself.
    fn sets_done(&self) -> bool {
        false
    }

    async fn write(
        &self,
        mail: &Mail,
        responses: &Responses,
        errors: &Errors,
    ) -> Result<(), OutputError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub args: serde_yaml::Value,
}

/// Build the sink named by `config.kind`.
///
/// # Errors
///
/// Returns `OutputError::Config` for an unknown type or bad arguments.
pub fn build(config: &OutputConfig, tracker: &Arc<Tracker>) -> Result<Box<dyn Output>, OutputError> {
    match config.kind.as_str() {
        FileOutput::NAME => {
            let args: FileArgs = serde_yaml::from_value(config.args.clone()).map_err(|err| {
                OutputError::Config(format!("Invalid args for {} output: {err}", FileOutput::NAME))
            })?;
            Ok(Box::new(FileOutput::new(args)))
        }
        TrackerOutput::NAME => Ok(Box::new(TrackerOutput::new(Arc::clone(tracker)))),
        other => Err(OutputError::Config(format!("Unknown output type '{other}'"))),
    }
}

#[derive(Debug, Default)]
pub struct OutputChain {
    outputs: Vec<Box<dyn Output>>,
}

impl OutputChain {
    /// # Errors
    ///
    /// Returns the first sink that cannot be built.
    pub fn from_config(configs: &[OutputConfig], tracker: &Arc<Tracker>) -> Result<Self, OutputError> {
        let outputs = configs
            .iter()
            .map(|config| build(config, tracker))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { outputs })
    }

    pub fn push(&mut self, output: Box<dyn Output>) {
        self.outputs.push(output);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.outputs.iter().map(|output| output.name()).collect()
    }

    /// Whether some sink already moves units to DONE.
    pub fn sets_done(&self) -> bool {
        self.outputs.iter().any(|output| output.sets_done())
    }

    /// Run every sink, returning the errors of the ones that failed.
    pub async fn write(&self, mail: &Mail, responses: &Responses, errors: &Errors) -> Vec<OutputError> {
        let mut failures = Vec::new();
        for output in &self.outputs {
            if let Err(err) = output.write(mail, responses, errors).await {
                tracing::warn!(unit = %mail.id, output = output.name(), error = %err, "Output failed");
                failures.push(err);
            }
        }
        failures
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn configs(yaml: &str) -> Vec<OutputConfig> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn builds_in_configuration_order() {
        let tracker = Arc::new(Tracker::memory());
        let chain = OutputChain::from_config(
            &configs("- type: tracker\n- type: file\n  args:\n    path: /tmp\n    naming: per-hour\n"),
            &tracker,
        )
        .unwrap();

        assert_eq!(chain.names(), vec!["tracker", "file"]);
        assert!(chain.sets_done());
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let tracker = Arc::new(Tracker::memory());
        let err = OutputChain::from_config(&configs("- type: kafka\n"), &tracker).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "Output configuration error: Unknown output type 'kafka'");
    }

    #[test]
    fn file_output_needs_a_path() {
        let tracker = Arc::new(Tracker::memory());
        let err = OutputChain::from_config(&configs("- type: file\n"), &tracker).unwrap_err();
        assert!(matches!(err, OutputError::Config(_)));
    }
}
