//! Shared plumbing for transformer and processor chains.
//!
//! Both chains are described in configuration as a list of
//! `{type, index, args}` entries. A [`Registry`] maps each `type` to a
//! constructor, every instance is initialised with its `args`, and the
//! resulting stages run in ascending `index` order.

use std::fmt::Debug;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_yaml::Value;

use crate::{PipelineError, Result};

/// Configuration entry for one stage of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub args: Value,
}

impl StageConfig {
    pub fn new(kind: impl Into<String>, index: i64) -> Self {
        Self {
            kind: kind.into(),
            index,
            args: Value::Null,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// Set `key` in `args` unless it is already present.
    pub fn default_arg(&mut self, key: &str, value: impl Into<Value>) {
        if self.args.is_null() {
            self.args = Value::Mapping(serde_yaml::Mapping::new());
        }

        if let Value::Mapping(args) = &mut self.args {
            let key = Value::String(key.to_string());
            if !args.contains_key(&key) {
                args.insert(key, value.into());
            }
        }
    }
}

/// Behaviour common to every stage.
pub trait Stage: Send + Sync + Debug {
    /// The registered type name.
    fn name(&self) -> &'static str;

    /// Apply the stage's configuration. Called once, before the first run.
    fn init(&mut self, _args: &Value) -> Result<()> {
        Ok(())
    }
}

/// Deserialize stage arguments, treating absent arguments as the defaults.
pub fn parse_args<T: DeserializeOwned + Default>(name: &'static str, args: &Value) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }

    serde_yaml::from_value(args.clone())
        .map_err(|source| PipelineError::InvalidArgs { name, source })
}

type Constructor<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

/// Type name to constructor mapping.
pub struct Registry<T: ?Sized> {
    stage: &'static str,
    constructors: Vec<(&'static str, Constructor<T>)>,
}

impl<T: ?Sized> Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("stage", &self.stage)
            .field("types", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: ?Sized + Stage> Registry<T> {
    pub const fn new(stage: &'static str) -> Self {
        Self {
            stage,
            constructors: Vec::new(),
        }
    }

    /// Register `name`, replacing any earlier constructor of the same name.
    pub fn register(
        &mut self,
        name: &'static str,
        constructor: impl Fn() -> Box<T> + Send + Sync + 'static,
    ) {
        self.constructors.retain(|(existing, _)| *existing != name);
        self.constructors.push((name, Box::new(constructor)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.iter().any(|(existing, _)| *existing == name)
    }

    /// Instantiate, initialise and order the configured stages.
    ///
    /// Stages are sorted by `index`; equal indices keep configuration order.
    pub fn build(&self, configs: &[StageConfig]) -> Result<Vec<Box<T>>> {
        let mut stages = Vec::with_capacity(configs.len());

        for config in configs {
            let Some((_, constructor)) = self
                .constructors
                .iter()
                .find(|(name, _)| *name == config.kind)
            else {
                return Err(PipelineError::UnknownStage {
                    stage: self.stage,
                    name: config.kind.clone(),
                });
            };

            let mut stage = constructor();
            stage.init(&config.args)?;
            tracing::debug!(
                stage = self.stage,
                name = %config.kind,
                index = config.index,
                "Initialised stage"
            );
            stages.push((config.index, stage));
        }

        stages.sort_by_key(|(index, _)| *index);
        Ok(stages.into_iter().map(|(_, stage)| stage).collect())
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.iter().map(|(name, _)| *name)
    }
}
