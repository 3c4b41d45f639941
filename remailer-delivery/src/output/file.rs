//! CSV delivery log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use remailer_common::Mail;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

use super::{Output, OutputError};
use crate::{Errors, Responses};

const HEADER: [&str; 3] = ["msg_id", "status", "error"];

/// How log files are split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Naming {
    #[default]
    PerDate,
    PerHour,
    PerQuarterHour,
    PerMailId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileArgs {
    /// Directory the CSV files are written to.
    pub path: PathBuf,

    #[serde(default)]
    pub naming: Naming,
}

#[derive(Debug)]
pub struct FileOutput {
    dir: PathBuf,
    naming: Naming,
    lock: Mutex<()>,
}

impl FileOutput {
    pub const NAME: &'static str = "file";

    pub fn new(args: FileArgs) -> Self {
        Self {
            dir: args.path,
            naming: args.naming,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, mail: &Mail, now: DateTime<Utc>) -> String {
        match self.naming {
            Naming::PerDate => now.format("%Y-%m-%d.csv").to_string(),
            Naming::PerHour => now.format("%Y-%m-%d-%H.csv").to_string(),
            Naming::PerQuarterHour => format!(
                "{}-{:02}.csv",
                now.format("%Y-%m-%d-%H"),
                now.minute() / 15 * 15
            ),
            Naming::PerMailId => format!("{}.csv", mail.id),
        }
    }

    /// Rows for one mail: one per reply, plus one per recipient that failed
    /// without getting any reply.
    pub fn rows(mail: &Mail, responses: &Responses, errors: &Errors) -> Vec<[String; 3]> {
        let mut rows = Vec::new();

        for (rcpt, replies) in responses {
            let error = errors.get(rcpt).map(ToString::to_string);
            for reply in replies {
                let text = match &error {
                    Some(error) => error.clone(),
                    None if reply.is_success() => String::new(),
                    None => reply.to_string(),
                };
                rows.push([mail.id.clone(), reply.code.to_string(), text]);
            }
        }

        for (rcpt, error) in errors {
            if responses.get(rcpt).is_none_or(Vec::is_empty) {
                rows.push([mail.id.clone(), String::new(), error.to_string()]);
            }
        }

        rows
    }

    async fn append(&self, path: &Path, rows: &[[String; 3]]) -> Result<(), OutputError> {
        let io_error = |source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        };

        let _guard = self.lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_error)?;
        let created = file.metadata().await.map_err(io_error)?.len() == 0;

        let mut writer = csv::Writer::from_writer(Vec::new());
        if created {
            writer.write_record(HEADER)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        let buffer = writer
            .into_inner()
            .map_err(|err| io_error(err.into_error()))?;

        file.write_all(&buffer).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)
    }
}

#[async_trait]
impl Output for FileOutput {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn write(
        &self,
        mail: &Mail,
        responses: &Responses,
        errors: &Errors,
    ) -> Result<(), OutputError> {
        let rows = Self::rows(mail, responses, errors);
        if rows.is_empty() {
            return Ok(());
        }

        let path = self.dir.join(self.file_name(mail, Utc::now()));
        self.append(&path, &rows).await
    }
}
