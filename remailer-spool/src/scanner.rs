use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use remailer_common::{FileStatus, lifecycle};
use tokio::sync::Mutex;

use crate::{FileUnit, Result, SkipReason, SpoolError, SpoolPair, Tracker, ValidationError};

const BODY_PREFIX: &str = "df";
const CONTROL_PREFIX: &str = "qf";

const SYSTEM_PREFIXES: [&str; 9] = [
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/sys",
    "/proc",
    "/dev",
];

#[derive(Debug, Default)]
struct ScanState {
    files: Vec<SpoolPair>,
    index: usize,
}

/// Lists `df`/`qf` pairs in a spool directory and hands them out to workers.
///
/// The unit list and cursor live behind one mutex, so `refresh_list` and
/// `read_next_file` may be called from any number of tasks.
#[derive(Debug)]
pub struct Scanner {
    in_path: PathBuf,
    tracker: Arc<Tracker>,
    state: Mutex<ScanState>,
}

impl Scanner {
    /// Validate `in_path` and create a scanner over it.
    ///
    /// # Errors
    /// The path must exist, be a directory, contain no `..` and sit outside
    /// the system directories.
    pub fn new(in_path: impl AsRef<Path>, tracker: Arc<Tracker>) -> Result<Self> {
        let in_path = validate(in_path.as_ref())?;

        Ok(Self {
            in_path,
            tracker,
            state: Mutex::default(),
        })
    }

    pub fn in_path(&self) -> &Path {
        &self.in_path
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Re-list the spool directory, replacing the unit list and rewinding
    /// the cursor. Returns the number of pairs found.
    pub async fn refresh_list(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.in_path).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(id) = name.strip_prefix(BODY_PREFIX) else {
                continue;
            };
            if entry.file_type().await?.is_dir() {
                continue;
            }

            let control_path = self.in_path.join(format!("{CONTROL_PREFIX}{id}"));
            match tokio::fs::metadata(&control_path).await {
                Ok(metadata) if metadata.is_file() => files.push(SpoolPair {
                    id: id.to_string(),
                    body_path: entry.path(),
                    control_path,
                }),
                _ => {
                    tracing::debug!(unit = %id, "No control file, ignoring body file");
                }
            }
        }

        let count = files.len();
        let mut state = self.state.lock().await;
        state.files = files;
        state.index = 0;
        drop(state);

        if count == 0 {
            return Err(SpoolError::NoFilesFound);
        }

        lifecycle!("Found {count} spool pairs in {}", self.in_path.display());
        Ok(count)
    }

    /// Hand out the next unit from the last listing.
    ///
    /// # Errors
    /// [`SpoolError::Exhausted`] once every unit has been handed out, and
    /// [`SpoolError::Skip`] for a unit another worker owns or that cannot be
    /// opened. A claimed unit that cannot be opened is marked ERROR. Callers
    /// keep reading after a skip.
    pub async fn read_next_file(&self) -> Result<FileUnit> {
        let pair = {
            let mut state = self.state.lock().await;
            let Some(pair) = state.files.get(state.index).cloned() else {
                return Err(SpoolError::Exhausted);
            };
            state.index += 1;

            let status = match self.tracker.get_status(&pair.id).await {
                Ok(status) => status,
                Err(err) if err.is_not_found() => FileStatus::Init,
                Err(err) => return Err(err.into()),
            };
            drop(state);

            if status.blocks_claim() {
                return Err(SpoolError::Skip {
                    id: pair.id,
                    reason: SkipReason::Status(status),
                });
            }

            pair
        };

        if !self.tracker.claim(&pair.id).await? {
            return Err(SpoolError::Skip {
                id: pair.id,
                reason: SkipReason::ClaimLost,
            });
        }

        let mut unit =
            FileUnit::new(pair).with_tracker(self.tracker.clone(), FileStatus::Processing);
        if let Err(err) = unit.open().await {
            tracing::warn!(unit = %unit.id, error = %err, "Failed to open claimed spool unit");
            self.tracker
                .upsert_status(&unit.id, FileStatus::Error)
                .await?;

            let reason = if err.kind() == std::io::ErrorKind::NotFound {
                SkipReason::MissingPartner(unit.control_path.display().to_string())
            } else {
                SkipReason::Io(err)
            };
            return Err(SpoolError::Skip {
                id: unit.id,
                reason,
            });
        }

        tracing::debug!(unit = %unit.id, "Claimed spool unit");
        Ok(unit)
    }
}

fn validate(path: &Path) -> std::result::Result<PathBuf, ValidationError> {
    let display = || path.display().to_string();

    if path
        .components()
        .any(|component| component == Component::ParentDir)
    {
        return Err(ValidationError::ParentComponent(display()));
    }

    let path =
        std::fs::canonicalize(path).map_err(|_| ValidationError::PathNotFound(display()))?;
    if !path.is_dir() {
        return Err(ValidationError::NotDirectory(path.display().to_string()));
    }

    if let Some(prefix) = SYSTEM_PREFIXES
        .iter()
        .find(|prefix| path.starts_with(prefix))
    {
        return Err(ValidationError::SystemDirectory {
            prefix: *prefix,
            path: path.display().to_string(),
        });
    }

    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tracker() -> Arc<Tracker> {
        Arc::new(Tracker::memory())
    }

    #[test]
    fn rejects_missing_directory() {
        let err = Scanner::new("/definitely/not/here", tracker()).unwrap_err();
        assert!(matches!(
            err,
            SpoolError::Validation(ValidationError::PathNotFound(_))
        ));
    }

    #[test]
    fn rejects_parent_components() {
        let err = Scanner::new("/tmp/../tmp", tracker()).unwrap_err();
        assert!(matches!(
            err,
            SpoolError::Validation(ValidationError::ParentComponent(_))
        ));
    }

    #[test]
    fn rejects_system_directories() {
        let err = Scanner::new("/etc", tracker()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Spool validation error: Spool path cannot be in system directory /etc: /etc"
        );
    }

    #[test]
    fn rejects_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = Scanner::new(file.path(), tracker()).unwrap_err();
        assert!(matches!(
            err,
            SpoolError::Validation(ValidationError::NotDirectory(_))
        ));
    }

    #[tokio::test]
    async fn empty_directory_has_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(dir.path(), tracker()).unwrap();
        let err = scanner.refresh_list().await.unwrap_err();
        assert_eq!(err.to_string(), "no files found");
        assert!(matches!(
            scanner.read_next_file().await,
            Err(SpoolError::Exhausted)
        ));
    }
}
