use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{DkimError, KeyPair, Result};

/// Write `pair` as `<id>.pub` and `<id>.pem` into `dir`, returning the public
/// and private key paths in that order.
pub fn write_key_pair(dir: &Path, id: &str, pair: &KeyPair) -> Result<(PathBuf, PathBuf)> {
    validate_directory(dir)?;

    let public_path = dir.join(format!("{id}.pub"));
    let private_path = dir.join(format!("{id}.pem"));

    std::fs::write(&public_path, pair.public_pem.as_bytes())?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut private = options.open(&private_path)?;
    // The open mode only applies to new files; an existing key keeps its own.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        private.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    private.write_all(pair.private_pem.as_bytes())?;
    private.sync_all()?;

    tracing::info!(
        public = %public_path.display(),
        private = %private_path.display(),
        "Wrote DKIM key pair"
    );

    Ok((public_path, private_path))
}

fn validate_directory(dir: &Path) -> Result<()> {
    let invalid = |reason| DkimError::InvalidDirectory {
        path: dir.display().to_string(),
        reason,
    };

    let metadata = std::fs::metadata(dir).map_err(|_| invalid("does not exist"))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory"));
    }
    if metadata.permissions().readonly() {
        return Err(invalid("not writable"));
    }

    Ok(())
}
