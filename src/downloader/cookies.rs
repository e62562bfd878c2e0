// Cookie credential handling
//
// The secret lives in memory for the lifetime of the process and only touches
// disk as a per-job cookie-jar file, removed once the tool run that needed it
// has finished.

use std::fmt;
use std::path::{Path, PathBuf};

use super::utils::remove_quietly;

/// Raw Netscape cookie-jar text. `Debug` never prints the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for absent or blank values, so callers never emit `--cookies`
    pub fn from_config(value: Option<String>) -> Option<Self> {
        value.filter(|v| !v.trim().is_empty()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// A materialized cookie jar; deleted on drop
#[derive(Debug)]
pub struct CookieFile {
    path: PathBuf,
}

impl CookieFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CookieFile {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

#[derive(Debug, Clone)]
pub struct CredentialProvisioner {
    credential: Option<Credential>,
    dir: PathBuf,
}

impl CredentialProvisioner {
    pub fn new(credential: Option<Credential>, dir: impl Into<PathBuf>) -> Self {
        Self {
            credential,
            dir: dir.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credential.is_some()
    }

    /// Write the configured cookies for one job. Never fails: a write error is
    /// logged and the job simply runs without cookies.
    pub async fn credential_file(&self, job_id: &str) -> Option<CookieFile> {
        let credential = self.credential.as_ref()?;
        let path = self.dir.join(format!("cookies-{}.txt", job_id));

        if let Err(e) = write_private(&self.dir, &path, credential.as_str()).await {
            tracing::warn!("[Cookies] Failed to write cookie file {}: {}", path.display(), e);
            remove_quietly(&path);
            return None;
        }

        Some(CookieFile { path })
    }
}

async fn write_private(dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        use tokio::io::AsyncWriteExt;

        // Owner-only from creation; truncate to overwrite, never append
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .await?;
        // `mode` only applies to new files
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
    }

    #[cfg(not(unix))]
    tokio::fs::write(path, contents).await?;

    Ok(())
}
