use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Session cookies, mirrored to a JSON file after every change.
#[derive(Debug, Clone)]
pub struct CookieJar {
    path: PathBuf,
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    /// Restores the jar persisted at `path`.
    ///
    /// A missing or corrupt file starts an empty session instead of failing.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cookies = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(cookies) => {
                    debug!("Loaded session cookies from {}", path.display());
                    cookies
                }
                Err(e) => {
                    warn!("Discarding unreadable cookie file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!("No cookies at {} ({}), starting fresh", path.display(), e);
                BTreeMap::new()
            }
        };

        CookieJar { path, cookies }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Inserts or overwrites cookies. Returns whether anything was received.
    pub fn merge<I>(&mut self, received: I) -> bool
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut changed = false;
        for (name, value) in received {
            self.cookies.insert(name, value);
            changed = true;
        }
        changed
    }

    /// Value for a manually attached `Cookie` header, `None` when empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Writes the full mapping, creating the parent directory if needed.
    pub async fn save(&self) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let encoded = serde_json::to_vec_pretty(&self.cookies).map_err(ClientError::Encode)?;
        tokio::fs::write(&self.path, encoded).await?;
        debug!("Saved {} cookies to {}", self.cookies.len(), self.path.display());
        Ok(())
    }
}
