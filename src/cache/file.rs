// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Local file cache.
//!
//! Each entry is `<dir>/<key>.json`; the file mtime is the stored-at time.
//! Writes go to a unique temporary file first and are renamed into place, so
//! a reader sees either the old body or the new one, never a partial write.

use super::ResponseCache;
use crate::error::StoreError;
use crate::key::CacheKey;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::debug;

const ENTRY_EXTENSION: &str = "json";

pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCache {
    /// Cache rooted at `dir`; entries older than `ttl` are treated as absent.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }

    fn is_fresh(&self, modified: SystemTime) -> bool {
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < self.ttl,
            // mtime in the future: clock skew, treat as just written
            Err(_) => true,
        }
    }
}

#[async_trait]
impl ResponseCache for FileCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
        let path = self.entry_path(key);
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !self.is_fresh(metadata.modified()?) {
            debug!(key = %key, "cache entry expired");
            return Ok(None);
        }

        match fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &CacheKey, value: &str, _ttl: Duration) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("{ENTRY_EXTENSION}.{}.tmp", uuid::Uuid::new_v4()));

        fs::write(&tmp, value.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key = %key, path = %path.display(), "cache set (file)");
        Ok(())
    }

    async fn invalidate(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{ENTRY_EXTENSION}");
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.starts_with(prefix) && name.ends_with(&suffix)) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Raced with another invalidation
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(removed, prefix, "cache invalidated (file)");
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
