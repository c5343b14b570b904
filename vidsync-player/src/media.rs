//! Local media library
//!
//! Everything a device can play lives flat in one media directory. Remote
//! peers and API clients refer to files by name only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extensions recognized as playable video
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "ogv",
];

/// One entry of the media listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaFile {
    pub name: String,
    /// Bytes
    pub size: u64,
    pub modified: DateTime<Utc>,
}

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Final path component of `name`, if it is a usable file name
///
/// Strips any directory part, so `"/other/host/path/movie.mp4"` and
/// `"../movie.mp4"` both become `"movie.mp4"`.
pub fn sanitize_name(name: &str) -> Option<String> {
    let base = Path::new(name.trim()).file_name()?.to_str()?;
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}

/// Path of `name`'s basename inside `dir`, if that file exists
pub async fn resolve_basename(dir: &Path, name: &str) -> Option<PathBuf> {
    let base = sanitize_name(name)?;
    let candidate = dir.join(base);
    match tokio::fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => Some(candidate),
        _ => None,
    }
}

/// Media files in `dir`, sorted by name case-insensitively
///
/// A missing directory is an empty library.
pub async fn list_media_files(dir: &Path) -> std::io::Result<Vec<MediaFile>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_media_file(&path) {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        files.push(MediaFile {
            name: name.to_string(),
            size: meta.len(),
            modified,
        });
    }

    files.sort_by_key(|f| f.name.to_lowercase());
    Ok(files)
}

/// Delete `name` from `dir`; `Ok(false)` if there was no such file
pub async fn delete_media_file(dir: &Path, name: &str) -> std::io::Result<bool> {
    let Some(path) = resolve_basename(dir, name).await else {
        return Ok(false);
    };
    tokio::fs::remove_file(&path).await?;
    Ok(true)
}
