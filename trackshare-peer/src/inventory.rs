//! Local file inventory: the regular files directly inside the shared directory.
//! Recomputed on every call, never stored.

use std::path::Path;

use trackshare_core::{is_wire_file_name, FileRecord};

/// Scan `dir`, sorted by filename. Names the space-delimited protocol cannot
/// carry (whitespace, non-UTF-8) are skipped with a warning.
pub async fn scan(dir: &Path) -> std::io::Result<Vec<FileRecord>> {
    let mut out = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
            continue;
        };
        if !is_wire_file_name(&name) {
            tracing::warn!(name = %name, "skipping file name the protocol cannot carry");
            continue;
        }
        out.push(FileRecord::new(name, meta.len()));
    }
    out.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(out)
}

/// Create the shared directory if it does not exist.
pub async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}
