// persist.rs: write-temp-then-rename file replacement
//
// A reader only ever sees the previous complete file or the new complete
// file. A failed write leaves the previous file in place.

use crate::errors::GatewayError;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), GatewayError> {
    let tmp = temp_path(path);
    if let Err(e) = write_and_sync(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(GatewayError::io(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(GatewayError::io(path, e));
    }
    Ok(())
}

async fn write_and_sync(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = fs::File::create(tmp).await?;
    f.write_all(bytes).await?;
    f.sync_all().await
}

/// `Ok(None)` when the file does not exist yet.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, GatewayError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GatewayError::io(path, e)),
    }
}

/// Parses `key=value` lines; blank lines and `#` comments are skipped.
pub fn key_values(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim(), v))
}
