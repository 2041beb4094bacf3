// session/store.rs: persisted login sequence number (`login_sn=N`)
use crate::errors::GatewayError;
use crate::persist;
use std::path::Path;
use tracing::warn;

/// 0 when the file is missing or the value unreadable.
pub async fn load_login_sn(path: &Path) -> Result<u16, GatewayError> {
    let Some(bytes) = persist::read_optional(path).await? else {
        return Ok(0);
    };
    let text = String::from_utf8_lossy(&bytes);
    for (k, v) in persist::key_values(&text) {
        if k == "login_sn" {
            return match v.trim().parse::<u16>() {
                Ok(sn) => Ok(sn),
                Err(e) => {
                    warn!(path = %path.display(), value = v, %e, "bad login_sn; starting from 0");
                    Ok(0)
                }
            };
        }
    }
    Ok(0)
}

pub async fn save_login_sn(path: &Path, sn: u16) -> Result<(), GatewayError> {
    persist::write_atomic(path, format!("login_sn={sn}\n").as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_then_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsms_client.config");
        assert_eq!(load_login_sn(&path).await.unwrap(), 0);
        save_login_sn(&path, 65535).await.unwrap();
        assert_eq!(load_login_sn(&path).await.unwrap(), 65535);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "login_sn=65535\n");
    }

    #[tokio::test]
    async fn garbage_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsms_client.config");
        std::fs::write(&path, "login_sn=lots\n").unwrap();
        assert_eq!(load_login_sn(&path).await.unwrap(), 0);
    }
}
