// logging/packets.rs: CSV audit of publish attempts
use crate::errors::GatewayError;
use chrono::Local;
use rsms_protocol::CommandFlag;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::warn;

const HEADER: &str = "ts,command,bytes,outcome\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Refused,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Sent => "sent",
            Outcome::Refused => "refused",
        }
    }
}

/// packets.csv: ts,command,bytes,outcome
#[derive(Clone)]
pub struct PacketLog {
    file: Arc<Mutex<BufWriter<fs::File>>>,
}

impl PacketLog {
    pub async fn open(path: &Path) -> Result<Self, GatewayError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| GatewayError::io(dir, e))?;
        }
        let fresh = !fs::try_exists(path).await.unwrap_or(false);
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| GatewayError::io(path, e))?;
        let mut writer = BufWriter::new(f);
        if fresh {
            writer
                .write_all(HEADER.as_bytes())
                .await
                .map_err(|e| GatewayError::io(path, e))?;
            writer.flush().await.map_err(|e| GatewayError::io(path, e))?;
        }
        Ok(Self {
            file: Arc::new(Mutex::new(writer)),
        })
    }

    pub async fn record(&self, command: CommandFlag, bytes: usize, outcome: Outcome) {
        let ts = Local::now().to_rfc3339();
        let line = format!("{ts},{},{bytes},{}\n", command.as_str(), outcome.as_str());
        let mut f = self.file.lock().await;
        if let Err(e) = f.write_all(line.as_bytes()).await {
            warn!(?e, "packet log write failed");
            return;
        }
        let _ = f.flush().await;
    }
}
