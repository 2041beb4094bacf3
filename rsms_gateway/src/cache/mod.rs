// cache/mod.rs: last-known value of every vehicle signal
//
// One lock covers the whole map. Values live in their text form so a
// single map serves every value kind, and the snapshot file is just the
// map written out as `id=value` lines.

use crate::errors::GatewayError;
use crate::persist;
use parking_lot::Mutex;
use rsms_protocol::{SignalId, SignalMap, SignalSource, SignalType, SignalValue};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

const WRITER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct SnapshotWriter {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct SignalCache {
    map: Arc<Mutex<SignalMap>>,
    path: Arc<PathBuf>,
    every: Duration,
    writer: Arc<Mutex<Option<SnapshotWriter>>>,
}

impl SignalCache {
    pub fn new(path: impl Into<PathBuf>, every: Duration) -> Self {
        Self {
            map: Arc::new(Mutex::new(SignalMap::new())),
            path: Arc::new(path.into()),
            every,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------- typed access ---------------------------------

    /// Always succeeds; the id's kind is the caller's contract.
    pub fn set<T: SignalType>(&self, id: SignalId, value: T) -> bool {
        self.map.lock().set(id, value);
        true
    }

    pub fn get<T: SignalType>(&self, id: SignalId) -> Option<T> {
        let text = self.map.lock().text(id).map(Cow::into_owned)?;
        T::from_text(&text)
    }

    pub fn set_value(&self, id: SignalId, value: &SignalValue) -> bool {
        self.map.lock().set_value(id, value);
        true
    }

    pub fn set_byte(&self, id: SignalId, v: u8) -> bool {
        self.set(id, v)
    }
    pub fn set_word(&self, id: SignalId, v: u16) -> bool {
        self.set(id, v)
    }
    pub fn set_dword(&self, id: SignalId, v: u32) -> bool {
        self.set(id, v)
    }
    pub fn set_string(&self, id: SignalId, v: impl Into<String>) -> bool {
        self.set(id, v.into())
    }
    pub fn set_boolean(&self, id: SignalId, v: bool) -> bool {
        self.set(id, v)
    }

    pub fn get_byte(&self, id: SignalId) -> Option<u8> {
        self.get(id)
    }
    pub fn get_word(&self, id: SignalId) -> Option<u16> {
        self.get(id)
    }
    pub fn get_dword(&self, id: SignalId) -> Option<u32> {
        self.get(id)
    }
    pub fn get_string(&self, id: SignalId) -> Option<String> {
        self.get(id)
    }
    pub fn get_boolean(&self, id: SignalId) -> Option<bool> {
        self.get(id)
    }

    /// Consistent copy taken under the lock.
    pub fn snapshot(&self) -> SignalMap {
        self.map.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------- persistence ----------------------------------

    /// Loads the snapshot file and starts the periodic writer. A missing
    /// file leaves the cache empty.
    pub async fn start(&self) -> Result<usize, GatewayError> {
        let loaded = self.load().await?;
        info!(event = "cache_loaded", path = %self.path.display(), signals = loaded);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let me = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(me.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = me.save().await {
                            warn!(%e, "signal snapshot write failed; previous file kept");
                        }
                    }
                    res = stop_rx.changed() => {
                        if res.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("snapshot writer stopped");
        });

        let previous = self.writer.lock().replace(SnapshotWriter { stop_tx, handle });
        if let Some(old) = previous {
            let _ = old.stop_tx.send(true);
        }
        Ok(loaded)
    }

    /// Stops the writer, then writes one final snapshot.
    pub async fn stop(&self) -> Result<(), GatewayError> {
        let writer = self.writer.lock().take();
        if let Some(w) = writer {
            let _ = w.stop_tx.send(true);
            if time::timeout(WRITER_JOIN_TIMEOUT, w.handle).await.is_err() {
                warn!("snapshot writer did not stop in time");
            }
        }
        self.save().await
    }

    pub async fn save(&self) -> Result<(), GatewayError> {
        let body = encode_snapshot(&self.snapshot());
        persist::write_atomic(&self.path, body.as_bytes()).await
    }

    /// Merges the on-disk snapshot into memory; returns the entry count.
    pub async fn load(&self) -> Result<usize, GatewayError> {
        let Some(bytes) = persist::read_optional(&self.path).await? else {
            return Ok(0);
        };
        let loaded = decode_snapshot(&String::from_utf8_lossy(&bytes));
        let n = loaded.len();
        let mut map = self.map.lock();
        for (id, text) in loaded.iter() {
            map.insert_text(id, text);
        }
        Ok(n)
    }
}

impl SignalSource for SignalCache {
    fn text(&self, id: SignalId) -> Option<Cow<'_, str>> {
        self.map
            .lock()
            .text(id)
            .map(|t| Cow::Owned(t.into_owned()))
    }
}

fn encode_snapshot(map: &SignalMap) -> String {
    let mut out = String::new();
    for (id, text) in map.sorted() {
        out.push_str(&format!("{id}={}\n", escape(&text)));
    }
    out
}

/// Keeps every value on one line: `\\`, `\n` and `\r` are escaped.
fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['\\', '\n', '\r']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// Values are taken verbatim after the first `=`; only a CRLF line end is
// stripped.
fn decode_snapshot(text: &str) -> SignalMap {
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.is_empty())
        .filter_map(|l| {
            let Some((k, v)) = l.split_once('=') else {
                debug!(line = l, "skipping malformed snapshot line");
                return None;
            };
            match k.trim().parse::<SignalId>() {
                Ok(id) => Some((id, unescape(v))),
                Err(_) => {
                    debug!(key = k, "skipping malformed snapshot line");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &tempfile::TempDir) -> SignalCache {
        SignalCache::new(dir.path().join("cache.dat"), Duration::from_secs(5))
    }

    #[test]
    fn absent_until_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        assert_eq!(cache.get_word(SignalId::SPEED), None);
        assert!(cache.set_word(SignalId::SPEED, 0));
        assert_eq!(cache.get_word(SignalId::SPEED), Some(0));
    }

    #[test]
    fn typed_helpers_share_one_text_form() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.set_boolean(SignalId::DRIVING, true);
        cache.set_dword(SignalId::TOTAL_ODOMETER, 4_000_000_000);
        cache.set_string(SignalId(9000), "hello");
        assert_eq!(cache.get_string(SignalId::DRIVING).as_deref(), Some("1"));
        assert_eq!(cache.get_boolean(SignalId::DRIVING), Some(true));
        assert_eq!(cache.get_dword(SignalId::TOTAL_ODOMETER), Some(4_000_000_000));
        // too wide for a byte reads as absent
        assert_eq!(cache.get_byte(SignalId::TOTAL_ODOMETER), None);
        assert_eq!(cache.get_string(SignalId(9000)).as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.set_byte(SignalId::SOC, 80);
        cache.set_word(SignalId::SPEED, 600);
        cache.set_boolean(SignalId::BRAKING, false);
        cache.set_boolean(SignalId::POSITION_VALID, true);
        cache.set_string(SignalId(9001), "a=b");
        cache.set_string(SignalId(9002), "BP0001  ");
        cache.set_string(SignalId(9003), "line1\n9004=injected\r\\n");
        cache.save().await.unwrap();

        let reloaded = cache_in(&dir);
        assert_eq!(reloaded.load().await.unwrap(), 7);
        assert_eq!(reloaded.snapshot(), cache.snapshot());
        assert_eq!(reloaded.get_boolean(SignalId::BRAKING), Some(false));
        assert_eq!(reloaded.get_string(SignalId(9001)).as_deref(), Some("a=b"));
        assert_eq!(reloaded.get_string(SignalId(9002)).as_deref(), Some("BP0001  "));
        assert_eq!(
            reloaded.get_string(SignalId(9003)).as_deref(),
            Some("line1\n9004=injected\r\\n")
        );
        assert_eq!(reloaded.get_string(SignalId(9004)), None);

        let text = std::fs::read_to_string(dir.path().join("cache.dat")).unwrap();
        assert!(text.starts_with("104=600\n"));
    }

    #[tokio::test]
    async fn start_without_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        assert_eq!(cache.start().await.unwrap(), 0);
        assert!(cache.is_empty());
        cache.stop().await.unwrap();
        assert!(dir.path().join("cache.dat").exists());
    }

    #[tokio::test]
    async fn writer_persists_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.dat");
        let cache = SignalCache::new(&path, Duration::from_millis(20));
        cache.start().await.unwrap();
        cache.set_byte(SignalId::SOC, 42);

        for _ in 0..200 {
            if path.exists() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("108=42"));
        cache.stop().await.unwrap();
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let map = decode_snapshot("101=1\r\nnot a line\nabc=3\n104=600\n");
        assert_eq!(map.len(), 2);
        assert_eq!(map.text(SignalId(101)).as_deref(), Some("1"));
    }
}
