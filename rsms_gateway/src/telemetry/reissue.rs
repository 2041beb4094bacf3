// telemetry/reissue.rs: FIFO backlog of realtime data units awaiting resend
//
// On disk: repeated `[u32 BE length][length bytes]` records.

use crate::errors::GatewayError;
use crate::persist;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const LEN_PREFIX: usize = 4;

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<Vec<u8>>,
    dirty: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ReissueQueue {
    inner: Arc<Mutex<Inner>>,
}

impl ReissueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, unit: Vec<u8>) {
        let mut g = self.inner.lock();
        g.items.push_back(unit);
        g.dirty = true;
    }

    /// Appends in iteration order.
    pub fn extend<I: IntoIterator<Item = Vec<u8>>>(&self, units: I) {
        let mut g = self.inner.lock();
        let before = g.items.len();
        g.items.extend(units);
        if g.items.len() != before {
            g.dirty = true;
        }
    }

    /// Removes up to `n` of the oldest entries.
    pub fn take_batch(&self, n: usize) -> Vec<Vec<u8>> {
        let mut g = self.inner.lock();
        let n = n.min(g.items.len());
        if n > 0 {
            g.dirty = true;
        }
        g.items.drain(..n).collect()
    }

    /// Puts unsent entries back at the head, keeping their order.
    pub fn requeue_front(&self, units: Vec<Vec<u8>>) {
        if units.is_empty() {
            return;
        }
        let mut g = self.inner.lock();
        for unit in units.into_iter().rev() {
            g.items.push_front(unit);
        }
        g.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn contents(&self) -> Vec<Vec<u8>> {
        self.inner.lock().items.iter().cloned().collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    // ---------------------------- disk --------------------------------------

    /// Loaded records go ahead of anything already queued.
    pub async fn load(&self, path: &Path) -> Result<usize, GatewayError> {
        let Some(bytes) = persist::read_optional(path).await? else {
            return Ok(0);
        };
        let (records, dropped) = decode_records(&bytes);
        if dropped > 0 {
            warn!(
                path = %path.display(),
                dropped_bytes = dropped,
                "truncated reissue record discarded"
            );
        }
        let n = records.len();
        let mut g = self.inner.lock();
        for unit in records.into_iter().rev() {
            g.items.push_front(unit);
        }
        info!(event = "reissue_loaded", path = %path.display(), records = n);
        Ok(n)
    }

    pub async fn save(&self, path: &Path) -> Result<(), GatewayError> {
        let body = {
            let mut g = self.inner.lock();
            g.dirty = false;
            encode_records(g.items.iter())
        };
        let res = persist::write_atomic(path, &body).await;
        if res.is_err() {
            self.inner.lock().dirty = true;
        }
        res
    }

    /// Writes only when the contents changed since the last save.
    pub async fn save_if_dirty(&self, path: &Path) -> Result<bool, GatewayError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.save(path).await.map(|_| true)
    }
}

pub fn encode_records<'a, I: IntoIterator<Item = &'a Vec<u8>>>(units: I) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out
}

/// Returns the complete records and the count of trailing bytes that did
/// not form one.
pub fn decode_records(mut buf: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut out = Vec::new();
    while !buf.is_empty() {
        if buf.len() < LEN_PREFIX {
            return (out, buf.len());
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let rest = &buf[LEN_PREFIX..];
        if rest.len() < len {
            return (out, buf.len());
        }
        out.push(rest[..len].to_vec());
        buf = &rest[len..];
    }
    (out, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_batches_and_requeue() {
        let q = ReissueQueue::new();
        q.extend([vec![1], vec![2], vec![3]]);
        let batch = q.take_batch(2);
        assert_eq!(batch, vec![vec![1], vec![2]]);
        q.requeue_front(batch);
        assert_eq!(q.contents(), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(q.take_batch(10).len(), 3);
        assert!(q.take_batch(1).is_empty());
    }

    #[test]
    fn length_prefix_is_big_endian() {
        let encoded = encode_records(&[vec![0xAA; 3]]);
        assert_eq!(&encoded[..4], &[0, 0, 0, 3]);
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let mut bytes = encode_records(&[vec![1, 2], vec![3]]);
        bytes.extend_from_slice(&[0, 0, 0, 9, 7, 7]);
        let (records, dropped) = decode_records(&bytes);
        assert_eq!(records, vec![vec![1, 2], vec![3]]);
        assert_eq!(dropped, 6);

        let (records, dropped) = decode_records(&[0, 0]);
        assert!(records.is_empty());
        assert_eq!(dropped, 2);
    }

    #[tokio::test]
    async fn persistence_round_trip_keeps_order_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reissue.dat");
        let units = vec![vec![], vec![0x07; 1], vec![0x42; 300], vec![], (0..=255u8).collect()];

        let q = ReissueQueue::new();
        q.extend(units.clone());
        assert!(q.save_if_dirty(&path).await.unwrap());
        assert!(!q.save_if_dirty(&path).await.unwrap());

        let back = ReissueQueue::new();
        assert_eq!(back.load(&path).await.unwrap(), units.len());
        assert_eq!(back.take_batch(units.len()), units);
    }

    #[tokio::test]
    async fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let q = ReissueQueue::new();
        assert_eq!(q.load(&dir.path().join("none.dat")).await.unwrap(), 0);
        assert!(q.is_empty());
    }
}
