// transport/udp.rs: datagram bridge to a broker-side relay
use super::framing::Framer;
use super::{InboundMessage, Transport};
use crate::errors::GatewayError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INBOUND_DEPTH: usize = 256;
const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpBridge {
    tx_sock: Arc<UdpSocket>,
    listen_addr: SocketAddr,
    framer: Framer,
}

impl UdpBridge {
    /// Binds a send socket connected to `relay_addr` and a receive socket on
    /// `bind_addr`, then starts the receive loop.
    pub async fn connect(
        relay_addr: &str,
        bind_addr: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>, JoinHandle<()>), GatewayError> {
        let to_err = |e: std::io::Error| GatewayError::Transport(e.to_string());
        let tx = UdpSocket::bind("0.0.0.0:0").await.map_err(to_err)?;
        tx.connect(relay_addr).await.map_err(to_err)?;
        let rx = UdpSocket::bind(bind_addr).await.map_err(to_err)?;
        let listen_addr = rx.local_addr().map_err(to_err)?;
        info!(relay = relay_addr, listen = %listen_addr, "udp bridge up");

        let (in_tx, in_rx) = mpsc::channel(INBOUND_DEPTH);
        let framer = Framer;
        let handle = spawn_receiver(Arc::new(rx), framer, in_tx, shutdown);
        Ok((
            Self {
                tx_sock: Arc::new(tx),
                listen_addr,
                framer,
            },
            in_rx,
            handle,
        ))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

fn spawn_receiver(
    rx_sock: Arc<UdpSocket>,
    framer: Framer,
    out: mpsc::Sender<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                res = rx_sock.recv_from(&mut buf) => match res {
                    Ok((n, from)) => match framer.deframe(&buf[..n]) {
                        Ok((topic, payload)) => {
                            debug!(%from, topic, bytes = payload.len(), "inbound datagram");
                            if out.send(InboundMessage::new(topic, payload)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("deframe error: {e}"),
                    },
                    Err(e) => warn!("recv error: {e}"),
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("udp receiver stopped");
    })
}

#[async_trait]
impl Transport for UdpBridge {
    async fn publish(&self, topic: &str, payload: &[u8]) -> bool {
        let framed = match self.framer.frame(topic, payload) {
            Ok(f) => f,
            Err(e) => {
                warn!(%e, "cannot frame publish");
                return false;
            }
        };
        match self.tx_sock.send(&framed).await {
            Ok(_) => true,
            Err(e) => {
                warn!(?e, topic, "udp send error");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_over_loopback() {
        // stand-in relay
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = relay.local_addr().unwrap().to_string();

        let (_stop_tx, stop_rx) = watch::channel(false);
        let (bridge, mut inbound, _h) = UdpBridge::connect(&relay_addr, "127.0.0.1:0", stop_rx)
            .await
            .unwrap();

        assert!(bridge.publish("TSP/RSMS", &[0x23, 0x23]).await);
        let mut buf = [0u8; 128];
        let (n, _) = relay.recv_from(&mut buf).await.unwrap();
        let (topic, payload) = Framer.deframe(&buf[..n]).unwrap();
        assert_eq!(topic, "TSP/RSMS");
        assert_eq!(payload, &[0x23, 0x23]);

        let framed = Framer.frame("GLOBAL/TSP_CONNECT", b"1").unwrap();
        relay.send_to(&framed, bridge.listen_addr()).await.unwrap();
        let msg = inbound.recv().await.unwrap();
        assert_eq!(msg, InboundMessage::new("GLOBAL/TSP_CONNECT", b"1".to_vec()));
    }
}
