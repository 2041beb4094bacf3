// lib.rs: vehicle remote-monitoring gateway: signal cache, session, transport

pub mod cache;
pub mod config;
pub mod errors;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod persist;
pub mod session;
pub mod sim;
pub mod telemetry;
pub mod transport;

pub use cache::SignalCache;
pub use config::{Cli, GatewayConfig};
pub use errors::GatewayError;
pub use session::{LinkState, SessionController, SessionEvent, SessionHandle, SessionSettings};
pub use transport::{InboundMessage, MemoryTransport, Transport, UdpBridge};
