pub mod heartbeat;

pub use heartbeat::spawn_heartbeat;
