// config.rs: command line interface + layered runtime configuration
//
// Precedence: built-in defaults < TOML file (--config) < RSMS__* environment
// < explicit command line flags.

use crate::errors::GatewayError;
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rsms_gateway", version, about = "Vehicle remote-monitoring telemetry gateway")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Feed the signal cache from the built-in simulator.
    #[arg(long, default_value_t = false)]
    pub simulate: bool,
    /// Also write daily log files here.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    #[arg(long)]
    pub relay_addr: Option<String>,
    #[arg(long)]
    pub bind_addr: Option<String>,
}

// ============================ Sections ======================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulate: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VehicleConfig {
    #[serde(default)]
    pub vin: String,
    #[serde(default)]
    pub iccid: String,
    #[serde(default)]
    pub battery_pack_sn: Vec<String>,
    /// Provisioning file (`vin=`, `iccid=`, `battery_pack_sn=`) read instead
    /// of the values above when set.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    /// Append the engine unit to realtime reports.
    #[serde(default)]
    pub report_engine: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_signal_cache_path")]
    pub signal_cache_path: PathBuf,
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
    #[serde(default = "default_reissue_path")]
    pub reissue_path: PathBuf,
    #[serde(default = "default_five_secs")]
    pub snapshot_interval_secs: u64,
    #[serde(default = "default_five_secs")]
    pub reissue_flush_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_retention_capacity")]
    pub retention_capacity: usize,
    #[serde(default = "default_reissue_per_tick")]
    pub reissue_per_tick: usize,
    #[serde(default = "default_initial_interval")]
    pub initial_interval_secs: u64,
    #[serde(default = "default_relaxed_interval")]
    pub relaxed_interval_secs: u64,
    #[serde(default = "default_alarm_window")]
    pub alarm_window_secs: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_report_topic")]
    pub report: String,
    #[serde(default = "default_connect_topic")]
    pub platform_connected: String,
    #[serde(default = "default_controller_topic")]
    pub controller_data: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Udp,
    /// In-process loopback; nothing leaves the host.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_relay_addr")]
    pub relay_addr: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// CSV audit of every publish attempt.
    #[serde(default)]
    pub packet_log: Option<PathBuf>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_signal_cache_path() -> PathBuf {
    PathBuf::from("/tmp/gb_signal_cache.dat")
}
fn default_session_path() -> PathBuf {
    PathBuf::from("/tmp/rsms_client.config")
}
fn default_reissue_path() -> PathBuf {
    PathBuf::from("/tmp/rsms_message.dat")
}
fn default_five_secs() -> u64 {
    5
}
fn default_retention_capacity() -> usize {
    30
}
fn default_reissue_per_tick() -> usize {
    1
}
fn default_initial_interval() -> u64 {
    1
}
fn default_relaxed_interval() -> u64 {
    10
}
fn default_alarm_window() -> u64 {
    30
}
fn default_tick_ms() -> u64 {
    1000
}
fn default_report_topic() -> String {
    "TSP/RSMS".into()
}
fn default_connect_topic() -> String {
    "GLOBAL/TSP_CONNECT".into()
}
fn default_controller_topic() -> String {
    "RSMS/MCU_DATA".into()
}
fn default_relay_addr() -> String {
    "127.0.0.1:7891".into()
}
fn default_bind_addr() -> String {
    "0.0.0.0:7892".into()
}
fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            signal_cache_path: default_signal_cache_path(),
            session_path: default_session_path(),
            reissue_path: default_reissue_path(),
            snapshot_interval_secs: default_five_secs(),
            reissue_flush_secs: default_five_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_capacity: default_retention_capacity(),
            reissue_per_tick: default_reissue_per_tick(),
            initial_interval_secs: default_initial_interval(),
            relaxed_interval_secs: default_relaxed_interval(),
            alarm_window_secs: default_alarm_window(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            report: default_report_topic(),
            platform_connected: default_connect_topic(),
            controller_data: default_controller_topic(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            relay_addr: default_relay_addr(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            packet_log: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl StorageConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }

    pub fn reissue_flush(&self) -> Duration {
        Duration::from_secs(self.reissue_flush_secs.max(1))
    }
}

impl SessionConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

// ============================ Loading =======================================

impl Cli {
    pub fn parse_and_build_config() -> Result<(Cli, GatewayConfig), GatewayError> {
        let cli = <Cli as Parser>::parse();
        let cfg = GatewayConfig::load(&cli, Environment::with_prefix("RSMS"))?;
        Ok((cli, cfg))
    }
}

impl GatewayConfig {
    pub fn load(cli: &Cli, env: Environment) -> Result<GatewayConfig, GatewayError> {
        let mut builder = Config::builder();
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }
        builder = builder.add_source(env.separator("__").try_parsing(true));

        if let Some(addr) = &cli.relay_addr {
            builder = builder.set_override("transport.relay_addr", addr.as_str())?;
        }
        if let Some(addr) = &cli.bind_addr {
            builder = builder.set_override("transport.bind_addr", addr.as_str())?;
        }
        if let Some(dir) = &cli.log_dir {
            builder = builder.set_override("logging.log_dir", dir.to_string_lossy().as_ref())?;
        }
        if cli.simulate {
            builder = builder.set_override("simulate", true)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
