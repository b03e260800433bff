#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod cpukey;
pub mod error;
pub mod events;
pub mod registry;
pub mod scanner;
pub mod subnet;
pub mod telemetry;

pub use config::ScanConfig;
pub use connection::{Connection, ConnectionInfo, ConnectionKind, ConnectionState};
pub use cpukey::CpuKey;
pub use error::{CpuKeyError, Result, ScanError};
pub use events::EventBus;
pub use registry::Registry;
pub use scanner::{ConsoleScanner, DISCOVERY_PORT};
pub use subnet::{enumerate_subnets, SubnetEntry, ICS_BRIDGE_BROADCAST};
