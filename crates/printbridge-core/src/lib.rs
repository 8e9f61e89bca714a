// printbridge-core: connection manager, printer registry, and command
// dispatch for the printbridge gateway client.

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod logbuf;
pub mod manager;
pub mod model;
pub mod persist;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{BusEvent, EventBus};
pub use command::{CommandEnvelope, CommandKind};
pub use config::{DEFAULT_SERVER_URL, GatewayConfig, SessionProvider, StaticSession, Tenant};
pub use error::CoreError;
pub use logbuf::{LOG_CAPACITY, LogBuffer, LogEntry, LogLevel};
pub use manager::{
    ConnectionSnapshot, ConnectionStatus, GatewayManager, MAX_CONNECTION_ATTEMPTS,
};
pub use model::{PrinterConfig, PrinterRecord};
pub use persist::{JsonFileStore, MemoryPrinterStore, PrinterStore};
pub use registry::PrinterRegistry;

// Re-export the wire-level device enums for ergonomics.
pub use printbridge_api::{PrinterKind, PrinterStatus};
