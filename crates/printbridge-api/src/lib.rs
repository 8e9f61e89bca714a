// printbridge-api: wire protocol and WebSocket transport for the print gateway.

pub mod error;
pub mod message;
pub mod socket;

pub use error::Error;
pub use message::{Inbound, Outbound, PrinterKind, PrinterStatus, parse_frame};
pub use socket::{Connector, GatewayConnection, HandshakeAuth, WsConnector};
