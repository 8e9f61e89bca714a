// ── In-process event bus ──
//
// Fans manager-side happenings out to any number of consumers over a
// broadcast channel. Isolation is structural: each subscriber owns its
// receiver, a slow consumer only ever sees `Lagged` on its own end, and
// a dropped or panicking consumer cannot reach back into the manager.

use std::sync::Arc;

use tokio::sync::broadcast;

use printbridge_api::message::{ExecuteCommand, PrintResult};

use crate::logbuf::LogEntry;
use crate::manager::ConnectionSnapshot;
use crate::model::PrinterRecord;

const BUS_CHANNEL_CAPACITY: usize = 256;

/// A single event carried through the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Connection state changed; carries the full snapshot.
    ConnectionStatus(Arc<ConnectionSnapshot>),
    /// The gateway reported an application-level connection error
    /// (credential refusal, tenant mismatch).
    ConnectionError { message: String },
    /// A diagnostic entry was appended to the log ring.
    LogAdded(Arc<LogEntry>),
    /// The registry's view of the tenant's printers changed.
    PrintersUpdated(Arc<Vec<Arc<PrinterRecord>>>),
    /// The gateway acknowledged a printer registration.
    PrinterRegistered(Arc<PrinterRecord>),
    /// A printer-side agent dropped off the gateway.
    PrinterDisconnected { printer_id: String },
    /// A print command addressed to this process as a device bridge.
    ExecutePrint(Arc<ExecuteCommand>),
    /// A drawer command addressed to this process as a device bridge.
    ExecuteDrawer(Arc<ExecuteCommand>),
    /// A relayed `print_command` push (legacy gateway event).
    PrintCommandRelayed(Arc<ExecuteCommand>),
    /// Outcome of a previously dispatched command, matched by command id
    /// at the consumer layer.
    PrintResult(Arc<PrintResult>),
}

/// Broadcast channel that fans events out to all subscribers.
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish to all subscribers. Silently drops when nobody listens.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    /// Create a receiver that gets all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
