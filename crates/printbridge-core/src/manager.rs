// ── Gateway connection manager ──
//
// Owns the socket lifecycle: handshake-time authentication, the bounded
// retry/backoff climb, inbound event routing, and the command dispatch
// surface. Explicitly constructed and explicitly owned by the hosting
// application -- there is no module-level singleton, so tests run any
// number of isolated instances.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use printbridge_api::message::{
    CommandResponse, DrawerRequest, Inbound, Outbound, PrintRequest, PrinterDrop, PrinterInfo,
    PrinterStatusUpdate, PrintersList, PrintersListRequest, RegisterPrinter, StatusReport,
};
use printbridge_api::socket::{Connector, HandshakeAuth, WsConnector};
use printbridge_api::PrinterStatus;

use crate::bus::{BusEvent, EventBus};
use crate::command::{CommandEnvelope, CommandKind};
use crate::config::{GatewayConfig, SessionProvider};
use crate::logbuf::{LogBuffer, LogEntry, LogLevel};
use crate::model::PrinterConfig;
use crate::persist::PrinterStore;
use crate::registry::PrinterRegistry;

/// Bounded retry climb: after this many consecutive transport failures
/// the manager stops and requires an explicit retry.
pub const MAX_CONNECTION_ATTEMPTS: u32 = 5;

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 5000;

// ── Observable connection state ──────────────────────────────────────

/// Connection status observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Full connection state, published through a `watch` channel and
/// mutated only by the manager.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    /// Consecutive failed attempts in the current climb.
    pub attempt: u32,
    pub max_attempts: u32,
    /// True iff the climb exhausted its attempts and the manager is in
    /// the terminal `Failed` state awaiting an explicit retry.
    pub manual_intervention_required: bool,
    /// Set by an explicit `disconnect()`; suppresses `auto_connect`.
    pub manually_disconnected: bool,
    pub server_url: Url,
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
}

impl ConnectionSnapshot {
    fn initial(server_url: Url) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            max_attempts: MAX_CONNECTION_ATTEMPTS,
            manual_intervention_required: false,
            manually_disconnected: false,
            server_url,
            tenant_id: None,
            session_id: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status, ConnectionStatus::Connected)
    }
}

// ── Manager ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Construct with
/// [`new`](Self::new), call [`connect`](Self::connect), observe through
/// [`watch_status`](Self::watch_status) and [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct GatewayManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: GatewayConfig,
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn PrinterStore>,
    connector: Arc<dyn Connector>,
    registry: PrinterRegistry,
    logs: LogBuffer,
    bus: EventBus,
    state: watch::Sender<ConnectionSnapshot>,
    /// Sender half of the live socket; `None` whenever not connected.
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    /// Bumped on every connect/disconnect; pending retries and settle
    /// timers check it before acting, so stale callbacks are no-ops.
    generation: AtomicU64,
    /// Cancels the current connection's driver; replaced per generation.
    conn_cancel: Mutex<CancellationToken>,
}

impl GatewayManager {
    /// Create a manager with the production WebSocket connector.
    /// Does NOT connect -- call [`connect`](Self::connect).
    pub fn new(
        config: GatewayConfig,
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn PrinterStore>,
    ) -> Self {
        let connector = Arc::new(WsConnector {
            handshake_timeout: config.handshake_timeout,
        });
        Self::with_connector(config, session, store, connector)
    }

    /// Create a manager over an arbitrary [`Connector`] (the test seam).
    pub fn with_connector(
        config: GatewayConfig,
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn PrinterStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionSnapshot::initial(config.server_url.clone()));

        Self {
            inner: Arc::new(ManagerInner {
                config,
                session,
                store,
                connector,
                registry: PrinterRegistry::new(),
                logs: LogBuffer::new(),
                bus: EventBus::new(),
                state,
                outbound: Mutex::new(None),
                generation: AtomicU64::new(0),
                conn_cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open (or replace) the gateway connection.
    ///
    /// Fails fast -- `false` plus one error-level log entry, no transport
    /// created -- when the session provider has no token or no active
    /// tenant. Otherwise spawns the driver task and returns `true`; the
    /// outcome arrives asynchronously via `connection_status` events.
    pub fn connect(&self, server_url: Option<Url>) -> bool {
        let inner = &self.inner;

        let Some(token) = inner.session.auth_token() else {
            inner.log(
                LogLevel::Error,
                "No authentication token found. Please login first.",
            );
            return false;
        };
        let Some(tenant) = inner.session.active_tenant() else {
            inner.log(LogLevel::Error, "No tenant selected. Please select a tenant first.");
            return false;
        };

        // Supersede any previous connection or pending retry.
        let generation = inner.bump_generation();
        let cancel = inner.replace_cancel();
        inner.clear_outbound();

        // Switching tenants clears the registry view before any new
        // registration is accepted.
        inner.registry.set_active_tenant(Some(tenant.id.clone()));

        inner.state.send_modify(|s| {
            if let Some(url) = server_url {
                s.server_url = url;
            }
            s.status = ConnectionStatus::Connecting;
            s.attempt = 0;
            s.manual_intervention_required = false;
            s.manually_disconnected = false;
            s.tenant_id = Some(tenant.id.clone());
            s.session_id = None;
        });

        let url = inner.state.borrow().server_url.clone();
        inner.log(
            LogLevel::Info,
            format!("Attempting to connect to {url} (attempt 1/{MAX_CONNECTION_ATTEMPTS})"),
        );
        inner.publish_status();

        let auth = HandshakeAuth {
            token,
            tenant_id: tenant.id,
        };
        let driver = Arc::clone(inner);
        tokio::spawn(async move {
            drive(driver, generation, cancel, url, auth).await;
        });

        true
    }

    /// Explicit teardown. Suppresses `auto_connect` until the next
    /// explicit `connect`/`retry_connection`.
    pub fn disconnect(&self) {
        let inner = &self.inner;

        inner.bump_generation();
        drop(inner.replace_cancel());
        inner.clear_outbound();

        inner.state.send_modify(|s| {
            s.status = ConnectionStatus::Disconnected;
            s.attempt = 0;
            s.manual_intervention_required = false;
            s.manually_disconnected = true;
            s.session_id = None;
        });

        inner.registry.mark_all_offline();
        inner
            .bus
            .publish(BusEvent::PrintersUpdated(inner.registry.snapshot()));
        inner.log(LogLevel::Success, "Disconnected from print gateway");
        inner.publish_status();
    }

    /// Manual recovery from the terminal `Failed` state; optionally
    /// retargets the gateway URL.
    pub fn retry_connection(&self, new_url: Option<Url>) -> bool {
        let inner = &self.inner;

        if let Some(url) = &new_url {
            inner.log(LogLevel::Info, format!("Updated gateway URL to {url}"));
        }
        inner.state.send_modify(|s| {
            s.attempt = 0;
            s.manual_intervention_required = false;
            s.manually_disconnected = false;
        });
        inner.log(LogLevel::Info, "Manual retry initiated");

        self.connect(new_url)
    }

    /// Opportunistic connect for external triggers (tenant selection
    /// changed). Refuses while connected, while a climb is in progress,
    /// and after a manual `disconnect()`.
    pub fn auto_connect(&self) -> bool {
        let snapshot = self.status();
        match snapshot.status {
            ConnectionStatus::Connected
            | ConnectionStatus::Connecting
            | ConnectionStatus::Reconnecting => return false,
            ConnectionStatus::Disconnected | ConnectionStatus::Failed => {}
        }
        if snapshot.manually_disconnected {
            return false;
        }

        self.inner
            .log(LogLevel::Info, "Auto-connecting to print gateway");
        self.connect(None)
    }

    // ── Printer registration ─────────────────────────────────────────

    /// Register the tenant's printer with the gateway.
    ///
    /// The registry is NOT updated here: a record appears only when the
    /// gateway acknowledges with `printer_registered`. The configuration
    /// is persisted so the printer re-registers automatically on the next
    /// (re)connect.
    pub fn register_printer(&self, printer_id: &str, connection_info: &str) -> bool {
        register_printer_inner(&self.inner, printer_id, connection_info, true)
    }

    // ── Command dispatch ─────────────────────────────────────────────

    /// Send a print command to a specific printer.
    pub fn send_print(&self, printer_id: &str, command: &str, print_data: Option<Value>) -> bool {
        let inner = &self.inner;
        let Some(tenant_id) = inner.guard_connected("send print command") else {
            return false;
        };
        if printer_id.trim().is_empty() || command.trim().is_empty() {
            inner.log(
                LogLevel::Error,
                "Cannot send print command: Missing required fields (printerId, command)",
            );
            return false;
        }

        let envelope = CommandEnvelope::new(CommandKind::Print, printer_id, tenant_id);
        let sent = inner.outbound_send(Outbound::PrintCommand(PrintRequest {
            printer_id: envelope.printer_id.clone(),
            command: command.to_owned(),
            print_data,
            command_id: envelope.command_id.clone(),
            tenant_id: envelope.tenant_id.clone(),
            timestamp: envelope.timestamp,
        }));
        if sent {
            inner.log(
                LogLevel::Info,
                format!(
                    "Sending print command to printer {} (ID: {})",
                    envelope.printer_id, envelope.command_id
                ),
            );
        }
        sent
    }

    /// Open the cash drawer attached to a printer.
    pub fn open_drawer(&self, printer_id: &str) -> bool {
        let inner = &self.inner;
        let Some(tenant_id) = inner.guard_connected("open drawer") else {
            return false;
        };
        if printer_id.trim().is_empty() {
            inner.log(
                LogLevel::Error,
                "Cannot open drawer: Missing required field (printerId)",
            );
            return false;
        }

        let envelope = CommandEnvelope::new(CommandKind::OpenDrawer, printer_id, tenant_id);
        let sent = inner.outbound_send(Outbound::OpenDrawer(DrawerRequest {
            printer_id: envelope.printer_id.clone(),
            command_id: envelope.command_id.clone(),
            tenant_id: envelope.tenant_id.clone(),
            timestamp: envelope.timestamp,
        }));
        if sent {
            inner.log(
                LogLevel::Info,
                format!("Opening drawer for printer {}", envelope.printer_id),
            );
        }
        sent
    }

    /// Report a device status upstream (this process acting as a
    /// device-facing bridge rather than a dashboard).
    pub fn report_status(
        &self,
        printer_id: &str,
        status: PrinterStatus,
        error_message: Option<&str>,
    ) -> bool {
        let inner = &self.inner;
        let Some(tenant_id) = inner.guard_connected("update printer status") else {
            return false;
        };
        if printer_id.trim().is_empty() {
            inner.log(
                LogLevel::Error,
                "Cannot update printer status: Missing required field (printerId)",
            );
            return false;
        }

        let envelope = CommandEnvelope::new(CommandKind::StatusUpdate, printer_id, tenant_id);
        let sent = inner.outbound_send(Outbound::PrinterStatus(StatusReport {
            printer_id: envelope.printer_id.clone(),
            status,
            error_message: error_message.map(str::to_owned),
            tenant_id: envelope.tenant_id.clone(),
            timestamp: envelope.timestamp,
        }));
        if sent {
            inner.log(
                LogLevel::Info,
                format!(
                    "Updated printer status: {} - {}",
                    envelope.printer_id,
                    status.as_str()
                ),
            );
        }
        sent
    }

    /// Acknowledge a previously received command, correlating by its id.
    pub fn ack_command(
        &self,
        command_id: &str,
        printer_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> bool {
        let inner = &self.inner;
        let Some(tenant_id) = inner.guard_connected("send command response") else {
            return false;
        };

        let envelope = CommandEnvelope::ack(command_id, printer_id, tenant_id);
        let sent = inner.outbound_send(Outbound::CommandResponse(CommandResponse {
            command_id: envelope.command_id.clone(),
            printer_id: envelope.printer_id.clone(),
            success,
            error_message: error_message.map(str::to_owned),
            tenant_id: envelope.tenant_id.clone(),
            timestamp: envelope.timestamp,
        }));
        if sent {
            inner.log(
                LogLevel::Info,
                format!(
                    "Sent command response: {} - {}",
                    envelope.command_id,
                    if success { "Success" } else { "Failed" }
                ),
            );
        }
        sent
    }

    /// Ask the gateway for the tenant's current printer roster; the
    /// reply arrives as an inbound `printers_list` push.
    pub fn request_printers_list(&self) -> bool {
        let inner = &self.inner;
        let Some(tenant_id) = inner.guard_connected("request printers list") else {
            return false;
        };

        let sent = inner.outbound_send(Outbound::GetPrintersList(PrintersListRequest {
            tenant_id,
            timestamp: Utc::now(),
        }));
        if sent {
            inner.log(LogLevel::Info, "Requesting connected printers list");
        }
        sent
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Current connection snapshot.
    pub fn status(&self) -> ConnectionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Subscribe to the event bus.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BusEvent> {
        self.inner.bus.subscribe()
    }

    /// Current printers for the active tenant, ordered by printer id.
    pub fn printers(&self) -> Arc<Vec<Arc<crate::model::PrinterRecord>>> {
        self.inner.registry.snapshot()
    }

    /// Subscribe to printer roster changes.
    pub fn watch_printers(&self) -> watch::Receiver<Arc<Vec<Arc<crate::model::PrinterRecord>>>> {
        self.inner.registry.subscribe()
    }

    /// Look up one printer by id.
    pub fn printer(&self, printer_id: &str) -> Option<Arc<crate::model::PrinterRecord>> {
        self.inner.registry.get(printer_id)
    }

    /// Retained log entries, newest first.
    pub fn logs(&self) -> Vec<Arc<LogEntry>> {
        self.inner.logs.entries()
    }

    /// Log entries filtered by level, capped at `limit`.
    pub fn logs_filtered(&self, level: Option<LogLevel>, limit: usize) -> Vec<Arc<LogEntry>> {
        self.inner.logs.filtered(level, limit)
    }

    /// Empty the log ring (the clear itself is logged).
    pub fn clear_logs(&self) {
        self.inner.logs.clear();
        self.inner.log(LogLevel::Info, "Logs cleared");
    }
}

// ── Inner helpers ────────────────────────────────────────────────────

impl ManagerInner {
    fn log(&self, level: LogLevel, message: impl Into<String>) {
        let tenant = self.session.active_tenant().map(|t| t.id);
        let entry = self.logs.push(level, message, tenant.as_deref());
        self.bus.publish(BusEvent::LogAdded(entry));
    }

    fn publish_status(&self) {
        let snapshot = Arc::new(self.state.borrow().clone());
        self.bus.publish(BusEvent::ConnectionStatus(snapshot));
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Connected-state + tenant precondition shared by every dispatch
    /// operation. Returns the tenant id, or logs and returns `None`.
    fn guard_connected(&self, action: &str) -> Option<String> {
        if !self.is_connected() {
            self.log(
                LogLevel::Error,
                format!("Cannot {action}: Not connected to print gateway"),
            );
            return None;
        }
        let tenant = self.state.borrow().tenant_id.clone();
        if tenant.is_none() {
            self.log(LogLevel::Error, format!("Cannot {action}: No tenant selected"));
        }
        tenant
    }

    fn outbound_send(&self, msg: Outbound) -> bool {
        let event = msg.event_name();
        let Ok(guard) = self.outbound.lock() else {
            return false;
        };
        let Some(tx) = guard.as_ref() else {
            self.log(
                LogLevel::Error,
                format!("Cannot send {event}: no active gateway session"),
            );
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                self.log(LogLevel::Error, format!("Failed to send {event}: {e}"));
                false
            }
        }
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Cancel the previous connection's token and install a fresh one.
    fn replace_cancel(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        if let Ok(mut guard) = self.conn_cancel.lock() {
            guard.cancel();
            *guard = fresh.clone();
        }
        fresh
    }

    fn clear_outbound(&self) {
        if let Ok(mut guard) = self.outbound.lock() {
            *guard = None;
        }
    }

    fn set_outbound(&self, tx: mpsc::Sender<Outbound>) {
        if let Ok(mut guard) = self.outbound.lock() {
            *guard = Some(tx);
        }
    }
}

/// Shared by the public surface and the post-connect settle task; the
/// settle task re-issues the persisted registration without re-persisting.
fn register_printer_inner(
    inner: &ManagerInner,
    printer_id: &str,
    connection_info: &str,
    persist: bool,
) -> bool {
    let Some(tenant_id) = inner.guard_connected("register printer") else {
        return false;
    };
    if printer_id.trim().is_empty() || connection_info.trim().is_empty() {
        inner.log(
            LogLevel::Error,
            "Cannot register printer: Missing required fields (printerId, connectionInfo)",
        );
        return false;
    }

    let sent = inner.outbound_send(Outbound::PrinterRegister(RegisterPrinter {
        printer_id: printer_id.to_owned(),
        printer_ip: connection_info.to_owned(),
        tenant_id: tenant_id.clone(),
        timestamp: Utc::now(),
    }));
    if !sent {
        return false;
    }

    if persist {
        let config = PrinterConfig {
            printer_id: printer_id.to_owned(),
            connection_info: connection_info.to_owned(),
        };
        if let Err(e) = inner.store.set(&tenant_id, &config) {
            inner.log(
                LogLevel::Warning,
                format!("Failed to persist printer config: {e}"),
            );
        }
    }

    inner.log(
        LogLevel::Info,
        format!("Registering printer {printer_id} ({connection_info}) for tenant {tenant_id}"),
    );
    true
}

// ── Driver task ──────────────────────────────────────────────────────

/// One connection lifetime: climb with bounded backoff until connected
/// or out of attempts, then pump inbound events until the socket drops.
async fn drive(
    inner: Arc<ManagerInner>,
    generation: u64,
    cancel: CancellationToken,
    url: Url,
    auth: HandshakeAuth,
) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = inner.connector.connect(&url, &auth) => result,
        };

        if inner.stale(generation) {
            return;
        }

        match result {
            Ok(connection) => {
                let session_id = connection.session_id.clone();
                on_connected(&inner, generation, &cancel, connection.outbound, &session_id);

                let reason = read_loop(&inner, &cancel, connection.inbound).await;

                if inner.stale(generation) || cancel.is_cancelled() {
                    return;
                }
                on_dropped(&inner, reason);
                // Once fully connected then dropped, recovery requires an
                // explicit connect()/retry or the external auto-connect
                // trigger. No automatic retry from here.
                return;
            }
            Err(e) => {
                let mut attempt = 0;
                inner.state.send_modify(|s| {
                    s.attempt += 1;
                    if s.attempt > 1 {
                        s.status = ConnectionStatus::Reconnecting;
                    }
                    attempt = s.attempt;
                });

                if e.is_rejection() {
                    inner.log(
                        LogLevel::Error,
                        format!("Gateway rejected credentials: {e}"),
                    );
                    inner.bus.publish(BusEvent::ConnectionError {
                        message: e.to_string(),
                    });
                } else {
                    inner.log(
                        LogLevel::Error,
                        format!(
                            "Connection attempt {attempt}/{MAX_CONNECTION_ATTEMPTS} failed: {e}"
                        ),
                    );
                }

                if attempt >= MAX_CONNECTION_ATTEMPTS {
                    inner.state.send_modify(|s| {
                        s.status = ConnectionStatus::Failed;
                        s.manual_intervention_required = true;
                    });
                    inner.log(
                        LogLevel::Error,
                        "Maximum connection attempts reached. Manual connection required.",
                    );
                    inner.publish_status();
                    return;
                }

                let delay = backoff_delay(attempt);
                inner.log(
                    LogLevel::Info,
                    format!("Retrying connection in {}ms", delay.as_millis()),
                );
                inner.publish_status();

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }

                // A disconnect() or a competing connect() supersedes this
                // climb while it sleeps; a stale retry must not act.
                if inner.stale(generation) || inner.is_connected() {
                    return;
                }
            }
        }
    }
}

/// Exponential backoff capped at [`BACKOFF_CAP_MS`]:
/// `min(1000 * 2^(attempt-1), 5000)` milliseconds.
fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let exp = BACKOFF_BASE_MS.saturating_mul(1_u64 << shift);
    Duration::from_millis(exp.min(BACKOFF_CAP_MS))
}

fn on_connected(
    inner: &Arc<ManagerInner>,
    generation: u64,
    cancel: &CancellationToken,
    outbound: mpsc::Sender<Outbound>,
    session_id: &str,
) {
    inner.set_outbound(outbound);
    inner.state.send_modify(|s| {
        s.status = ConnectionStatus::Connected;
        s.attempt = 0;
        s.manual_intervention_required = false;
        s.manually_disconnected = false;
        s.session_id = Some(session_id.to_owned());
    });
    inner.log(
        LogLevel::Success,
        format!("Connected to print gateway (session {session_id})"),
    );
    inner.publish_status();

    // The gateway holds no registration across socket lifetimes: after the
    // settle delay, re-issue the persisted registration for this tenant.
    let tenant_id = inner.state.borrow().tenant_id.clone();
    let Some(tenant_id) = tenant_id else { return };

    let settle = inner.config.settle_delay;
    let task_inner = Arc::clone(inner);
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = task_cancel.cancelled() => return,
            () = tokio::time::sleep(settle) => {}
        }
        if task_inner.stale(generation) || !task_inner.is_connected() {
            return;
        }
        if let Some(saved) = task_inner.store.get(&tenant_id) {
            task_inner.log(
                LogLevel::Info,
                format!(
                    "Re-registering saved printer {} for tenant {tenant_id}",
                    saved.printer_id
                ),
            );
            register_printer_inner(&task_inner, &saved.printer_id, &saved.connection_info, false);
        }
    });
}

fn on_dropped(inner: &ManagerInner, reason: Option<String>) {
    inner.clear_outbound();
    inner.state.send_modify(|s| {
        s.status = ConnectionStatus::Disconnected;
        s.session_id = None;
    });

    inner.registry.mark_all_offline();
    inner
        .bus
        .publish(BusEvent::PrintersUpdated(inner.registry.snapshot()));

    let reason = reason.unwrap_or_else(|| "transport closed".to_owned());
    inner.log(
        LogLevel::Warning,
        format!("Disconnected from print gateway: {reason}"),
    );
    inner.publish_status();
}

// ── Inbound event routing ────────────────────────────────────────────

/// Pump inbound events until the socket drops or the connection is
/// cancelled. Returns the disconnect reason, if the gateway gave one.
async fn read_loop(
    inner: &Arc<ManagerInner>,
    cancel: &CancellationToken,
    mut inbound: mpsc::Receiver<Inbound>,
) -> Option<String> {
    loop {
        let msg = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            msg = inbound.recv() => msg,
        };
        let Some(msg) = msg else {
            // Channel closed without a disconnect notice.
            return None;
        };

        match msg {
            Inbound::Connect(ack) => {
                inner
                    .state
                    .send_modify(|s| s.session_id = Some(ack.session_id.clone()));
                inner.log(
                    LogLevel::Info,
                    format!("Gateway session acknowledged (session {})", ack.session_id),
                );
            }
            Inbound::Disconnect(notice) => return notice.reason,
            Inbound::ConnectError(refusal) => {
                inner.log(
                    LogLevel::Error,
                    format!("Gateway connection error: {}", refusal.message),
                );
                inner.bus.publish(BusEvent::ConnectionError {
                    message: refusal.message,
                });
            }
            Inbound::PrinterRegistered(info) => handle_registered(inner, &info),
            Inbound::PrinterDisconnected(notice) => handle_printer_drop(inner, &notice),
            Inbound::PrinterStatus(update) => handle_status_push(inner, &update),
            Inbound::PrintCommand(command) => {
                inner.log(
                    LogLevel::Info,
                    format!("Print command received: {}", command.command),
                );
                inner
                    .bus
                    .publish(BusEvent::PrintCommandRelayed(Arc::new(command)));
            }
            Inbound::ExecutePrint(command) => {
                inner.log(
                    LogLevel::Info,
                    format!(
                        "Print command received: {} (ID: {})",
                        command.command,
                        command.command_id.as_deref().unwrap_or("-")
                    ),
                );
                inner.bus.publish(BusEvent::ExecutePrint(Arc::new(command)));
            }
            Inbound::ExecuteDrawer(command) => {
                inner.log(
                    LogLevel::Info,
                    format!(
                        "Drawer command received: {} (ID: {})",
                        command.command,
                        command.command_id.as_deref().unwrap_or("-")
                    ),
                );
                inner
                    .bus
                    .publish(BusEvent::ExecuteDrawer(Arc::new(command)));
            }
            Inbound::PrintResult(result) => {
                let level = if result.success {
                    LogLevel::Success
                } else {
                    LogLevel::Error
                };
                inner.log(
                    level,
                    format!(
                        "Print result: {} - Command: {}",
                        if result.success { "Success" } else { "Failed" },
                        result.command_id
                    ),
                );
                inner.bus.publish(BusEvent::PrintResult(Arc::new(result)));
            }
            Inbound::PrintersList(list) => handle_roster(inner, &list),
            Inbound::Unknown { event, .. } => {
                inner.log(
                    LogLevel::Warning,
                    format!("Unhandled gateway event: {event}"),
                );
            }
        }
    }
}

fn handle_registered(inner: &ManagerInner, info: &PrinterInfo) {
    if !inner.registry.accepts(info.tenant_id.as_deref()) {
        inner.log(
            LogLevel::Warning,
            format!(
                "Ignoring printer_registered for foreign tenant: {}",
                info.tenant_id.as_deref().unwrap_or("-")
            ),
        );
        return;
    }

    let record = inner.registry.upsert_registered(info, Utc::now());
    inner.log(
        LogLevel::Success,
        format!("Printer registered: {}", record.printer_id),
    );
    inner.bus.publish(BusEvent::PrinterRegistered(record));
    inner
        .bus
        .publish(BusEvent::PrintersUpdated(inner.registry.snapshot()));
}

fn handle_printer_drop(inner: &ManagerInner, notice: &PrinterDrop) {
    if !inner.registry.accepts(notice.tenant_id.as_deref()) {
        inner.log(
            LogLevel::Warning,
            format!(
                "Ignoring printer_disconnected for foreign tenant: {}",
                notice.tenant_id.as_deref().unwrap_or("-")
            ),
        );
        return;
    }

    inner.registry.mark_offline(&notice.printer_id, Utc::now());
    inner.log(
        LogLevel::Info,
        format!("Printer disconnected: {}", notice.printer_id),
    );
    inner.bus.publish(BusEvent::PrinterDisconnected {
        printer_id: notice.printer_id.clone(),
    });
    inner
        .bus
        .publish(BusEvent::PrintersUpdated(inner.registry.snapshot()));
}

fn handle_status_push(inner: &ManagerInner, update: &PrinterStatusUpdate) {
    if !inner.registry.accepts(update.tenant_id.as_deref()) {
        inner.log(
            LogLevel::Warning,
            format!(
                "Ignoring printer status for foreign tenant: {}",
                update.tenant_id.as_deref().unwrap_or("-")
            ),
        );
        return;
    }

    if inner.registry.apply_status(update, Utc::now()) {
        inner.log(
            LogLevel::Info,
            format!(
                "Printer {} status updated: {}",
                update.printer_id,
                update.status.as_str()
            ),
        );
        inner
            .bus
            .publish(BusEvent::PrintersUpdated(inner.registry.snapshot()));
    } else {
        inner.log(
            LogLevel::Warning,
            format!("Status push for unknown printer: {}", update.printer_id),
        );
    }
}

fn handle_roster(inner: &ManagerInner, list: &PrintersList) {
    if !inner.registry.accepts(list.tenant_id.as_deref()) {
        inner.log(
            LogLevel::Warning,
            format!(
                "Ignoring printers list for foreign tenant: {}",
                list.tenant_id.as_deref().unwrap_or("-")
            ),
        );
        return;
    }

    inner.registry.reconcile(&list.printers, Utc::now());
    inner.log(
        LogLevel::Info,
        format!("Received printers list: {} printers", list.printers.len()),
    );
    inner
        .bus
        .publish(BusEvent::PrintersUpdated(inner.registry.snapshot()));
}

// ── Tests ────────────────────────────────────────────────────────────
