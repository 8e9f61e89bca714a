// ── Runtime connection configuration ──
//
// These types describe *how* to reach the print gateway and which
// collaborators supply the session. The hosting application constructs a
// `GatewayConfig` and hands it in -- core never reads config files and
// never acquires tokens itself.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Default gateway endpoint for local development setups.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:9000";

/// Configuration for one gateway client instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway URL (e.g. `ws://localhost:9000`).
    pub server_url: Url,
    /// Pause after connect-success before dependent operations (auto
    /// re-registration), letting server-side session setup finish.
    pub settle_delay: Duration,
    /// How long the transport waits for the gateway's `connect` ack.
    pub handshake_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_url: Url::parse(DEFAULT_SERVER_URL).expect("default gateway URL is valid"),
            settle_delay: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

// ── Session collaborator ─────────────────────────────────────────────

/// The multi-tenancy boundary: every registration, command, and log entry
/// is scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Injected view of the hosting application's session state.
///
/// Token acquisition and tenant selection live outside this crate; the
/// manager only ever asks "what are the credentials right now".
pub trait SessionProvider: Send + Sync {
    fn auth_token(&self) -> Option<SecretString>;
    fn active_tenant(&self) -> Option<Tenant>;
}

/// A `SessionProvider` backed by plain fields, for tests and for hosts
/// whose session state is already materialized.
#[derive(Default)]
pub struct StaticSession {
    inner: std::sync::Mutex<SessionFields>,
}

#[derive(Default)]
struct SessionFields {
    token: Option<SecretString>,
    tenant: Option<Tenant>,
}

impl StaticSession {
    pub fn new(token: Option<SecretString>, tenant: Option<Tenant>) -> Self {
        Self {
            inner: std::sync::Mutex::new(SessionFields { token, tenant }),
        }
    }

    pub fn set_token(&self, token: Option<SecretString>) {
        if let Ok(mut fields) = self.inner.lock() {
            fields.token = token;
        }
    }

    pub fn set_tenant(&self, tenant: Option<Tenant>) {
        if let Ok(mut fields) = self.inner.lock() {
            fields.tenant = tenant;
        }
    }
}

impl SessionProvider for StaticSession {
    fn auth_token(&self) -> Option<SecretString> {
        self.inner.lock().ok().and_then(|f| f.token.clone())
    }

    fn active_tenant(&self) -> Option<Tenant> {
        self.inner.lock().ok().and_then(|f| f.tenant.clone())
    }
}
