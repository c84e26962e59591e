// Jaskier Shared Pattern -- state
// biomed-mcp-gateway - Application state

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;

/// Responses queued per SSE session before `POST /messages` applies backpressure.
const SESSION_BUFFER: usize = 64;

// ── SSE sessions ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SessionHandle {
    pub sender: mpsc::Sender<Value>,
    /// Cancelled when the event stream goes away.
    pub cancel: CancellationToken,
}

/// Live SSE sessions keyed by session id.
/// `std::sync::Mutex`: sessions are closed from `Drop`, which cannot await.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Register a new session. Dropping the returned guard closes it.
    pub fn open(self: &Arc<Self>) -> (SessionGuard, mpsc::Receiver<Value>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(SESSION_BUFFER);
        let handle = SessionHandle {
            sender,
            cancel: CancellationToken::new(),
        };
        self.lock().insert(id.clone(), handle);
        tracing::info!(session_id = %id, "SSE session opened");
        (
            SessionGuard {
                id,
                registry: Arc::clone(self),
            },
            receiver,
        )
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn close(&self, id: &str) {
        if let Some(handle) = self.lock().remove(id) {
            handle.cancel.cancel();
            tracing::info!(session_id = %id, "SSE session closed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Owned by the session's event stream.
pub struct SessionGuard {
    id: String,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}

// ── Shared: AppState (project-specific fields vary) ─────────────────────────
/// Central application state. Clone-friendly: every field is an `Arc` or cheap.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub sessions: Arc<SessionRegistry>,
    pub start_time: Instant,
    /// `true` once the server is about to accept traffic.
    pub ready: Arc<AtomicBool>,
    /// Optional auth secret from AUTH_SECRET env. None = dev mode (no auth).
    pub auth_secret: Option<String>,
    /// Cancelled on shutdown; ends every open SSE stream.
    pub shutdown: CancellationToken,
}

// ── Shared: readiness helpers ───────────────────────────────────────────────
impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("Gateway marked as READY");
    }
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, auth_secret: Option<String>) -> Self {
        if auth_secret.is_some() {
            tracing::info!("AUTH_SECRET configured: authentication enabled");
        } else {
            tracing::info!("AUTH_SECRET not set: authentication disabled (dev mode)");
        }

        Self {
            dispatcher,
            sessions: Arc::new(SessionRegistry::default()),
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
            auth_secret,
            shutdown: CancellationToken::new(),
        }
    }
}
