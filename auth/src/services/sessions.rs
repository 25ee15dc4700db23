use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use ring::rand::{SecureRandom, SystemRandom};

use authgate_models::{session_ttl, Identity, Session, SessionId};
use authgate_observability::secret_fingerprint;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Source of "now" for session timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Session lifecycle backing every authenticated request.
///
/// Implementations must be linearizable per key: a `get` that starts after a
/// `create` or `replace` returned observes it. The handshake controller relies
/// on this to confirm a commit before redirecting the browser.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Commit a new session for `identity` and return its id.
    async fn create(&self, identity: Identity) -> Result<SessionId, SessionError>;

    /// Live session for `id`. Expired sessions are reported as absent.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;

    /// Swap the embedded user wholesale. Timestamps are kept.
    async fn replace(&self, id: &SessionId, identity: Identity) -> Result<(), SessionError>;

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError>;

    /// Physically drop expired sessions, returning how many went.
    async fn purge_expired(&self) -> Result<usize, SessionError> {
        Ok(0)
    }
}

/// Process-local session table.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            rng: SystemRandom::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn generate_id(&self) -> Result<String, SessionError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| SessionError::Unavailable("system random source failed".to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, identity: Identity) -> Result<SessionId, SessionError> {
        let now = self.clock.now();
        loop {
            let raw = self.generate_id()?;
            if let Entry::Vacant(slot) = self.sessions.entry(raw.clone()) {
                let id = SessionId::new(raw);
                slot.insert(Session::new(id.clone(), identity, now));
                tracing::debug!(session = %secret_fingerprint(id.as_str()), ttl_hours = session_ttl().num_hours(), "Session created");
                return Ok(id);
            }
        }
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let now = self.clock.now();
        match self.sessions.get(id.as_str()) {
            Some(entry) if !entry.is_expired_at(now) => return Ok(Some(entry.value().clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // lazy expiry; the read guard above is released before removal
        self.sessions.remove_if(id.as_str(), |_, session| session.is_expired_at(now));
        tracing::debug!(session = %secret_fingerprint(id.as_str()), "Expired session dropped");
        Ok(None)
    }

    async fn replace(&self, id: &SessionId, identity: Identity) -> Result<(), SessionError> {
        let now = self.clock.now();
        let mut entry = self.sessions.get_mut(id.as_str()).ok_or(SessionError::NotFound)?;
        if entry.is_expired_at(now) {
            return Err(SessionError::NotFound);
        }
        entry.user = identity;
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        if self.sessions.remove(id.as_str()).is_some() {
            tracing::debug!(session = %secret_fingerprint(id.as_str()), "Session destroyed");
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, SessionError> {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

/// Periodically sweep expired sessions. Lazy expiry in `get` keeps results
/// correct without this; the sweep only bounds memory.
pub async fn session_cleanup_task(store: Arc<dyn SessionStore>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        match store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::info!("Cleaned up {} expired sessions", purged),
            Err(e) => tracing::error!("Failed to cleanup expired sessions: {}", e),
        }
    }
}
