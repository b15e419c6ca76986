use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::models::{ChatRejection, Session};

const CACHE_IDLE_TTL: Duration = Duration::from_secs(300);

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Debug, Error)]
pub enum BotStateError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable backing of the session cache.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<Session>, BotStateError>;
    async fn save(&self, session: &Session) -> Result<(), BotStateError>;
}

struct CacheEntry {
    session: SessionHandle,
    touched: Instant,
}

/// Session store shared by all handlers.
///
/// Every user gets one in-memory record guarded by its own lock. The lock is
/// only taken for synchronous field updates and never held across an await.
#[derive(Clone)]
pub struct BotState {
    repo: Arc<dyn SessionRepository>,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

/// Holds a user's processing flag; dropping it clears the flag.
pub struct ProcessingGuard {
    handle: SessionHandle,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        lock(&self.handle).is_processing_message = false;
    }
}

pub fn lock(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BotState {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            repo,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the user's record, creating a defaulted one on first contact.
    pub async fn handle(&self, user_id: &str) -> SessionHandle {
        {
            let mut cache = self.cache.write().await;
            if let Some(entry) = cache.get_mut(user_id) {
                entry.touched = Instant::now();
                return entry.session.clone();
            }
        }

        let start_time = Instant::now();
        let session = match self.repo.load(user_id).await {
            Ok(Some(mut session)) => {
                session.user_id = user_id.to_string();
                session
            }
            Ok(None) => {
                log::info!("New session record for user {}", user_id);
                Session::new(user_id)
            }
            Err(e) => {
                // Not cached, so the stored record is retried on the next access.
                log::error!("Error loading session for user {}: {}", user_id, e);
                return Arc::new(Mutex::new(Session::new(user_id)));
            }
        };
        log::debug!("Session loaded for user {} in {:?}", user_id, start_time.elapsed());

        // Another handler may have raced us here; the first insert wins.
        let mut cache = self.cache.write().await;
        cache
            .entry(user_id.to_string())
            .or_insert_with(|| CacheEntry {
                session: Arc::new(Mutex::new(session)),
                touched: Instant::now(),
            })
            .session
            .clone()
    }

    pub async fn snapshot(&self, user_id: &str) -> Session {
        let handle = self.handle(user_id).await;
        let session = lock(&handle).clone();
        session
    }

    /// Applies `f` under the user's lock and persists the result if it changed.
    pub async fn update<R>(&self, user_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let handle = self.handle(user_id).await;
        let (out, changed) = apply(&handle, f);

        if let Some(session) = changed {
            self.persist(&session).await;
        }
        out
    }

    /// Admits a chat message and hands out the user's processing flag.
    pub async fn begin_chat(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessingGuard, ChatRejection> {
        let handle = self.handle(user_id).await;
        let (admission, changed) = apply(&handle, |s| s.admit_chat(now));
        // Created before any await so no exit path can leak the flag.
        let guard = admission.map(|()| ProcessingGuard {
            handle: handle.clone(),
        });

        if let Some(session) = changed {
            self.persist(&session).await;
        }
        guard
    }

    async fn persist(&self, session: &Session) {
        let start_time = Instant::now();
        match self.repo.save(session).await {
            Ok(()) => log::debug!(
                "Session saved for user {} in {:?}",
                session.user_id,
                start_time.elapsed()
            ),
            Err(e) => log::error!("Error saving session for user {}: {}", session.user_id, e),
        }
    }

    pub async fn cleanup_cache(&self) {
        self.evict_idle(CACHE_IDLE_TTL).await;
    }

    /// Drops records idle for `ttl` that no handler currently holds.
    async fn evict_idle(&self, ttl: Duration) {
        let mut cache = self.cache.write().await;
        let previous_count = cache.len();

        cache.retain(|_, entry| {
            let in_use = Arc::strong_count(&entry.session) > 1
                || lock(&entry.session).is_processing_message;
            in_use || entry.touched.elapsed() < ttl
        });

        log::debug!("Cache cleaned: {} -> {} entries", previous_count, cache.len());
    }
}

fn apply<R>(handle: &SessionHandle, f: impl FnOnce(&mut Session) -> R) -> (R, Option<Session>) {
    let mut session = lock(handle);
    let before = session.clone();
    let out = f(&mut session);
    let changed = (*session != before).then(|| session.clone());
    (out, changed)
}
