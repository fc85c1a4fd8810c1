use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::data::Session;

// chrono panics on second counts past i64::MAX / 1000
const MAX_IDLE_SECS: u64 = 100 * 365 * 24 * 3600;

pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory sessions keyed by id, evicted after `idle` without activity.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    greeting: String,
    idle: Duration,
}

impl SessionStore {
    pub fn new(greeting: impl Into<String>, idle_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            greeting: greeting.into(),
            idle: Duration::seconds(idle_secs.min(MAX_IDLE_SECS) as i64),
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Look up `id`, or create a fresh session under a new id. The flag is true when created.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SharedSession, bool) {
        if let Some(id) = id
            && let Some(session) = self.get(&id).await
        {
            session.lock().await.touch();
            return (id, session, false);
        }

        let id = Uuid::now_v7();
        let session = Arc::new(Mutex::new(Session::new(id, self.greeting.clone())));
        self.sessions.write().await.insert(id, session.clone());
        debug!(%id, "session created");
        (id, session, true)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop idle sessions. Sessions that are busy or mid-reply are kept.
    pub async fn remove_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(s) => s.is_replying() || !s.is_expired(self.idle),
            Err(_) => true,
        });
        before - sessions.len()
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.remove_expired().await;
                        if removed > 0 {
                            info!(removed, "evicted idle sessions");
                        }
                    }
                }
            }
        })
    }
}
