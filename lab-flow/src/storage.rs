use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{context::Context, error::Result};

/// One user's state: where the graph stands and the context it runs against.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub graph_id: String,
    pub current_task_id: String,
    pub status_message: Option<String>,
    pub context: Context,
}

impl Session {
    pub fn new_from_task(sid: String, task_name: &str) -> Self {
        Self {
            id: sid,
            graph_id: "default".to_string(),
            current_task_id: task_name.to_string(),
            status_message: None,
            context: Context::new(),
        }
    }
}

/// Where sessions live between requests.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

struct StoredSession {
    session: Session,
    last_seen: Instant,
}

/// Process-local session storage. Nothing outlives the process.
///
/// Every `get` and `save` marks a session as seen; [`evict_idle`] drops the
/// ones nobody has touched for a while.
///
/// [`evict_idle`]: InMemorySessionStorage::evict_idle
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, StoredSession>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes sessions idle for longer than `max_idle`. Returns how many went.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        match Instant::now().checked_sub(max_idle) {
            Some(cutoff) => self.evict_seen_before(cutoff),
            None => 0,
        }
    }

    /// Removes sessions last seen before `cutoff`.
    pub fn evict_seen_before(&self, cutoff: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, stored| stored.last_seen >= cutoff);
        before.saturating_sub(self.sessions.len())
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        let stored = StoredSession {
            session,
            last_seen: Instant::now(),
        };
        self.sessions.insert(stored.session.id.clone(), stored);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get_mut(id).map(|mut entry| {
            entry.last_seen = Instant::now();
            entry.session.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[tokio::test]
    async fn idle_sessions_are_evicted_and_touched_ones_kept() {
        let storage = InMemorySessionStorage::new();
        storage.save(Session::new_from_task("idle".into(), "a")).await.unwrap();
        storage.save(Session::new_from_task("active".into(), "a")).await.unwrap();

        sleep(Duration::from_millis(5));
        let cutoff = Instant::now();
        sleep(Duration::from_millis(5));
        assert!(storage.get("active").await.unwrap().is_some());

        assert_eq!(storage.evict_seen_before(cutoff), 1);
        assert_eq!(storage.len(), 1);
        assert!(storage.get("idle").await.unwrap().is_none());
        assert!(storage.get("active").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn long_idle_limit_keeps_fresh_sessions() {
        let storage = InMemorySessionStorage::new();
        storage.save(Session::new_from_task("s".into(), "a")).await.unwrap();
        assert_eq!(storage.evict_idle(Duration::from_secs(3600)), 0);
        assert!(!storage.is_empty());

        storage.delete("s").await.unwrap();
        assert!(storage.is_empty());
    }
}
