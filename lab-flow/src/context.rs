use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{GraphError, Result};

/// Shared key/value store for the tasks of one session.
///
/// Values are kept as JSON so a session can carry any serializable state
/// between steps. Clones share the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| GraphError::ContextError(format!("cannot serialize '{key}': {e}")))?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    /// Synchronous read, for edge conditions.
    pub fn get_sync<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_null())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub async fn clear(&self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Reading {
        name: String,
        value: f64,
    }

    #[tokio::test]
    async fn stores_and_reads_typed_values() {
        let ctx = Context::new();
        ctx.set(
            "reading",
            Reading {
                name: "Hemoglobin".into(),
                value: 13.2,
            },
        )
        .await
        .unwrap();

        let back: Reading = ctx.get("reading").await.unwrap();
        assert_eq!(back.name, "Hemoglobin");
        assert!(ctx.contains_key("reading"));
        assert!(ctx.get::<u32>("reading").await.is_none());
    }

    #[tokio::test]
    async fn clones_share_state_and_null_counts_as_absent() {
        let ctx = Context::new();
        let other = ctx.clone();
        other.set("analysis", Option::<String>::None).await.unwrap();
        assert!(!ctx.contains_key("analysis"));

        other.set("analysis", "T1").await.unwrap();
        assert_eq!(ctx.get_sync::<String>("analysis").as_deref(), Some("T1"));

        ctx.remove("analysis").await;
        assert!(other.is_empty());
    }
}
