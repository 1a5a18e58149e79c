use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{GraphError, Result},
    message::{Message, Role},
};

/// Per-request state shared by the tasks of one graph run.
///
/// Cloning is cheap and every clone sees the same data, so a handler can keep
/// one clone and read what the tasks left behind once the run finishes.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    conversation: Arc<RwLock<Vec<Message>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context with a caller-supplied conversation
    pub fn with_conversation(messages: Vec<Message>) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            conversation: Arc::new(RwLock::new(messages)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| GraphError::ContextError(format!("failed to store '{key}': {e}")))?;
        self.data.insert(key, value);
        Ok(())
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like [`Context::get`] but a missing key is an error
    pub fn require<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)
            .ok_or_else(|| GraphError::ContextError(format!("'{key}' not found in context")))
    }

    pub async fn conversation(&self) -> Vec<Message> {
        self.conversation.read().await.clone()
    }

    pub async fn push_message(&self, message: Message) {
        self.conversation.write().await.push(message);
    }

    pub async fn count_role(&self, role: Role) -> usize {
        self.conversation
            .read()
            .await
            .iter()
            .filter(|m| m.role == role)
            .count()
    }

    pub async fn last_user_message(&self) -> Option<String> {
        self.conversation
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
    }
}
