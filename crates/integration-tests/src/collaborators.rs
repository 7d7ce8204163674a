//! Scripted session store and tool runtime collaborators.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use server::{CollabError, SessionStore, ToolBroker};

/// An in-memory session store with deterministic fixtures.
pub struct MemorySessionStore {
    sessions: Mutex<BTreeMap<String, Value>>,
}

impl MemorySessionStore {
    /// Creates a store seeded with two sessions.
    pub fn with_fixtures() -> Self {
        let sessions = BTreeMap::from([
            (
                "sess-1".to_string(),
                json!({ "sessionId": "sess-1", "title": "First chat", "messages": 2 }),
            ),
            (
                "sess-2".to_string(),
                json!({ "sessionId": "sess-2", "title": "Second chat", "messages": 5 }),
            ),
        ]);

        Self {
            sessions: Mutex::new(sessions),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn list_sessions(&self) -> Result<Value, CollabError> {
        let sessions = self.sessions.lock().expect("session fixture lock poisoned");

        Ok(json!({ "sessions": sessions.values().collect::<Vec<_>>() }))
    }

    async fn get_session(&self, session_id: &str) -> Result<Value, CollabError> {
        let sessions = self.sessions.lock().expect("session fixture lock poisoned");

        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(format!("session '{session_id}'")))
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), CollabError> {
        let mut sessions = self.sessions.lock().expect("session fixture lock poisoned");

        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| CollabError::NotFound(format!("session '{session_id}'")))
    }

    // session_messages stays unimplemented so the 501 path is exercised.
}

/// A tool runtime that reflects invocations back.
pub struct EchoToolBroker;

#[async_trait]
impl ToolBroker for EchoToolBroker {
    async fn list_tools(&self) -> Result<Value, CollabError> {
        Ok(json!({ "tools": [{ "name": "echo", "description": "Reflects its arguments" }] }))
    }

    async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<Value, CollabError> {
        if name != "echo" {
            return Err(CollabError::NotFound(format!("tool '{name}'")));
        }

        Ok(json!({ "tool": name, "arguments": arguments }))
    }
}
