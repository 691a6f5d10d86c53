//! Lifecycle tasks
//!
//! A `Task` marks the lifetime of a component that can end on its own, such
//! as a load balancer losing its last server. Whoever owns something that
//! depends on the component awaits `finished()` and tears it down.

use std::sync::Arc;
use tokio::sync::watch;

/// Finish-once lifecycle handle. Clones share the same state.
#[derive(Clone)]
pub struct Task {
    name: Arc<str>,
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            name: Arc::from(name.into()),
            tx: Arc::new(tx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finish the task. Later calls keep the first reason and return false.
    pub fn finish(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let finished = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if finished {
            tracing::debug!("task {} finished: {}", self.name, reason);
        }
        finished
    }

    pub fn is_finished(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolves with the finish reason.
    pub async fn finished(&self) -> String {
        let mut rx = self.tx.subscribe();
        let reason = match rx.wait_for(|r| r.is_some()).await {
            Ok(r) => r.clone(),
            Err(_) => None,
        };
        reason.unwrap_or_default()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("reason", &self.reason())
            .finish()
    }
}
