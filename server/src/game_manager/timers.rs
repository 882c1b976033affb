use dashmap::DashMap;
use std::future::Future;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Clock,
    Forfeit(String),
    Grace,
    Retention,
}

/// Background tasks owned by sessions, at most one per `(game_id, kind)`.
#[derive(Default)]
pub struct TimerRegistry {
    handles: DashMap<(String, TimerKind), AbortHandle>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` under the key, aborting whatever was registered there.
    pub fn schedule<F>(&self, game_id: &str, kind: TimerKind, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task).abort_handle();
        if let Some(previous) = self.handles.insert((game_id.to_string(), kind), handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self, game_id: &str, kind: &TimerKind) -> bool {
        match self.handles.remove(&(game_id.to_string(), kind.clone())) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drops every entry of the session. The retention task is the caller
    /// here, so it is forgotten rather than aborted.
    pub fn clear(&self, game_id: &str) {
        self.handles.retain(|(id, kind), handle| {
            if id != game_id {
                return true;
            }
            if *kind != TimerKind::Retention {
                handle.abort();
            }
            false
        });
    }

    #[cfg(test)]
    pub fn is_pending(&self, game_id: &str, kind: &TimerKind) -> bool {
        self.handles
            .get(&(game_id.to_string(), kind.clone()))
            .is_some_and(|h| !h.is_finished())
    }
}
