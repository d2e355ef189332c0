use std::sync::Arc;

use shared_types::Turn;
use tokio::sync::RwLock;

/// Append-only, ordered record of turns.
///
/// The scheduler is the only writer; handlers read snapshots. Entries are
/// never edited, the log can only be emptied wholesale.
#[derive(Clone, Default)]
pub struct ConversationLog {
    turns: Arc<RwLock<Vec<Turn>>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, turn: Turn) {
        self.turns.write().await.push(turn);
    }

    pub async fn snapshot(&self) -> Vec<Turn> {
        self.turns.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.turns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.read().await.is_empty()
    }

    /// Local half of a clear; the backend half goes through the proxy first.
    pub(crate) async fn clear(&self) {
        self.turns.write().await.clear();
    }
}
