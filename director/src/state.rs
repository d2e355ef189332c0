use std::sync::Arc;

use crate::conversation::Conversation;
use crate::proxy::BackendClient;
use crate::supervisor::BackendSupervisor;

pub struct AppState {
    /// Port the director itself listens on
    pub port: u16,
    pub backend: BackendClient,
    pub supervisor: Arc<BackendSupervisor>,
    pub conversation: Conversation,
}
