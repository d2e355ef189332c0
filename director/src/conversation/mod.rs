//! Conversation orchestration: the log, the session, the human-turn slot and
//! the scheduler that drives rounds against the backend.

mod human;
mod log;
mod scheduler;
mod session;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{
    Ack, AiSpeakRequest, AiSpeakResponse, NextSpeakerRequest, NextSpeakerResponse,
    SessionSnapshot, Turn, UserAction, UserSpeakRequest,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerTiming;
use crate::proxy::ProxyError;

pub use human::{HumanResolution, HumanTurnError, HumanTurnSlot, HumanTurnWait, SkipReason};
pub use log::ConversationLog;
pub use scheduler::{situation_for, NextSpeaker, RunSummary, TurnScheduler};
pub use session::SessionState;

/// The backend capabilities a conversation needs.
#[async_trait]
pub trait TurnBackend: Send + Sync {
    async fn next_speaker(&self, request: NextSpeakerRequest) -> Result<NextSpeakerResponse, ProxyError>;
    async fn user_speak(&self, request: UserSpeakRequest) -> Result<Ack, ProxyError>;
    async fn ai_speak(&self, request: AiSpeakRequest) -> Result<AiSpeakResponse, ProxyError>;
}

/// Why a single backend interaction inside a round failed.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TurnError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    /// HTTP success, but the body said `success: false`.
    #[error("backend reported failure: {0}")]
    Backend(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("create a script first")]
    ScriptMissing,
    #[error("a conversation is already running")]
    AlreadyActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub rounds: u32,
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<RunSummary>,
}

/// Handle shared by the HTTP layer; cheap to clone.
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<ConversationInner>,
}

struct ConversationInner {
    scheduler: TurnScheduler,
    run: Mutex<Option<ActiveRun>>,
}

impl Conversation {
    pub fn new(backend: Arc<dyn TurnBackend>, timing: SchedulerTiming) -> Self {
        Self {
            inner: Arc::new(ConversationInner {
                scheduler: TurnScheduler {
                    backend,
                    log: ConversationLog::new(),
                    session: Arc::new(Mutex::new(SessionState::default())),
                    human: HumanTurnSlot::new(),
                    timing,
                },
                run: Mutex::new(None),
            }),
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.inner.scheduler.log
    }

    fn session(&self) -> &Mutex<SessionState> {
        &self.inner.scheduler.session
    }

    /// Mirror a successful script creation.
    pub async fn record_script(&self, characters: &[String]) {
        let mut session = self.session().lock().await;
        session.record_script(characters);
        info!(participants = ?session.participants, "script recorded");
    }

    /// Spawn a scheduler run. `rounds` falls back to the configured default
    /// when absent or not positive.
    pub async fn start(&self, rounds: Option<i64>) -> Result<SessionStarted, SessionError> {
        let mut run = self.inner.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SessionError::AlreadyActive);
        }

        let scheduler = self.inner.scheduler.clone();
        let rounds = resolve_rounds(rounds, scheduler.timing.default_rounds);
        let session_id = {
            let mut session = self.session().lock().await;
            if !session.script_created {
                return Err(SessionError::ScriptMissing);
            }
            session.begin()
        };

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(rounds, cancel).await })
        };
        *run = Some(ActiveRun { cancel, handle });

        info!(%session_id, rounds, "conversation session started");
        Ok(SessionStarted { session_id, rounds })
    }

    /// Request cooperative cancellation. Returns whether a run was active.
    pub async fn stop(&self) -> bool {
        let run = self.inner.run.lock().await;
        match run.as_ref() {
            Some(active) if !active.handle.is_finished() => {
                active.cancel.cancel();
                info!("conversation stop requested");
                true
            }
            _ => false,
        }
    }

    /// Cancel the active run, if any, and wait for it to wind down.
    pub async fn shutdown(&self) {
        let active = self.inner.run.lock().await.take();
        if let Some(active) = active {
            active.cancel.cancel();
            if let Err(e) = active.handle.await {
                warn!(error = %e, "conversation run ended abnormally");
            }
        }
    }

    /// Answer the pending human turn.
    pub fn resolve_human(
        &self,
        action: UserAction,
        message: Option<String>,
    ) -> Result<u32, HumanTurnError> {
        let resolution = match action {
            UserAction::Speak => HumanResolution::Speak(message.unwrap_or_default().trim().to_string()),
            UserAction::Skip => HumanResolution::Skip(SkipReason::Requested),
        };
        self.inner.scheduler.human.resolve(resolution)
    }

    /// Mirror a free-form exchange the backend has already recorded.
    pub async fn record_exchange(&self, message: &str, speaker: &str, response: &str) {
        self.log().append(Turn::user(message)).await;
        self.log().append(Turn::ai(speaker, response)).await;
        debug!(speaker, "free message exchange recorded");
    }

    /// Mirror a backend history clear: stop any run, then empty the log and
    /// reset the round counter. Call only once the backend has confirmed.
    pub async fn mirror_clear(&self) {
        self.shutdown().await;
        self.log().clear().await;
        self.session().lock().await.reset_rounds();
        info!("conversation history cleared");
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let message_count = self.log().len().await;
        let session = self.session().lock().await;
        SessionSnapshot {
            session_id: session.session_id.map(|id| id.to_string()),
            script_created: session.script_created,
            active: session.active,
            current_round: session.current_round,
            participants: session.participants.clone(),
            awaiting_human: self.inner.scheduler.human.pending_round(),
            message_count,
            rounds: session.rounds.clone(),
        }
    }
}

fn resolve_rounds(requested: Option<i64>, default: u32) -> u32 {
    requested
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeBackend, Scripted};
    use super::*;
    use std::time::Duration;

    fn timing() -> SchedulerTiming {
        SchedulerTiming {
            human_turn_timeout: Duration::from_secs(60),
            round_pause: Duration::from_millis(1000),
            default_rounds: 5,
        }
    }

    async fn wait_until_idle(conversation: &Conversation) -> SessionSnapshot {
        loop {
            let snapshot = conversation.snapshot().await;
            if !snapshot.active {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_for_human(conversation: &Conversation) -> u32 {
        loop {
            if let Some(round) = conversation.snapshot().await.awaiting_human {
                return round;
            }
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_resolve_rounds() {
        assert_eq!(resolve_rounds(Some(3), 5), 3);
        assert_eq!(resolve_rounds(Some(0), 5), 5);
        assert_eq!(resolve_rounds(Some(-2), 5), 5);
        assert_eq!(resolve_rounds(None, 5), 5);
    }

    #[tokio::test]
    async fn test_start_requires_script() {
        let conversation = Conversation::new(Arc::new(FakeBackend::new(vec![])), timing());
        assert_eq!(conversation.start(Some(2)).await, Err(SessionError::ScriptMissing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_forest_clearing() {
        let backend = Arc::new(FakeBackend::new(vec![
            Scripted::human(),
            Scripted::ai("Hero"),
            Scripted::ai("Villain"),
        ]));
        let conversation = Conversation::new(backend.clone(), timing());
        conversation
            .record_script(&["Hero".to_string(), "Villain".to_string()])
            .await;

        let started = conversation.start(Some(2)).await.unwrap();
        assert_eq!(started.rounds, 2);
        assert_eq!(conversation.start(Some(2)).await, Err(SessionError::AlreadyActive));

        assert_eq!(wait_for_human(&conversation).await, 1);
        assert_eq!(conversation.resolve_human(UserAction::Speak, Some("Hello".into())), Ok(1));

        let snapshot = wait_until_idle(&conversation).await;
        assert_eq!(snapshot.message_count, 3);
        assert_eq!(snapshot.current_round, 2);
        assert_eq!(backend.next_speaker_rounds(), vec![1, 1, 2]);

        let turns = conversation.log().snapshot().await;
        assert_eq!(
            turns
                .iter()
                .map(|t| (t.kind, t.author.as_str(), t.round))
                .collect::<Vec<_>>(),
            vec![
                (shared_types::TurnKind::User, shared_types::HUMAN_AUTHOR, Some(1)),
                (shared_types::TurnKind::Ai, "Hero", Some(1)),
                (shared_types::TurnKind::Ai, "Villain", Some(2)),
            ]
        );
        assert_eq!(turns[0].content, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resolves_pending_human_turn() {
        let backend = Arc::new(FakeBackend::new(vec![Scripted::human()]));
        let conversation = Conversation::new(backend, timing());
        conversation.record_script(&["Hero".to_string()]).await;
        conversation.start(Some(5)).await.unwrap();

        wait_for_human(&conversation).await;
        assert!(conversation.stop().await);

        let snapshot = wait_until_idle(&conversation).await;
        assert_eq!(snapshot.awaiting_human, None);
        assert_eq!(snapshot.rounds.len(), 1);
        assert_eq!(
            conversation.resolve_human(UserAction::Skip, None),
            Err(HumanTurnError::NoPendingTurn)
        );
        assert!(!conversation.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_log_and_round_counter() {
        let backend = Arc::new(FakeBackend::new(vec![
            Scripted::ai("Hero"),
            Scripted::ai("Villain"),
            Scripted::ai("Hero"),
        ]));
        let conversation = Conversation::new(backend.clone(), timing());
        conversation.record_script(&["Hero".to_string(), "Villain".to_string()]).await;
        conversation.start(Some(2)).await.unwrap();
        let snapshot = wait_until_idle(&conversation).await;
        assert_eq!(snapshot.message_count, 2);

        conversation.mirror_clear().await;
        let snapshot = conversation.snapshot().await;
        assert_eq!(snapshot.message_count, 0);
        assert_eq!(snapshot.current_round, 0);
        assert!(snapshot.script_created);

        // A fresh run numbers rounds from 1 again.
        conversation.start(Some(1)).await.unwrap();
        let snapshot = wait_until_idle(&conversation).await;
        assert_eq!(snapshot.current_round, 1);
        let turns = conversation.log().snapshot().await;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].round, Some(1));
    }

    #[tokio::test]
    async fn test_empty_human_message_is_rejected() {
        let conversation = Conversation::new(Arc::new(FakeBackend::new(vec![])), timing());
        assert_eq!(
            conversation.resolve_human(UserAction::Speak, Some("  ".into())),
            Err(HumanTurnError::EmptyMessage)
        );
        assert_eq!(
            conversation.resolve_human(UserAction::Speak, Some("hi".into())),
            Err(HumanTurnError::NoPendingTurn)
        );
    }
}
