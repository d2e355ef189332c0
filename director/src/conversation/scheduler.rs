//! Round-based turn scheduler.
//!
//! One run plays rounds `1..=N` strictly in order. Every round asks the
//! backend who speaks next; a human turn waits on the rendezvous slot and may
//! be followed by one AI sub-turn in the same round. Failures are recorded as
//! `system` turns and never end the run; only cancellation does.

use std::sync::Arc;

use shared_types::{
    AiSpeakRequest, NextSpeakerRequest, RoundStatus, SpeakerType, Turn, UserAction,
    UserSpeakRequest,
};
use tokio::{sync::Mutex, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::human::{HumanResolution, HumanTurnSlot, SkipReason};
use super::{ConversationLog, SessionState, TurnBackend, TurnError};
use crate::config::SchedulerTiming;

/// Whom the backend picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextSpeaker {
    Human { name: String },
    Ai { name: String },
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds_played: u32,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct TurnScheduler {
    pub(super) backend: Arc<dyn TurnBackend>,
    pub(super) log: ConversationLog,
    pub(super) session: Arc<Mutex<SessionState>>,
    pub(super) human: HumanTurnSlot,
    pub(super) timing: SchedulerTiming,
}

impl TurnScheduler {
    pub async fn run(&self, rounds: u32, cancel: CancellationToken) -> RunSummary {
        info!(rounds, "conversation run started");
        let mut played = 0;
        let mut cancelled = false;

        for index in 1..=rounds {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.session.lock().await.open_round(index);
            let status = self.play_round(index, &cancel).await;
            self.settle(index, status).await;
            played = index;

            if index < rounds {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = sleep(self.timing.round_pause) => {}
                }
            }
        }

        self.session.lock().await.end();
        info!(rounds_played = played, cancelled, "conversation run finished");
        RunSummary {
            rounds_played: played,
            cancelled,
        }
    }

    async fn play_round(&self, index: u32, cancel: &CancellationToken) -> RoundStatus {
        let situation = situation_for(index);

        let speaker = match self.next_speaker(index, &situation).await {
            Ok(speaker) => speaker,
            Err(e) => {
                self.report(index, format!("Round {index} failed: {e}")).await;
                return RoundStatus::Failed;
            }
        };

        match speaker {
            NextSpeaker::Ai { name } => {
                self.begin(index, SpeakerType::Ai, &name).await;
                self.ai_turn(index, &name, &situation).await
            }
            NextSpeaker::Human { name } => {
                self.begin(index, SpeakerType::Human, &name).await;
                self.human_round(index, &situation, cancel).await
            }
        }
    }

    /// Human sub-turn, then at most one trailing AI sub-turn.
    async fn human_round(
        &self,
        index: u32,
        situation: &str,
        cancel: &CancellationToken,
    ) -> RoundStatus {
        let wait = self.human.open(index);
        let resolution = wait.wait(self.timing.human_turn_timeout, cancel).await;

        let spoke = match resolution {
            HumanResolution::Speak(message) => {
                self.log.append(Turn::user(message.clone()).in_round(index)).await;
                let request = UserSpeakRequest {
                    message,
                    round: index,
                    action: UserAction::Speak,
                };
                if let Err(e) = self.user_speak(request).await {
                    self.report(index, format!("Round {index}: your line was not delivered: {e}"))
                        .await;
                    return RoundStatus::Failed;
                }
                true
            }
            HumanResolution::Skip(SkipReason::Cancelled) => return RoundStatus::Skipped,
            HumanResolution::Skip(reason) => {
                info!(round = index, ?reason, "human skipped their turn");
                let request = UserSpeakRequest {
                    message: String::new(),
                    round: index,
                    action: UserAction::Skip,
                };
                if let Err(e) = self.user_speak(request).await {
                    self.report(index, format!("Round {index}: skip was not delivered: {e}"))
                        .await;
                    return RoundStatus::Failed;
                }
                false
            }
        };

        let human_outcome = if spoke {
            RoundStatus::Completed
        } else {
            RoundStatus::Skipped
        };
        if cancel.is_cancelled() {
            return human_outcome;
        }

        match self.next_speaker(index, situation).await {
            Ok(NextSpeaker::Ai { name }) => {
                self.session
                    .lock()
                    .await
                    .assign_speaker(index, SpeakerType::Ai, &name);
                self.ai_turn(index, &name, situation).await
            }
            // Round is closed once the backend stops naming an AI speaker.
            Ok(NextSpeaker::Human { .. }) => human_outcome,
            Err(e) => {
                self.report(index, format!("Round {index}: could not pick a follow-up speaker: {e}"))
                    .await;
                RoundStatus::Failed
            }
        }
    }

    async fn ai_turn(&self, index: u32, speaker: &str, situation: &str) -> RoundStatus {
        let request = AiSpeakRequest {
            speaker: speaker.to_string(),
            round: index,
            situation: situation.to_string(),
        };
        let outcome = match self.backend.ai_speak(request).await {
            Ok(res) if res.success => res
                .message
                .ok_or_else(|| TurnError::Malformed("ai-speak returned no message".to_string())),
            Ok(res) => Err(TurnError::Backend(
                res.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(message) => {
                info!(round = index, speaker, "ai turn completed");
                self.log.append(Turn::ai(speaker, message).in_round(index)).await;
                RoundStatus::Completed
            }
            Err(e) => {
                self.report(index, format!("{speaker} failed to speak in round {index}: {e}"))
                    .await;
                RoundStatus::Failed
            }
        }
    }

    async fn next_speaker(&self, index: u32, situation: &str) -> Result<NextSpeaker, TurnError> {
        let res = self
            .backend
            .next_speaker(NextSpeakerRequest {
                round: index,
                situation: situation.to_string(),
            })
            .await?;

        if !res.success {
            return Err(TurnError::Backend(
                res.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let name = res.next_speaker.unwrap_or_default();
        match res.speaker_type {
            Some(SpeakerType::Human) => Ok(NextSpeaker::Human { name }),
            Some(SpeakerType::Ai) if !name.trim().is_empty() => Ok(NextSpeaker::Ai { name }),
            Some(SpeakerType::Ai) => Err(TurnError::Malformed(
                "next-speaker named an AI turn without a speaker".to_string(),
            )),
            None => Err(TurnError::Malformed(
                "next-speaker response has no speaker_type".to_string(),
            )),
        }
    }

    async fn user_speak(&self, request: UserSpeakRequest) -> Result<(), TurnError> {
        let ack = self.backend.user_speak(request).await?;
        if ack.success {
            Ok(())
        } else {
            Err(TurnError::Backend(
                ack.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    async fn begin(&self, index: u32, speaker_type: SpeakerType, name: &str) {
        let mut session = self.session.lock().await;
        session.assign_speaker(index, speaker_type, name);
        session.transition(index, RoundStatus::InProgress);
    }

    async fn settle(&self, index: u32, status: RoundStatus) {
        self.session.lock().await.transition(index, status);
    }

    /// Every failure ends up in the log as a system turn.
    async fn report(&self, index: u32, message: String) {
        warn!(round = index, "{message}");
        self.log.append(Turn::system(message).in_round(index)).await;
    }
}

pub fn situation_for(index: u32) -> String {
    format!("This is round {index}")
}
