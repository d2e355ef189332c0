use shared_types::{Round, RoundStatus, SpeakerType};
use tracing::warn;
use uuid::Uuid;

/// The one conversation session of this process.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub session_id: Option<Uuid>,
    pub script_created: bool,
    pub active: bool,
    pub current_round: u32,
    /// Participant names, in the order the backend introduced them
    pub participants: Vec<String>,
    pub rounds: Vec<Round>,
}

impl SessionState {
    pub fn record_script(&mut self, characters: &[String]) {
        self.script_created = true;
        self.participants.clear();
        for name in characters {
            if !self.participants.contains(name) {
                self.participants.push(name.clone());
            }
        }
    }

    /// Mark a new run as active and forget the previous run's rounds.
    pub fn begin(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.session_id = Some(id);
        self.active = true;
        self.current_round = 0;
        self.rounds.clear();
        id
    }

    pub fn end(&mut self) {
        self.active = false;
    }

    /// Create round `index` in `pending`. Indices must follow on from the last.
    pub fn open_round(&mut self, index: u32) {
        let expected = self.rounds.last().map_or(1, |r| r.index + 1);
        if index != expected {
            warn!(index, expected, "round opened out of sequence");
        }
        self.current_round = index;
        self.rounds.push(Round::pending(index));
    }

    pub fn assign_speaker(&mut self, index: u32, speaker_type: SpeakerType, name: &str) {
        if let Some(round) = self.round_mut(index) {
            round.speaker_type = Some(speaker_type);
            round.speaker_name = Some(name.to_string());
        }
    }

    /// Apply a status change if the round's state machine allows it.
    pub fn transition(&mut self, index: u32, next: RoundStatus) -> bool {
        let Some(round) = self.round_mut(index) else {
            warn!(index, ?next, "transition for unknown round");
            return false;
        };
        let allowed = match (round.status, next) {
            (RoundStatus::Pending, RoundStatus::InProgress) => true,
            // A round can fail before anyone was chosen to speak.
            (RoundStatus::Pending, RoundStatus::Failed) => true,
            (RoundStatus::InProgress, s) => s.is_terminal(),
            _ => false,
        };
        if allowed {
            round.status = next;
        } else {
            warn!(index, from = ?round.status, to = ?next, "illegal round transition");
        }
        allowed
    }

    pub fn in_progress(&self) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.status == RoundStatus::InProgress)
            .count()
    }

    /// Local half of a history clear.
    pub fn reset_rounds(&mut self) {
        self.active = false;
        self.current_round = 0;
        self.rounds.clear();
    }

    fn round_mut(&mut self, index: u32) -> Option<&mut Round> {
        self.rounds.iter_mut().rev().find(|r| r.index == index)
    }
}
