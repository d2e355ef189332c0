//! Scripted `TurnBackend` for scheduler tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use shared_types::{
    Ack, AiSpeakRequest, AiSpeakResponse, NextSpeakerRequest, NextSpeakerResponse, SpeakerType,
    UserAction, UserSpeakRequest,
};

use super::TurnBackend;
use crate::proxy::ProxyError;

/// One answer to a next-speaker call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Human,
    Ai(String),
    Fail,
}

impl Scripted {
    pub fn human() -> Self {
        Scripted::Human
    }

    pub fn ai(name: &str) -> Self {
        Scripted::Ai(name.to_string())
    }
}

#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<VecDeque<Scripted>>,
    failing_ai: Option<String>,
    next_speaker_calls: Mutex<Vec<u32>>,
    user_calls: Mutex<Vec<(u32, UserAction)>>,
}

impl FakeBackend {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn failing_ai(mut self, speaker: &str) -> Self {
        self.failing_ai = Some(speaker.to_string());
        self
    }

    pub fn next_speaker_rounds(&self) -> Vec<u32> {
        self.next_speaker_calls.lock().unwrap().clone()
    }

    pub fn user_actions(&self) -> Vec<(u32, UserAction)> {
        self.user_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnBackend for FakeBackend {
    async fn next_speaker(&self, request: NextSpeakerRequest) -> Result<NextSpeakerResponse, ProxyError> {
        self.next_speaker_calls.lock().unwrap().push(request.round);
        let next = self.script.lock().unwrap().pop_front();
        let (speaker_type, name) = match next {
            Some(Scripted::Human) => (SpeakerType::Human, "me".to_string()),
            Some(Scripted::Ai(name)) => (SpeakerType::Ai, name),
            Some(Scripted::Fail) | None => return Err(ProxyError::BackendUnavailable),
        };
        Ok(NextSpeakerResponse {
            success: true,
            next_speaker: Some(name),
            speaker_type: Some(speaker_type),
            action: None,
            error: None,
        })
    }

    async fn user_speak(&self, request: UserSpeakRequest) -> Result<Ack, ProxyError> {
        self.user_calls
            .lock()
            .unwrap()
            .push((request.round, request.action));
        Ok(Ack {
            success: true,
            error: None,
        })
    }

    async fn ai_speak(&self, request: AiSpeakRequest) -> Result<AiSpeakResponse, ProxyError> {
        if self.failing_ai.as_deref() == Some(request.speaker.as_str()) {
            return Ok(AiSpeakResponse {
                success: false,
                message: None,
                error: Some("character agent not found".to_string()),
            });
        }
        Ok(AiSpeakResponse {
            success: true,
            message: Some(format!("{} speaks in round {}", request.speaker, request.round)),
            error: None,
        })
    }
}
