//! Shared types between the director, the script backend and the UI
//!
//! These types are used by:
//! - the director (proxy + turn scheduler, native Rust)
//! - the script backend's HTTP API (JSON bodies)
//! - the UI collaborator (exported TypeScript)
//!
//! Backend route bodies keep the backend's field casing (`sceneDescription`,
//! `next_speaker`, ...). The local `/session/*` surface is camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Conversation Record
// ============================================================================

/// Who a speaker is, as reported by the backend's turn-order policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub enum SpeakerType {
    /// The human participant. The backend historically says `"user"`.
    #[serde(rename = "human", alias = "user")]
    Human,
    #[serde(rename = "ai")]
    Ai,
}

/// Kind of a recorded turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub enum TurnKind {
    User,
    Ai,
    /// Diagnostics: failed rounds, unreachable backend, ...
    System,
}

/// One recorded utterance. Immutable once appended to the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct Turn {
    /// Unique turn ID (ULID)
    pub id: String,
    pub author: String,
    pub content: String,
    pub kind: TurnKind,
    pub timestamp: DateTime<Utc>,
    /// Round the turn belongs to, if it was produced inside one
    pub round: Option<u32>,
}

impl Turn {
    pub fn new(kind: TurnKind, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            author: author.into(),
            content: content.into(),
            kind,
            timestamp: Utc::now(),
            round: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnKind::User, HUMAN_AUTHOR, content)
    }

    pub fn ai(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(TurnKind::Ai, speaker, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnKind::System, SYSTEM_AUTHOR, content)
    }

    pub fn in_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }
}

/// Lifecycle of a single round: `pending -> inProgress -> {completed|skipped|failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub enum RoundStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl RoundStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }
}

/// One iteration of the conversation protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct Round {
    /// 1-based, strictly increasing by one
    pub index: u32,
    /// Unknown until the backend has answered "who speaks next"
    pub speaker_type: Option<SpeakerType>,
    pub speaker_name: Option<String>,
    pub status: RoundStatus,
}

impl Round {
    pub fn pending(index: u32) -> Self {
        Self {
            index,
            speaker_type: None,
            speaker_name: None,
            status: RoundStatus::Pending,
        }
    }
}

// ============================================================================
// Backend Route Bodies
// ============================================================================

/// Body of a failed call on any route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct ApiFailure {
    pub success: bool,
    pub error: String,
}

impl ApiFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// POST /api/create-script
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct CreateScriptRequest {
    #[serde(rename = "sceneDescription")]
    pub scene_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct CreateScriptResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<ScriptData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct ScriptData {
    #[serde(default)]
    pub scene: String,
    /// Participant names in the order the backend introduced them
    #[serde(default)]
    pub characters: Vec<String>,
}

/// POST /api/send-message
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub round: u32,
}

/// Answer to a free message sent outside a round
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct SendMessageResponse {
    pub success: bool,
    /// The AI character's reply
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// POST /api/next-speaker
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct NextSpeakerRequest {
    pub round: u32,
    pub situation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct NextSpeakerResponse {
    pub success: bool,
    #[serde(default)]
    pub next_speaker: Option<String>,
    #[serde(default)]
    pub speaker_type: Option<SpeakerType>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What the human did with their turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub enum UserAction {
    Speak,
    Skip,
}

/// POST /api/user-speak
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct UserSpeakRequest {
    pub message: String,
    pub round: u32,
    pub action: UserAction,
}

/// POST /api/ai-speak
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct AiSpeakRequest {
    pub speaker: String,
    pub round: u32,
    pub situation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct AiSpeakResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Generic `{success, error?}` envelope used for pass-through routes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// Session Control Surface
// ============================================================================

/// POST /session/start
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct StartSessionRequest {
    #[serde(default)]
    pub rounds: Option<i64>,
}

/// POST /session/human-turn
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct HumanTurnRequest {
    pub action: UserAction,
    #[serde(default)]
    pub message: Option<String>,
}

/// GET /session/state
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub script_created: bool,
    pub active: bool,
    pub current_round: u32,
    pub participants: Vec<String>,
    /// Round index the scheduler is waiting on the human for
    pub awaiting_human: Option<u32>,
    pub message_count: usize,
    pub rounds: Vec<Round>,
}

/// GET /session/backend
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../ui-bindings/generated.ts")]
pub struct BackendSnapshot {
    pub ready: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub port: u16,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_exit_code: Option<i32>,
    pub restart_count: u32,
}

pub const HUMAN_AUTHOR: &str = "me";
pub const SYSTEM_AUTHOR: &str = "system";
/// Author used when a reply does not name its speaker
pub const ASSISTANT_AUTHOR: &str = "AI assistant";

// ============================================================================
// Tests
// ============================================================================
