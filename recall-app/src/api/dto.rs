use chrono::{DateTime, Utc};
use recall_core::{SessionStatus, StudySession, Tier};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SessionIn {
    pub subject: Option<String>,
}

#[derive(Serialize)]
pub struct SessionOut {
    pub success: bool,
    pub session_id: Uuid,
    pub cards: Vec<Uuid>,
    pub max_cards: u32,
    pub current_index: u32,
    pub submitted_count: u32,
    pub status: String,
}

impl SessionOut {
    pub fn from_session(s: &StudySession) -> Self {
        Self {
            success: true,
            session_id: s.id,
            max_cards: s.cards.len() as u32,
            cards: s.cards.clone(),
            current_index: s.current_index,
            submitted_count: s.submitted_count,
            status: status_str(s.status).to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct LimitOut {
    pub success: bool,
    pub limit_reached: bool,
    pub tier: Tier,
    pub used_today: u32,
    pub limit: u32,
}

#[derive(Serialize)]
pub struct MessageOut {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Deserialize)]
pub struct OrderIn {
    pub cards: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct AnswerIn {
    pub card_id: Uuid,
    pub rating: i32,
    pub response_time_ms: u32,
}

#[derive(Serialize)]
pub struct SessionProgressOut {
    pub submitted_count: u32,
    pub max_cards: u32,
    pub completed: bool,
}

#[derive(Serialize)]
pub struct AnswerOut {
    pub success: bool,
    pub review_id: Uuid,
    pub new_state: String,
    pub new_due_at: Option<DateTime<Utc>>,
    pub session_progress: SessionProgressOut,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct CardOut {
    pub id: Uuid,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
    pub subject: Option<String>,
}

pub fn status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Created => "created",
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
    }
}
