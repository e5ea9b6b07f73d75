use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type CardId = Uuid;
pub type SessionId = Uuid;
pub type ReviewId = Uuid;

pub const SESSION_BATCH_SIZE: usize = 10;

pub const DIFFICULTY_MIN: f64 = 1.0;
pub const DIFFICULTY_MAX: f64 = 10.0;
pub const DIFFICULTY_DEFAULT: f64 = 5.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub fn as_score(&self) -> i32 {
        match self {
            Rating::Again => 0,
            Rating::Hard => 1,
            Rating::Good => 2,
            Rating::Easy => 3,
        }
    }

    pub fn from_score(score: i32) -> Option<Self> {
        match score {
            0 => Some(Rating::Again),
            1 => Some(Rating::Hard),
            2 => Some(Rating::Good),
            3 => Some(Rating::Easy),
            _ => None,
        }
    }

    pub fn is_correct(&self) -> bool {
        !matches!(self, Rating::Again)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
    Buried,
    Suspended,
}

impl CardState {
    /// Buried and Suspended cards never enter scheduling.
    pub fn is_schedulable(&self) -> bool {
        !matches!(self, CardState::Buried | CardState::Suspended)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Paid,
    Admin,
}

impl Tier {
    /// None means unlimited.
    pub fn daily_review_limit(&self) -> Option<u32> {
        match self {
            Tier::Free => Some(10),
            Tier::Paid | Tier::Admin => None,
        }
    }

    pub fn daily_session_limit(&self) -> Option<u32> {
        match self {
            Tier::Free => Some(1),
            Tier::Paid | Tier::Admin => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub tier: Tier,
    pub timezone: Tz,
    /// Hour (0..=23) at which the user's day rolls over for quota purposes.
    pub day_start_hour: u8,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tier,
            timezone: Tz::UTC,
            day_start_hour: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
    /// Slash-separated subject path, e.g. "math/algebra".
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            front: front.into(),
            back: back.into(),
            tags: Vec::new(),
            subject: None,
            created_at: Utc::now(),
        }
    }

    pub fn matches_subject(&self, filter: &str) -> bool {
        match &self.subject {
            Some(s) => s == filter || s.starts_with(&format!("{filter}/")),
            None => false,
        }
    }
}

/// Per user×card scheduling state. Materialized lazily with New defaults on
/// first review.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardMemoryState {
    pub user_id: UserId,
    pub card_id: CardId,
    pub state: CardState,
    pub stability: f64,
    pub difficulty: f64,
    pub due_at: Option<DateTime<Utc>>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub reps: u32,
    pub lapses: u32,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub incorrect_reviews: u32,
    pub average_response_time_ms: f64,
}

impl CardMemoryState {
    pub fn new_for(user_id: UserId, card_id: CardId) -> Self {
        Self {
            user_id,
            card_id,
            state: CardState::New,
            stability: 0.0,
            difficulty: DIFFICULTY_DEFAULT,
            due_at: None,
            last_reviewed_at: None,
            reps: 0,
            lapses: 0,
            total_reviews: 0,
            correct_reviews: 0,
            incorrect_reviews: 0,
            average_response_time_ms: 0.0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_schedulable()
            && self.state != CardState::New
            && self.due_at.map(|d| d <= now).unwrap_or(false)
    }
}

/// Immutable audit record of one submitted rating. Never updated or deleted;
/// elapsed-time computation for the next review depends on it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: ReviewId,
    pub user_id: UserId,
    pub card_id: CardId,
    /// None for legacy reviews recorded outside a session.
    pub session_id: Option<SessionId>,
    pub rating: Rating,
    pub response_time_ms: u32,
    pub state_before: CardState,
    pub state_after: CardState,
    pub stability_before: f64,
    pub stability_after: f64,
    pub difficulty_before: f64,
    pub difficulty_after: f64,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub elapsed_days: f64,
    pub scheduled_days: f64,
    pub reps_before: u32,
    pub lapses_before: u32,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Completed,
}

/// One study sitting: a fixed ordered batch of up to SESSION_BATCH_SIZE
/// cards captured at creation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudySession {
    pub id: SessionId,
    pub user_id: UserId,
    pub cards: Vec<CardId>,
    pub current_index: u32,
    pub submitted_count: u32,
    pub status: SessionStatus,
    pub subject_filter: Option<String>,
    pub seed: u64,
    /// User-local calendar day this session counts against.
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl StudySession {
    pub fn new(
        user_id: UserId,
        cards: Vec<CardId>,
        subject_filter: Option<String>,
        seed: u64,
        day: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            cards,
            current_index: 0,
            submitted_count: 0,
            status: SessionStatus::Created,
            subject_filter,
            seed,
            day,
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, card_id: CardId) -> bool {
        self.cards.contains(&card_id)
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}
