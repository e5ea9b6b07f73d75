use crate::{
    Card, CardId, CardMemoryState, CoreError, DailyUsage, FsrsConfig, ReviewEvent, SessionId,
    StudySession, UserId, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub mod memory;

/// The card/user store the scheduler core reads from and writes to.
///
/// Behavior never lives here: backends are plain CRUD plus the single
/// atomic `commit_review` step.
#[async_trait]
pub trait Repository: Send + Sync {
    // Users
    async fn create_user(&self, profile: &UserProfile) -> Result<(), CoreError>;
    async fn get_user(&self, id: UserId) -> Result<UserProfile, CoreError>;
    async fn list_users(&self) -> Result<Vec<UserProfile>, CoreError>;

    // Card content
    async fn add_card(&self, card: &Card) -> Result<(), CoreError>;
    async fn get_card(&self, id: CardId) -> Result<Card, CoreError>;
    async fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>, CoreError>;
    async fn list_cards(&self, subject: Option<&str>) -> Result<Vec<Card>, CoreError>;

    // Scheduling config
    /// Returns the documented defaults when the user has no stored config.
    async fn get_config(&self, user_id: UserId) -> Result<FsrsConfig, CoreError>;
    async fn put_config(&self, user_id: UserId, config: &FsrsConfig) -> Result<(), CoreError>;

    // Per-user card memory state
    /// Pre-seed or overwrite a state row (content provisioning); review
    /// submission goes through `commit_review` instead.
    async fn put_card_state(&self, state: &CardMemoryState) -> Result<(), CoreError>;
    async fn get_card_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardMemoryState>, CoreError>;

    /// Schedulable states with `due_at <= now`, most overdue first.
    async fn list_due_states(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        subject: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CardMemoryState>, CoreError>;

    /// Cards the user has no memory state for, oldest first. Ordering here
    /// is a stable fallback; the queue builder applies the seeded shuffle.
    async fn list_unseen_cards(
        &self,
        user_id: UserId,
        subject: Option<&str>,
    ) -> Result<Vec<CardId>, CoreError>;

    // Sessions
    async fn insert_session(&self, session: &StudySession) -> Result<(), CoreError>;
    async fn get_session(&self, id: SessionId) -> Result<StudySession, CoreError>;
    async fn update_session(&self, session: &StudySession) -> Result<(), CoreError>;
    async fn find_open_session(
        &self,
        user_id: UserId,
        day: NaiveDate,
        subject: Option<&str>,
    ) -> Result<Option<StudySession>, CoreError>;

    // Reviews
    async fn review_exists(
        &self,
        session_id: SessionId,
        card_id: CardId,
    ) -> Result<bool, CoreError>;
    async fn list_reviews_for_card(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Vec<ReviewEvent>, CoreError>;

    // Daily usage
    /// Zeroed aggregate when the user has not studied on `day`.
    async fn usage_for_day(&self, user_id: UserId, day: NaiveDate) -> Result<DailyUsage, CoreError>;
    async fn record_session_created(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<(), CoreError>;

    /// Persist one submitted answer: insert the review event, upsert the
    /// memory state, store the advanced session, and bump the daily review
    /// counter, all-or-nothing. A duplicate (session, card) pair must fail
    /// with Conflict and leave nothing applied.
    async fn commit_review(
        &self,
        session: &StudySession,
        state: &CardMemoryState,
        event: &ReviewEvent,
        day: NaiveDate,
    ) -> Result<(), CoreError>;
}
