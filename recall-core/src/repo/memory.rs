use crate::{
    Card, CardId, CardMemoryState, CoreError, DailyUsage, FsrsConfig, ReviewEvent, SessionId,
    SessionStatus, StudySession, UserId, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryRepo {
    users: RwLock<HashMap<UserId, UserProfile>>,
    cards: RwLock<HashMap<CardId, Card>>,
    configs: RwLock<HashMap<UserId, FsrsConfig>>,
    states: RwLock<HashMap<(UserId, CardId), CardMemoryState>>,
    sessions: RwLock<HashMap<SessionId, StudySession>>,
    reviews: RwLock<Vec<ReviewEvent>>,
    usage: RwLock<HashMap<(UserId, NaiveDate), DailyUsage>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn subject_matches(card: &Card, subject: Option<&str>) -> bool {
    match subject {
        Some(f) => card.matches_subject(f),
        None => true,
    }
}

#[async_trait]
impl crate::repo::Repository for MemoryRepo {
    async fn create_user(&self, profile: &UserProfile) -> Result<(), CoreError> {
        let mut m = self.users.write();
        if m.values().any(|u| u.name.eq_ignore_ascii_case(&profile.name)) {
            return Err(CoreError::Conflict("user name already exists"));
        }
        m.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<UserProfile, CoreError> {
        self.users
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("user"))
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>, CoreError> {
        Ok(self.users.read().values().cloned().collect())
    }

    async fn add_card(&self, card: &Card) -> Result<(), CoreError> {
        self.cards.write().insert(card.id, card.clone());
        Ok(())
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        self.cards
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("card"))
    }

    async fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>, CoreError> {
        let m = self.cards.read();
        Ok(ids.iter().filter_map(|id| m.get(id).cloned()).collect())
    }

    async fn list_cards(&self, subject: Option<&str>) -> Result<Vec<Card>, CoreError> {
        let mut v: Vec<Card> = self
            .cards
            .read()
            .values()
            .filter(|c| subject_matches(c, subject))
            .cloned()
            .collect();
        v.sort_by_key(|c| c.created_at);
        Ok(v)
    }

    async fn get_config(&self, user_id: UserId) -> Result<FsrsConfig, CoreError> {
        Ok(self
            .configs
            .read()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_config(&self, user_id: UserId, config: &FsrsConfig) -> Result<(), CoreError> {
        self.configs.write().insert(user_id, config.clone());
        Ok(())
    }

    async fn put_card_state(&self, state: &CardMemoryState) -> Result<(), CoreError> {
        self.states
            .write()
            .insert((state.user_id, state.card_id), state.clone());
        Ok(())
    }

    async fn get_card_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardMemoryState>, CoreError> {
        Ok(self.states.read().get(&(user_id, card_id)).cloned())
    }

    async fn list_due_states(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        subject: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CardMemoryState>, CoreError> {
        let cards = self.cards.read();
        let mut v: Vec<CardMemoryState> = self
            .states
            .read()
            .values()
            .filter(|s| s.user_id == user_id && s.is_due(now))
            .filter(|s| {
                cards
                    .get(&s.card_id)
                    .map(|c| subject_matches(c, subject))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        // Most overdue first.
        v.sort_by_key(|s| s.due_at);
        v.truncate(limit);
        Ok(v)
    }

    async fn list_unseen_cards(
        &self,
        user_id: UserId,
        subject: Option<&str>,
    ) -> Result<Vec<CardId>, CoreError> {
        let states = self.states.read();
        let mut v: Vec<Card> = self
            .cards
            .read()
            .values()
            .filter(|c| subject_matches(c, subject))
            .filter(|c| !states.contains_key(&(user_id, c.id)))
            .cloned()
            .collect();
        v.sort_by_key(|c| c.created_at);
        Ok(v.into_iter().map(|c| c.id).collect())
    }

    async fn insert_session(&self, session: &StudySession) -> Result<(), CoreError> {
        let mut m = self.sessions.write();
        let open_exists = m.values().any(|s| {
            s.user_id == session.user_id
                && s.day == session.day
                && s.subject_filter == session.subject_filter
                && s.status != SessionStatus::Completed
        });
        if open_exists {
            return Err(CoreError::Conflict("open session already exists"));
        }
        m.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<StudySession, CoreError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("session"))
    }

    async fn update_session(&self, session: &StudySession) -> Result<(), CoreError> {
        let mut m = self.sessions.write();
        if !m.contains_key(&session.id) {
            return Err(CoreError::NotFound("session"));
        }
        m.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_open_session(
        &self,
        user_id: UserId,
        day: NaiveDate,
        subject: Option<&str>,
    ) -> Result<Option<StudySession>, CoreError> {
        Ok(self
            .sessions
            .read()
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.day == day
                    && s.subject_filter.as_deref() == subject
                    && s.status != SessionStatus::Completed
            })
            .cloned())
    }

    async fn review_exists(
        &self,
        session_id: SessionId,
        card_id: CardId,
    ) -> Result<bool, CoreError> {
        Ok(self
            .reviews
            .read()
            .iter()
            .any(|r| r.session_id == Some(session_id) && r.card_id == card_id))
    }

    async fn list_reviews_for_card(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Vec<ReviewEvent>, CoreError> {
        Ok(self
            .reviews
            .read()
            .iter()
            .filter(|r| r.user_id == user_id && r.card_id == card_id)
            .cloned()
            .collect())
    }

    async fn usage_for_day(&self, user_id: UserId, day: NaiveDate) -> Result<DailyUsage, CoreError> {
        Ok(self
            .usage
            .read()
            .get(&(user_id, day))
            .cloned()
            .unwrap_or_else(|| DailyUsage::new(user_id, day)))
    }

    async fn record_session_created(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<(), CoreError> {
        let mut m = self.usage.write();
        m.entry((user_id, day))
            .or_insert_with(|| DailyUsage::new(user_id, day))
            .sessions += 1;
        Ok(())
    }

    async fn commit_review(
        &self,
        session: &StudySession,
        state: &CardMemoryState,
        event: &ReviewEvent,
        day: NaiveDate,
    ) -> Result<(), CoreError> {
        // All write locks held for the whole step: the uniqueness re-check
        // and every mutation happen under them, so a racing duplicate sees
        // Conflict and nothing is half-applied.
        let mut reviews = self.reviews.write();
        let mut states = self.states.write();
        let mut sessions = self.sessions.write();
        let mut usage = self.usage.write();

        if let Some(sid) = event.session_id {
            if reviews
                .iter()
                .any(|r| r.session_id == Some(sid) && r.card_id == event.card_id)
            {
                return Err(CoreError::Conflict("review already exists"));
            }
        }
        if !sessions.contains_key(&session.id) {
            return Err(CoreError::NotFound("session"));
        }

        reviews.push(event.clone());
        states.insert((state.user_id, state.card_id), state.clone());
        sessions.insert(session.id, session.clone());
        usage
            .entry((event.user_id, day))
            .or_insert_with(|| DailyUsage::new(event.user_id, day))
            .reviews += 1;
        Ok(())
    }
}
