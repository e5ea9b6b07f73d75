use crate::{
    quota, scheduler, CardId, CardMemoryState, CoreError, Rating, Repository, ReviewId, SessionId,
    SessionStatus, StudySession, Tier, UserId, SESSION_BATCH_SIZE,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Result of asking for a session. Quota exhaustion and an empty card pool
/// are routine outcomes the caller must branch on, not errors.
#[derive(Clone, Debug)]
pub enum SessionOutcome {
    Ready(StudySession),
    LimitReached { tier: Tier, used: u32, limit: u32 },
    NoCards,
}

#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    Recorded {
        review_id: ReviewId,
        new_state: CardMemoryState,
        progress: SessionProgress,
    },
    /// A review for this (session, card) pair was already recorded.
    AlreadyRecorded,
    DailyLimitReached { tier: Tier, used: u32, limit: u32 },
}

#[derive(Clone, Copy, Debug)]
pub struct SessionProgress {
    pub submitted_count: u32,
    pub max_cards: u32,
    pub completed: bool,
}

/// Return the user's same-day incomplete session for this filter, or build a
/// fresh batch: due cards most-overdue-first, then unseen cards in
/// seed-shuffled order, capped at SESSION_BATCH_SIZE.
pub async fn get_or_create_session(
    repo: &dyn Repository,
    user_id: UserId,
    subject_filter: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SessionOutcome, CoreError> {
    let profile = repo.get_user(user_id).await?;
    let config = repo.get_config(user_id).await?;
    let day = quota::local_day(&profile, now);

    // Resumability: a reload must not hand out a fresh batch.
    if let Some(existing) = repo.find_open_session(user_id, day, subject_filter).await? {
        return Ok(SessionOutcome::Ready(existing));
    }

    let usage = repo.usage_for_day(user_id, day).await?;
    if let Some(q) = quota::check_session_quota(&profile, &usage) {
        return Ok(SessionOutcome::LimitReached {
            tier: profile.tier,
            used: q.used,
            limit: q.limit,
        });
    }
    if let Some(q) = quota::check_review_quota(&profile, &config, &usage) {
        return Ok(SessionOutcome::LimitReached {
            tier: profile.tier,
            used: q.used,
            limit: q.limit,
        });
    }

    let due = repo
        .list_due_states(user_id, now, subject_filter, SESSION_BATCH_SIZE)
        .await?;
    let mut batch: Vec<CardId> = due.iter().map(|s| s.card_id).collect();

    let seed: u64 = rand::random();
    if batch.len() < SESSION_BATCH_SIZE {
        let mut unseen = repo.list_unseen_cards(user_id, subject_filter).await?;
        unseen.retain(|id| !batch.contains(id));
        // Session-seeded shuffle keeps the new-card order reproducible from
        // the recorded seed.
        let mut rng = StdRng::seed_from_u64(seed);
        unseen.shuffle(&mut rng);

        let mut slots = SESSION_BATCH_SIZE - batch.len();
        if let Some(new_cap) = config.daily_new_limit {
            slots = slots.min(new_cap as usize);
        }
        batch.extend(unseen.into_iter().take(slots));
    }

    if batch.is_empty() {
        return Ok(SessionOutcome::NoCards);
    }

    let session = StudySession::new(
        user_id,
        batch,
        subject_filter.map(str::to_string),
        seed,
        day,
    );
    match repo.insert_session(&session).await {
        Ok(()) => {}
        Err(CoreError::Conflict(_)) => {
            // Lost a same-day creation race: hand back the winner's session.
            if let Some(existing) = repo.find_open_session(user_id, day, subject_filter).await? {
                return Ok(SessionOutcome::Ready(existing));
            }
            return Err(CoreError::Conflict("session creation raced"));
        }
        Err(e) => return Err(e),
    }
    repo.record_session_created(user_id, day).await?;

    Ok(SessionOutcome::Ready(session))
}

/// Replace the batch order with a caller-supplied permutation and activate
/// the session. The new order must be the exact multiset of the original
/// card IDs.
pub async fn finalize_session_order(
    repo: &dyn Repository,
    user_id: UserId,
    session_id: SessionId,
    order: &[CardId],
) -> Result<StudySession, CoreError> {
    let mut session = repo.get_session(session_id).await?;
    if session.user_id != user_id {
        return Err(CoreError::Unauthorized("session belongs to another user"));
    }
    if session.status != SessionStatus::Created {
        return Err(CoreError::Conflict("session order already finalized"));
    }
    if !is_permutation(&session.cards, order) {
        return Err(CoreError::Invalid("order is not a permutation of the batch"));
    }

    session.cards = order.to_vec();
    session.status = SessionStatus::Active;
    repo.update_session(&session).await?;
    Ok(session)
}

/// Record one rating for a card in an open session.
///
/// Runs every check before any data is touched: ownership, membership,
/// duplicate (session, card), and the daily review cap (re-checked here,
/// not just at session creation, so a long-lived session cannot outrun the
/// quota). Persistence goes through the repo's atomic commit.
pub async fn submit_answer(
    repo: &dyn Repository,
    user_id: UserId,
    session_id: SessionId,
    card_id: CardId,
    rating: Rating,
    response_time_ms: u32,
    now: DateTime<Utc>,
) -> Result<SubmitOutcome, CoreError> {
    let mut session = repo.get_session(session_id).await?;
    if session.user_id != user_id {
        return Err(CoreError::Unauthorized("session belongs to another user"));
    }
    if session.status == SessionStatus::Completed {
        return Err(CoreError::Conflict("session already completed"));
    }
    if !session.contains(card_id) {
        return Err(CoreError::NotFound("card not in session"));
    }

    if repo.review_exists(session_id, card_id).await? {
        return Ok(SubmitOutcome::AlreadyRecorded);
    }

    let profile = repo.get_user(user_id).await?;
    let config = repo.get_config(user_id).await?;
    let day = quota::local_day(&profile, now);
    let usage = repo.usage_for_day(user_id, day).await?;
    if let Some(q) = quota::check_review_quota(&profile, &config, &usage) {
        return Ok(SubmitOutcome::DailyLimitReached {
            tier: profile.tier,
            used: q.used,
            limit: q.limit,
        });
    }

    let current = repo
        .get_card_state(user_id, card_id)
        .await?
        .unwrap_or_else(|| CardMemoryState::new_for(user_id, card_id));

    let outcome = scheduler::apply_review(&current, rating, now, response_time_ms, &config)?;
    let mut event = outcome.event;
    event.session_id = Some(session_id);

    if session.status == SessionStatus::Created {
        session.status = SessionStatus::Active;
    }
    session.submitted_count += 1;
    session.current_index = session.submitted_count.min(session.cards.len() as u32);
    if session.submitted_count as usize >= session.cards.len() {
        session.status = SessionStatus::Completed;
    }

    match repo
        .commit_review(&session, &outcome.new_state, &event, day)
        .await
    {
        Ok(()) => {}
        // Lost the per-card race: the winner's review stands.
        Err(CoreError::Conflict(_)) => return Ok(SubmitOutcome::AlreadyRecorded),
        Err(e) => return Err(e),
    }

    Ok(SubmitOutcome::Recorded {
        review_id: event.id,
        new_state: outcome.new_state,
        progress: SessionProgress {
            submitted_count: session.submitted_count,
            max_cards: session.cards.len() as u32,
            completed: session.status == SessionStatus::Completed,
        },
    })
}

fn is_permutation(original: &[CardId], candidate: &[CardId]) -> bool {
    if original.len() != candidate.len() {
        return false;
    }
    let mut a = original.to_vec();
    let mut b = candidate.to_vec();
    a.sort();
    b.sort();
    a == b
}
