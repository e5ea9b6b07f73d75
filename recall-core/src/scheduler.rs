use crate::{
    CardMemoryState, CardState, CoreError, FsrsConfig, Rating, ReviewEvent, DIFFICULTY_MAX,
    DIFFICULTY_MIN,
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

// FSRS power forgetting curve: R(t, S) = (1 + FACTOR * t / S) ^ DECAY.
const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;

const STABILITY_MIN: f64 = 0.01;

pub struct ReviewOutcome {
    pub new_state: CardMemoryState,
    pub event: ReviewEvent,
}

/// Probability of recall after `elapsed_days` at stability `stability`.
pub fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 + FACTOR * elapsed_days.max(0.0) / stability).powf(DECAY)
}

/// Days until retrievability decays to `retention`. At the default 0.90
/// target this is approximately the stability itself.
pub fn next_interval_days(stability: f64, retention: f64, config: &FsrsConfig) -> u32 {
    let raw = stability / FACTOR * (retention.powf(1.0 / DECAY) - 1.0);
    let days = raw.round().max(config.minimum_interval_days as f64);
    days.min(config.maximum_interval_days as f64) as u32
}

fn initial_stability(config: &FsrsConfig, rating: Rating) -> f64 {
    config.weight(rating.as_score() as usize).max(STABILITY_MIN)
}

fn initial_difficulty(config: &FsrsConfig, rating: Rating) -> f64 {
    let g = (rating.as_score() + 1) as f64;
    let d0 = config.weight(4) - (config.weight(5) * (g - 1.0)).exp() + 1.0;
    d0.clamp(DIFFICULTY_MIN, DIFFICULTY_MAX)
}

fn next_difficulty(config: &FsrsConfig, difficulty: f64, rating: Rating) -> f64 {
    let g = (rating.as_score() + 1) as f64;
    let delta = -config.weight(6) * (g - 3.0);
    // Linear damping, then mean reversion toward the Easy baseline.
    let damped = difficulty + delta * (DIFFICULTY_MAX - difficulty) / 9.0;
    let target = initial_difficulty(config, Rating::Easy);
    let w7 = config.weight(7);
    (w7 * target + (1.0 - w7) * damped).clamp(DIFFICULTY_MIN, DIFFICULTY_MAX)
}

fn stability_after_recall(
    config: &FsrsConfig,
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    rating: Rating,
) -> f64 {
    let hard_penalty = if rating == Rating::Hard {
        config.weight(15)
    } else {
        1.0
    };
    let easy_bonus = if rating == Rating::Easy {
        config.weight(16)
    } else {
        1.0
    };
    let growth = config.weight(8).exp()
        * (11.0 - difficulty)
        * stability.powf(-config.weight(9))
        * ((config.weight(10) * (1.0 - retrievability)).exp() - 1.0)
        * hard_penalty
        * easy_bonus;
    (stability * (1.0 + growth)).max(STABILITY_MIN)
}

fn stability_after_forget(
    config: &FsrsConfig,
    difficulty: f64,
    stability: f64,
    retrievability: f64,
) -> f64 {
    let s_forget = config.weight(11)
        * difficulty.powf(-config.weight(12))
        * ((stability + 1.0).powf(config.weight(13)) - 1.0)
        * (config.weight(14) * (1.0 - retrievability)).exp();
    // A lapse never leaves the card stronger than before, and the lapse
    // multiplier caps how much of the old stability survives.
    s_forget
        .min(stability * config.lapse_multiplier)
        .max(STABILITY_MIN)
}

/// Apply one rating to a card's memory state.
///
/// Pure given its inputs; `now` is read once by the caller and passed in.
/// Returns the replacement state plus the immutable review event with full
/// before/after snapshots.
pub fn apply_review(
    current: &CardMemoryState,
    rating: Rating,
    now: DateTime<Utc>,
    response_time_ms: u32,
    config: &FsrsConfig,
) -> Result<ReviewOutcome, CoreError> {
    if response_time_ms == 0 {
        return Err(CoreError::Invalid("response time must be positive"));
    }
    if !current.state.is_schedulable() {
        return Err(CoreError::Invalid("card is buried or suspended"));
    }

    let elapsed_days = current
        .last_reviewed_at
        .map(|t| seconds_to_days((now - t).num_seconds()))
        .unwrap_or(0.0);
    let scheduled_days = match (current.due_at, current.last_reviewed_at) {
        (Some(due), Some(last)) => seconds_to_days((due - last).num_seconds()),
        _ => 0.0,
    };

    let first_review = current.stability <= 0.0;
    let r = retrievability(elapsed_days, current.stability);

    let mut next = current.clone();

    match rating {
        Rating::Again => {
            next.lapses = current.lapses.saturating_add(1);
            next.stability = if first_review {
                initial_stability(config, Rating::Again)
            } else {
                stability_after_forget(config, current.difficulty, current.stability, r)
            };
            next.difficulty = if first_review {
                initial_difficulty(config, Rating::Again)
            } else {
                next_difficulty(config, current.difficulty, Rating::Again)
            };
            let step_minutes = if current.state == CardState::New {
                next.state = CardState::Learning;
                config.first_learning_step_minutes()
            } else {
                next.state = CardState::Relearning;
                config.first_relearning_step_minutes()
            };
            next.due_at = Some(now + Duration::minutes(step_minutes));
        }
        Rating::Hard | Rating::Good | Rating::Easy => {
            next.stability = if first_review {
                initial_stability(config, rating)
            } else {
                stability_after_recall(config, current.difficulty, current.stability, r, rating)
            };
            next.difficulty = if current.state == CardState::New {
                initial_difficulty(config, rating)
            } else {
                next_difficulty(config, current.difficulty, rating)
            };
            next.state = CardState::Review;

            let mut interval = next_interval_days(next.stability, config.desired_retention, config);
            if current.state == CardState::New {
                let floor = match rating {
                    Rating::Easy => config.easy_interval_days,
                    _ => config.graduating_interval_days,
                };
                interval = interval.max(floor).min(config.maximum_interval_days);
            }
            next.due_at = Some(now + Duration::days(interval as i64));
        }
    }

    // Interval clamps above keep the promise, but a pathological config
    // (max < min) must still honor the hard cap.
    let cap = now + Duration::days(config.maximum_interval_days as i64);
    if next.due_at.map(|d| d > cap).unwrap_or(false) {
        next.due_at = Some(cap);
    }

    next.reps = current.reps.saturating_add(1);
    next.total_reviews = current.total_reviews.saturating_add(1);
    if rating.is_correct() {
        next.correct_reviews = current.correct_reviews.saturating_add(1);
    } else {
        next.incorrect_reviews = current.incorrect_reviews.saturating_add(1);
    }
    next.average_response_time_ms = incremental_mean(
        current.average_response_time_ms,
        current.total_reviews,
        response_time_ms,
    );
    next.last_reviewed_at = Some(now);

    let event = ReviewEvent {
        id: Uuid::new_v4(),
        user_id: current.user_id,
        card_id: current.card_id,
        session_id: None,
        rating,
        response_time_ms,
        state_before: current.state,
        state_after: next.state,
        stability_before: current.stability,
        stability_after: next.stability,
        difficulty_before: current.difficulty,
        difficulty_after: next.difficulty,
        due_before: current.due_at,
        due_after: next.due_at,
        elapsed_days,
        scheduled_days,
        reps_before: current.reps,
        lapses_before: current.lapses,
        reviewed_at: now,
    };

    Ok(ReviewOutcome {
        new_state: next,
        event,
    })
}

fn seconds_to_days(secs: i64) -> f64 {
    (secs.max(0) as f64) / 86_400.0
}

fn incremental_mean(old_avg: f64, old_count: u32, sample: u32) -> f64 {
    if old_count == 0 {
        sample as f64
    } else {
        (old_avg * old_count as f64 + sample as f64) / (old_count as f64 + 1.0)
    }
}
