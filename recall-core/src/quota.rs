use crate::{FsrsConfig, UserId, UserProfile};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-user daily usage aggregate, keyed by the user-local calendar day.
/// Incremented in the same transaction as the review insert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyUsage {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub reviews: u32,
    pub sessions: u32,
}

impl DailyUsage {
    pub fn new(user_id: UserId, day: NaiveDate) -> Self {
        Self {
            user_id,
            day,
            reviews: 0,
            sessions: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub used: u32,
    pub limit: u32,
}

/// The user's current calendar day for quota purposes, honoring their
/// configured timezone and day-start hour (not UTC midnight).
pub fn local_day(profile: &UserProfile, now: DateTime<Utc>) -> NaiveDate {
    let local = now.with_timezone(&profile.timezone);
    (local - Duration::hours(profile.day_start_hour as i64)).date_naive()
}

/// Config override takes precedence over the tier default. None = unlimited.
pub fn review_limit(profile: &UserProfile, config: &FsrsConfig) -> Option<u32> {
    config
        .daily_review_limit
        .or_else(|| profile.tier.daily_review_limit())
}

pub fn session_limit(profile: &UserProfile) -> Option<u32> {
    profile.tier.daily_session_limit()
}

pub fn check_review_quota(
    profile: &UserProfile,
    config: &FsrsConfig,
    usage: &DailyUsage,
) -> Option<QuotaExceeded> {
    match review_limit(profile, config) {
        Some(limit) if usage.reviews >= limit => Some(QuotaExceeded {
            used: usage.reviews,
            limit,
        }),
        _ => None,
    }
}

pub fn check_session_quota(profile: &UserProfile, usage: &DailyUsage) -> Option<QuotaExceeded> {
    match session_limit(profile) {
        Some(limit) if usage.sessions >= limit => Some(QuotaExceeded {
            used: usage.sessions,
            limit,
        }),
        _ => None,
    }
}
