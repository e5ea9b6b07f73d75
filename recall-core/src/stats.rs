use crate::{Rating, ReviewEvent};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct Totals {
    pub total: u32,
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl Totals {
    pub fn record(&mut self, r: &Rating) {
        self.total += 1;
        match r {
            Rating::Again => self.again += 1,
            Rating::Hard => self.hard += 1,
            Rating::Good => self.good += 1,
            Rating::Easy => self.easy += 1,
        }
    }

    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.hard + self.good + self.easy) as f32 / self.total as f32
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatsSummary {
    pub totals: Totals,
    pub per_day: BTreeMap<NaiveDate, Totals>,
}

pub fn summarize(reviews: &[ReviewEvent]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    for r in reviews {
        summary.totals.record(&r.rating);
        let d = r.reviewed_at.date_naive();
        summary.per_day.entry(d).or_default().record(&r.rating);
    }
    summary
}

/// Consecutive days ending at `today` with at least one review. Derived from
/// the immutable review log rather than stored counters.
pub fn daily_streak(reviews: &[ReviewEvent], today: NaiveDate) -> u32 {
    let per_day = summarize(reviews).per_day;
    let mut streak = 0u32;
    let mut day = today;
    loop {
        if per_day.get(&day).map(|t| t.total > 0).unwrap_or(false) {
            streak += 1;
            day -= Duration::days(1);
        } else {
            break;
        }
    }
    streak
}
