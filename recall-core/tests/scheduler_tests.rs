use chrono::{Duration, Utc};
use recall_core::{
    apply_review, scheduler, CardMemoryState, CardState, CoreError, FsrsConfig, Rating,
};
use uuid::Uuid;

fn new_state() -> CardMemoryState {
    CardMemoryState::new_for(Uuid::new_v4(), Uuid::new_v4())
}

fn review_state(stability: f64, difficulty: f64, days_since_review: i64) -> CardMemoryState {
    let now = Utc::now();
    let mut s = new_state();
    s.state = CardState::Review;
    s.stability = stability;
    s.difficulty = difficulty;
    s.last_reviewed_at = Some(now - Duration::days(days_since_review));
    s.due_at = Some(now);
    s.reps = 3;
    s.total_reviews = 3;
    s.correct_reviews = 3;
    s
}

#[test]
fn new_card_again_enters_learning() {
    let now = Utc::now();
    let cfg = FsrsConfig::default();

    let out = apply_review(&new_state(), Rating::Again, now, 1500, &cfg).unwrap();
    let s = out.new_state;

    assert_eq!(s.state, CardState::Learning);
    assert_eq!(s.reps, 1);
    assert_eq!(s.lapses, 1);
    assert!(s.stability > 0.0);
    assert!(s.difficulty >= 1.0 && s.difficulty <= 10.0);

    // Due at the first learning step (default 1 minute).
    let due = s.due_at.unwrap();
    assert!(due > now && due <= now + Duration::minutes(2));

    assert_eq!(out.event.state_before, CardState::New);
    assert_eq!(out.event.reps_before, 0);
    assert_eq!(out.event.lapses_before, 0);
}

#[test]
fn review_card_good_grows_stability() {
    let now = Utc::now();
    let cfg = FsrsConfig::default();
    let before = review_state(5.0, 5.0, 5);

    let out = apply_review(&before, Rating::Good, now, 2000, &cfg).unwrap();
    let s = out.new_state;

    assert_eq!(s.state, CardState::Review);
    assert!(s.stability > 5.0);
    assert!((out.event.elapsed_days - 5.0).abs() < 0.1);

    // Next due tracks the new stability at the 0.90 retention target.
    let expected_days = s.stability.round() as i64;
    let due = s.due_at.unwrap();
    assert!(due >= now + Duration::days(expected_days - 1));
    assert!(due <= now + Duration::days(expected_days + 1));
}

#[test]
fn review_card_again_shrinks_stability() {
    let now = Utc::now();
    let cfg = FsrsConfig::default();
    let before = review_state(20.0, 5.0, 25);

    let out = apply_review(&before, Rating::Again, now, 3000, &cfg).unwrap();
    let s = out.new_state;

    assert_eq!(s.state, CardState::Relearning);
    assert!(s.stability < 20.0);
    assert_eq!(s.lapses, 1);
    // First relearning step, not a multi-day interval.
    assert!(s.due_at.unwrap() <= now + Duration::minutes(15));
}

#[test]
fn easy_outgrows_good_outgrows_hard() {
    let now = Utc::now();
    let cfg = FsrsConfig::default();
    let before = review_state(5.0, 5.0, 5);

    let hard = apply_review(&before, Rating::Hard, now, 1000, &cfg).unwrap();
    let good = apply_review(&before, Rating::Good, now, 1000, &cfg).unwrap();
    let easy = apply_review(&before, Rating::Easy, now, 1000, &cfg).unwrap();

    assert!(hard.new_state.stability < good.new_state.stability);
    assert!(good.new_state.stability < easy.new_state.stability);
}

#[test]
fn difficulty_stays_bounded_under_any_sequence() {
    let cfg = FsrsConfig::default();
    let mut now = Utc::now();

    let mut s = new_state();
    for _ in 0..50 {
        now += Duration::hours(1);
        s = apply_review(&s, Rating::Again, now, 1000, &cfg).unwrap().new_state;
        assert!(s.difficulty >= 1.0 && s.difficulty <= 10.0);
    }

    let mut s = new_state();
    for _ in 0..50 {
        now += Duration::days(3);
        s = apply_review(&s, Rating::Easy, now, 1000, &cfg).unwrap().new_state;
        assert!(s.difficulty >= 1.0 && s.difficulty <= 10.0);
    }
}

#[test]
fn due_never_exceeds_maximum_interval() {
    let now = Utc::now();
    let mut cfg = FsrsConfig::default();
    cfg.maximum_interval_days = 30;

    let before = review_state(100_000.0, 2.0, 365);
    let out = apply_review(&before, Rating::Easy, now, 1000, &cfg).unwrap();
    assert!(out.new_state.due_at.unwrap() <= now + Duration::days(30));
}

#[test]
fn counters_are_monotonic() {
    let cfg = FsrsConfig::default();
    let mut now = Utc::now();
    let mut s = new_state();

    let sequence = [
        Rating::Again,
        Rating::Good,
        Rating::Hard,
        Rating::Again,
        Rating::Easy,
    ];
    let mut prev_reps = 0;
    let mut prev_lapses = 0;
    for (i, rating) in sequence.iter().enumerate() {
        now += Duration::days(1);
        s = apply_review(&s, *rating, now, 1000, &cfg).unwrap().new_state;
        assert_eq!(s.reps, i as u32 + 1);
        assert!(s.reps > prev_reps);
        assert!(s.lapses >= prev_lapses);
        if *rating != Rating::Again {
            assert_eq!(s.lapses, prev_lapses);
        }
        prev_reps = s.reps;
        prev_lapses = s.lapses;
    }
    assert_eq!(s.total_reviews, 5);
    assert_eq!(s.correct_reviews, 3);
    assert_eq!(s.incorrect_reviews, 2);
}

#[test]
fn response_time_running_mean() {
    let cfg = FsrsConfig::default();
    let now = Utc::now();

    let s = new_state();
    let s = apply_review(&s, Rating::Good, now, 1000, &cfg).unwrap().new_state;
    assert_eq!(s.average_response_time_ms, 1000.0);

    let s = apply_review(&s, Rating::Good, now + Duration::days(3), 2000, &cfg)
        .unwrap()
        .new_state;
    assert_eq!(s.average_response_time_ms, 1500.0);
}

#[test]
fn rejects_bad_inputs() {
    let cfg = FsrsConfig::default();
    let now = Utc::now();

    assert!(matches!(
        apply_review(&new_state(), Rating::Good, now, 0, &cfg),
        Err(CoreError::Invalid(_))
    ));

    let mut suspended = new_state();
    suspended.state = CardState::Suspended;
    assert!(matches!(
        apply_review(&suspended, Rating::Good, now, 1000, &cfg),
        Err(CoreError::Invalid(_))
    ));

    assert!(Rating::from_score(4).is_none());
    assert!(Rating::from_score(-1).is_none());
    assert_eq!(Rating::from_score(2), Some(Rating::Good));
}

#[test]
fn interval_tracks_stability_at_default_retention() {
    let cfg = FsrsConfig::default();
    let days = scheduler::next_interval_days(5.0, 0.9, &cfg);
    assert!((4..=6).contains(&days));
}
