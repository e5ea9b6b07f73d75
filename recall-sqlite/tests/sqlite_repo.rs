use chrono::{NaiveDate, Utc};
use recall_core::{
    get_or_create_session, submit_answer, Card, CoreError, FsrsConfig, Rating, Repository,
    SessionOutcome, SessionStatus, StudySession, SubmitOutcome, Tier, UserProfile,
};
use recall_sqlite::SqliteRepo;

async fn repo_with_user(tier: Tier, cards: usize) -> (SqliteRepo, UserProfile) {
    let repo = SqliteRepo::open_memory().await.unwrap();
    let user = UserProfile::new("learner", tier);
    repo.create_user(&user).await.unwrap();
    for i in 0..cards {
        let card = Card::new(format!("q{i}"), format!("a{i}"));
        repo.add_card(&card).await.unwrap();
    }
    (repo, user)
}

#[tokio::test]
async fn end_to_end_session_round_trip() {
    let (repo, user) = repo_with_user(Tier::Free, 3).await;
    let now = Utc::now();

    let session = match get_or_create_session(&repo, user.id, None, now).await.unwrap() {
        SessionOutcome::Ready(s) => s,
        other => panic!("expected Ready, got {other:?}"),
    };
    assert_eq!(session.cards.len(), 3);

    for card_id in session.cards.clone() {
        let out = submit_answer(&repo, user.id, session.id, card_id, Rating::Good, 900, now)
            .await
            .unwrap();
        assert!(matches!(out, SubmitOutcome::Recorded { .. }));
    }

    let done = repo.get_session(session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.submitted_count, 3);

    let state = repo
        .get_card_state(user.id, session.cards[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.reps, 1);
    assert!(state.due_at.is_some());

    // Free tier: the one session for today is spent.
    match get_or_create_session(&repo, user.id, None, now).await.unwrap() {
        SessionOutcome::LimitReached { used, limit, .. } => {
            assert_eq!(used, 1);
            assert_eq!(limit, 1);
        }
        other => panic!("expected LimitReached, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_submission_is_rejected_by_the_index() {
    let (repo, user) = repo_with_user(Tier::Paid, 2).await;
    let now = Utc::now();

    let session = match get_or_create_session(&repo, user.id, None, now).await.unwrap() {
        SessionOutcome::Ready(s) => s,
        other => panic!("expected Ready, got {other:?}"),
    };
    let card_id = session.cards[0];

    let first = submit_answer(&repo, user.id, session.id, card_id, Rating::Easy, 500, now)
        .await
        .unwrap();
    assert!(matches!(first, SubmitOutcome::Recorded { .. }));
    let second = submit_answer(&repo, user.id, session.id, card_id, Rating::Easy, 500, now)
        .await
        .unwrap();
    assert!(matches!(second, SubmitOutcome::AlreadyRecorded));

    let reviews = repo.list_reviews_for_card(user.id, card_id).await.unwrap();
    assert_eq!(reviews.len(), 1);
}

#[tokio::test]
async fn one_open_session_per_user_day_and_filter() {
    let (repo, user) = repo_with_user(Tier::Paid, 1).await;
    let day = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
    let card = repo.list_cards(None).await.unwrap()[0].id;

    let first = StudySession::new(user.id, vec![card], None, 1, day);
    repo.insert_session(&first).await.unwrap();

    let second = StudySession::new(user.id, vec![card], None, 2, day);
    let err = repo.insert_session(&second).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let found = repo.find_open_session(user.id, day, None).await.unwrap();
    assert_eq!(found.unwrap().id, first.id);
}

#[tokio::test]
async fn config_parameter_bag_survives_round_trip() {
    let (repo, user) = repo_with_user(Tier::Paid, 0).await;

    let mut cfg = FsrsConfig::default();
    cfg.desired_retention = 0.85;
    cfg.daily_review_limit = Some(42);
    // Keys from a future algorithm revision must survive untouched.
    cfg.weights.insert("w19".to_string(), 0.123);
    repo.put_config(user.id, &cfg).await.unwrap();

    let loaded = repo.get_config(user.id).await.unwrap();
    assert_eq!(loaded.desired_retention, 0.85);
    assert_eq!(loaded.daily_review_limit, Some(42));
    assert_eq!(loaded.weights.get("w19"), Some(&0.123));
    assert_eq!(loaded.weights.len(), 20);

    // Absent user falls back to defaults.
    let other = UserProfile::new("other", Tier::Free);
    repo.create_user(&other).await.unwrap();
    let defaults = repo.get_config(other.id).await.unwrap();
    assert_eq!(defaults.desired_retention, 0.90);
}
