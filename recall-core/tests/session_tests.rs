use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use recall_core::{
    get_or_create_session, finalize_session_order, submit_answer, Card, CardId, CardMemoryState,
    CardState, CoreError, MemoryRepo, Rating, Repository, SessionOutcome, SessionStatus,
    SubmitOutcome, Tier, UserProfile, SESSION_BATCH_SIZE,
};

async fn setup(tier: Tier, card_count: usize) -> (MemoryRepo, UserProfile, Vec<CardId>) {
    let repo = MemoryRepo::new();
    let user = UserProfile::new("learner", tier);
    repo.create_user(&user).await.unwrap();

    let base = Utc::now();
    let mut ids = Vec::new();
    for i in 0..card_count {
        let mut card = Card::new(format!("q{i}"), format!("a{i}"));
        card.created_at = base + Duration::seconds(i as i64);
        ids.push(card.id);
        repo.add_card(&card).await.unwrap();
    }
    (repo, user, ids)
}

async fn seed_due(
    repo: &MemoryRepo,
    user: &UserProfile,
    card_id: CardId,
    now: DateTime<Utc>,
    overdue_days: i64,
) {
    let mut state = CardMemoryState::new_for(user.id, card_id);
    state.state = CardState::Review;
    state.stability = 3.0;
    state.due_at = Some(now - Duration::days(overdue_days));
    state.last_reviewed_at = Some(now - Duration::days(overdue_days + 3));
    state.reps = 1;
    state.total_reviews = 1;
    state.correct_reviews = 1;
    repo.put_card_state(&state).await.unwrap();
}

fn ready(outcome: SessionOutcome) -> recall_core::StudySession {
    match outcome {
        SessionOutcome::Ready(s) => s,
        other => panic!("expected Ready, got {other:?}"),
    }
}

#[tokio::test]
async fn due_cards_precede_new_cards_most_overdue_first() {
    let (repo, user, ids) = setup(Tier::Paid, 6).await;
    let now = Utc::now();
    seed_due(&repo, &user, ids[0], now, 1).await;
    seed_due(&repo, &user, ids[1], now, 3).await;

    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());

    assert_eq!(session.cards.len(), 6);
    assert_eq!(session.cards[0], ids[1]); // 3 days overdue
    assert_eq!(session.cards[1], ids[0]); // 1 day overdue
    for id in &session.cards[2..] {
        assert!(ids[2..].contains(id));
    }
}

#[tokio::test]
async fn batch_is_capped_at_ten() {
    let (repo, user, _) = setup(Tier::Paid, 30).await;
    let now = Utc::now();

    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());
    assert_eq!(session.cards.len(), SESSION_BATCH_SIZE);
    assert_eq!(session.status, SessionStatus::Created);
    assert_eq!(session.submitted_count, 0);
}

#[tokio::test]
async fn new_card_order_is_reproducible_from_seed() {
    let (repo, user, _) = setup(Tier::Paid, 8).await;
    let now = Utc::now();

    let unseen = repo.list_unseen_cards(user.id, None).await.unwrap();
    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());

    let mut expected = unseen;
    let mut rng = StdRng::seed_from_u64(session.seed);
    expected.shuffle(&mut rng);
    expected.truncate(SESSION_BATCH_SIZE);
    assert_eq!(session.cards, expected);
}

#[tokio::test]
async fn same_day_request_resumes_the_open_session() {
    let (repo, user, _) = setup(Tier::Free, 5).await;
    let now = Utc::now();

    let first = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());
    let second = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn empty_pool_reports_no_cards() {
    let (repo, user, _) = setup(Tier::Free, 0).await;
    let outcome = get_or_create_session(&repo, user.id, None, Utc::now())
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::NoCards));
}

#[tokio::test]
async fn free_tier_gets_one_session_per_day() {
    let (repo, user, _) = setup(Tier::Free, 3).await;
    let now = Utc::now();

    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());
    for card_id in session.cards.clone() {
        let out = submit_answer(&repo, user.id, session.id, card_id, Rating::Good, 1000, now)
            .await
            .unwrap();
        assert!(matches!(out, SubmitOutcome::Recorded { .. }));
    }

    match get_or_create_session(&repo, user.id, None, now).await.unwrap() {
        SessionOutcome::LimitReached { tier, used, limit } => {
            assert_eq!(tier, Tier::Free);
            assert_eq!(used, 1);
            assert_eq!(limit, 1);
        }
        other => panic!("expected LimitReached, got {other:?}"),
    }
}

#[tokio::test]
async fn permutation_must_match_the_batch() {
    let (repo, user, _) = setup(Tier::Free, 4).await;
    let now = Utc::now();
    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());

    // Foreign card id.
    let mut bad = session.cards.clone();
    bad[0] = uuid::Uuid::new_v4();
    let err = finalize_session_order(&repo, user.id, session.id, &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));

    // Wrong length.
    let short = &session.cards[1..];
    assert!(finalize_session_order(&repo, user.id, session.id, short)
        .await
        .is_err());

    // Rejection leaves the session untouched.
    let unchanged = repo.get_session(session.id).await.unwrap();
    assert_eq!(unchanged.status, SessionStatus::Created);
    assert_eq!(unchanged.cards, session.cards);

    // A real permutation activates it.
    let mut reversed = session.cards.clone();
    reversed.reverse();
    let active = finalize_session_order(&repo, user.id, session.id, &reversed)
        .await
        .unwrap();
    assert_eq!(active.status, SessionStatus::Active);
    assert_eq!(active.cards, reversed);
}

#[tokio::test]
async fn duplicate_submission_records_one_review() {
    let (repo, user, _) = setup(Tier::Free, 3).await;
    let now = Utc::now();
    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());
    let card_id = session.cards[0];

    let first = submit_answer(&repo, user.id, session.id, card_id, Rating::Good, 800, now)
        .await
        .unwrap();
    assert!(matches!(first, SubmitOutcome::Recorded { .. }));

    let second = submit_answer(&repo, user.id, session.id, card_id, Rating::Good, 800, now)
        .await
        .unwrap();
    assert!(matches!(second, SubmitOutcome::AlreadyRecorded));

    let reviews = repo.list_reviews_for_card(user.id, card_id).await.unwrap();
    assert_eq!(reviews.len(), 1);
    let state = repo.get_card_state(user.id, card_id).await.unwrap().unwrap();
    assert_eq!(state.reps, 1);

    let refreshed = repo.get_session(session.id).await.unwrap();
    assert_eq!(refreshed.submitted_count, 1);
}

#[tokio::test]
async fn session_completes_when_batch_is_exhausted() {
    let (repo, user, _) = setup(Tier::Free, 3).await;
    let now = Utc::now();
    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());

    let mut last_progress = None;
    for card_id in session.cards.clone() {
        match submit_answer(&repo, user.id, session.id, card_id, Rating::Good, 900, now)
            .await
            .unwrap()
        {
            SubmitOutcome::Recorded { progress, .. } => last_progress = Some(progress),
            other => panic!("expected Recorded, got {other:?}"),
        }
    }
    let progress = last_progress.unwrap();
    assert!(progress.completed);
    assert_eq!(progress.submitted_count, 3);

    let done = repo.get_session(session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);

    // A completed session accepts no further submissions.
    let err = submit_answer(&repo, user.id, session.id, done.cards[0], Rating::Good, 900, now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn daily_review_cap_holds_across_sessions() {
    let (repo, user, ids) = setup(Tier::Free, 11).await;
    let now = Utc::now();

    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());
    assert_eq!(session.cards.len(), 10);
    for card_id in session.cards.clone() {
        submit_answer(&repo, user.id, session.id, card_id, Rating::Good, 700, now)
            .await
            .unwrap();
    }

    // Even a hand-built second session cannot outrun the cap.
    let leftover = ids
        .iter()
        .copied()
        .find(|id| !session.cards.contains(id))
        .unwrap();
    let extra = recall_core::StudySession::new(user.id, vec![leftover], None, 7, session.day);
    repo.insert_session(&extra).await.unwrap();

    match submit_answer(&repo, user.id, extra.id, leftover, Rating::Good, 700, now)
        .await
        .unwrap()
    {
        SubmitOutcome::DailyLimitReached { tier, used, limit } => {
            assert_eq!(tier, Tier::Free);
            assert_eq!(used, 10);
            assert_eq!(limit, 10);
        }
        other => panic!("expected DailyLimitReached, got {other:?}"),
    }
}

#[tokio::test]
async fn ownership_and_membership_are_checked_first() {
    let (repo, user, _) = setup(Tier::Free, 3).await;
    let now = Utc::now();
    let session = ready(get_or_create_session(&repo, user.id, None, now).await.unwrap());

    let stranger = UserProfile::new("stranger", Tier::Free);
    repo.create_user(&stranger).await.unwrap();
    let err = submit_answer(
        &repo,
        stranger.id,
        session.id,
        session.cards[0],
        Rating::Good,
        500,
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));

    let outsider = Card::new("not", "mine");
    repo.add_card(&outsider).await.unwrap();
    let err = submit_answer(&repo, user.id, session.id, outsider.id, Rating::Good, 500, now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn subject_filter_scopes_the_batch() {
    let (repo, user, _) = setup(Tier::Paid, 0).await;
    let now = Utc::now();

    let mut math = Card::new("2+2", "4");
    math.subject = Some("math/algebra".to_string());
    let mut geo = Card::new("capital of peru", "lima");
    geo.subject = Some("geography".to_string());
    repo.add_card(&math).await.unwrap();
    repo.add_card(&geo).await.unwrap();

    let session = ready(
        get_or_create_session(&repo, user.id, Some("math"), now)
            .await
            .unwrap(),
    );
    assert_eq!(session.cards, vec![math.id]);
}
