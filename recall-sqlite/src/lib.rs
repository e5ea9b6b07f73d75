use chrono::{DateTime, NaiveDate, Utc};
use recall_core::{
    repo::Repository, Card, CardId, CardMemoryState, CardState, CoreError, DailyUsage, FsrsConfig,
    Rating, ReviewEvent, SessionId, SessionStatus, StudySession, Tier, UserId, UserProfile,
};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    pub async fn open_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        // Create tables/indexes if they do not exist.
        const STMT: &str = r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
          id              TEXT PRIMARY KEY,
          name            TEXT NOT NULL UNIQUE,
          tier            TEXT NOT NULL,
          timezone        TEXT NOT NULL,
          day_start_hour  INTEGER NOT NULL DEFAULT 0,
          created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cards (
          id          TEXT PRIMARY KEY,
          front       TEXT NOT NULL,
          back        TEXT NOT NULL,
          tags        TEXT NOT NULL,
          subject     TEXT,
          created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fsrs_configs (
          user_id  TEXT PRIMARY KEY,
          config   TEXT NOT NULL,
          FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS card_states (
          user_id               TEXT NOT NULL,
          card_id               TEXT NOT NULL,
          state                 TEXT NOT NULL,
          stability             REAL NOT NULL DEFAULT 0,
          difficulty            REAL NOT NULL DEFAULT 5,
          due_at                TEXT,
          last_reviewed_at      TEXT,
          reps                  INTEGER NOT NULL DEFAULT 0,
          lapses                INTEGER NOT NULL DEFAULT 0,
          total_reviews         INTEGER NOT NULL DEFAULT 0,
          correct_reviews       INTEGER NOT NULL DEFAULT 0,
          incorrect_reviews     INTEGER NOT NULL DEFAULT 0,
          avg_response_time_ms  REAL NOT NULL DEFAULT 0,
          PRIMARY KEY (user_id, card_id),
          FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
          FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS sessions (
          id               TEXT PRIMARY KEY,
          user_id          TEXT NOT NULL,
          cards            TEXT NOT NULL,
          current_index    INTEGER NOT NULL DEFAULT 0,
          submitted_count  INTEGER NOT NULL DEFAULT 0,
          status           TEXT NOT NULL,
          subject_filter   TEXT,
          seed             INTEGER NOT NULL,
          day              TEXT NOT NULL,
          created_at       TEXT NOT NULL,
          FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS reviews (
          id                 TEXT PRIMARY KEY,
          user_id            TEXT NOT NULL,
          card_id            TEXT NOT NULL,
          session_id         TEXT,
          rating             INTEGER NOT NULL,
          response_time_ms   INTEGER NOT NULL,
          state_before       TEXT NOT NULL,
          state_after        TEXT NOT NULL,
          stability_before   REAL NOT NULL,
          stability_after    REAL NOT NULL,
          difficulty_before  REAL NOT NULL,
          difficulty_after   REAL NOT NULL,
          due_before         TEXT,
          due_after          TEXT,
          elapsed_days       REAL NOT NULL,
          scheduled_days     REAL NOT NULL,
          reps_before        INTEGER NOT NULL,
          lapses_before      INTEGER NOT NULL,
          reviewed_at        TEXT NOT NULL,
          FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
          FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS daily_usage (
          user_id   TEXT NOT NULL,
          day       TEXT NOT NULL,
          reviews   INTEGER NOT NULL DEFAULT 0,
          sessions  INTEGER NOT NULL DEFAULT 0,
          PRIMARY KEY (user_id, day),
          FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_session_card
          ON reviews (session_id, card_id) WHERE session_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
          ON sessions (user_id, day, ifnull(subject_filter, ''))
          WHERE status != 'completed';
        CREATE INDEX IF NOT EXISTS idx_card_states_user_due ON card_states (user_id, due_at);
        CREATE INDEX IF NOT EXISTS idx_reviews_user_card ON reviews (user_id, card_id, reviewed_at);
        "#;

        // Execute statements one by one for compatibility.
        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|_| CoreError::Storage("sqlite schema"))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for SqliteRepo {
    // ===== Users =====
    async fn create_user(&self, profile: &UserProfile) -> Result<(), CoreError> {
        let res = sqlx::query(
            "INSERT INTO users (id,name,tier,timezone,day_start_hour,created_at) VALUES (?,?,?,?,?,?)",
        )
        .bind(profile.id.to_string())
        .bind(&profile.name)
        .bind(tier_to_str(profile.tier))
        .bind(profile.timezone.name())
        .bind(profile.day_start_hour as i64)
        .bind(dt_to_str(profile.created_at))
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::Conflict("user name already exists")),
            Err(_) => Err(CoreError::Storage("insert user")),
        }
    }

    async fn get_user(&self, id: UserId) -> Result<UserProfile, CoreError> {
        let row = sqlx::query(
            "SELECT id,name,tier,timezone,day_start_hour,created_at FROM users WHERE id=?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("read user"))?;
        let row = row.ok_or(CoreError::NotFound("user"))?;
        row_into_user(row)
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>, CoreError> {
        let rows = sqlx::query(
            "SELECT id,name,tier,timezone,day_start_hour,created_at FROM users ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("list users"))?;
        rows.into_iter().map(row_into_user).collect()
    }

    // ===== Cards =====
    async fn add_card(&self, card: &Card) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO cards (id,front,back,tags,subject,created_at) VALUES (?,?,?,?,?,?)")
            .bind(card.id.to_string())
            .bind(&card.front)
            .bind(&card.back)
            .bind(serde_json::to_string(&card.tags).map_err(|_| CoreError::Invalid("tags"))?)
            .bind(card.subject.clone())
            .bind(dt_to_str(card.created_at))
            .execute(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("insert card"))?;
        Ok(())
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        let row = sqlx::query("SELECT id,front,back,tags,subject,created_at FROM cards WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read card"))?;
        let row = row.ok_or(CoreError::NotFound("card"))?;
        row_into_card(row)
    }

    async fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>, CoreError> {
        let mut v = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_card(*id).await {
                Ok(c) => v.push(c),
                Err(CoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(v)
    }

    async fn list_cards(&self, subject: Option<&str>) -> Result<Vec<Card>, CoreError> {
        let rows = if let Some(filter) = subject {
            sqlx::query(
                r#"SELECT id,front,back,tags,subject,created_at FROM cards
                   WHERE subject = ? OR subject LIKE ? || '/%'
                   ORDER BY created_at ASC"#,
            )
            .bind(filter)
            .bind(filter)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT id,front,back,tags,subject,created_at FROM cards ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|_| CoreError::Storage("list cards"))?;
        rows.into_iter().map(row_into_card).collect()
    }

    // ===== Config =====
    async fn get_config(&self, user_id: UserId) -> Result<FsrsConfig, CoreError> {
        let row = sqlx::query("SELECT config FROM fsrs_configs WHERE user_id=?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read config"))?;
        match row {
            Some(r) => serde_json::from_str(&r.get::<String, _>("config"))
                .map_err(|_| CoreError::Invalid("config json")),
            None => Ok(FsrsConfig::default()),
        }
    }

    async fn put_config(&self, user_id: UserId, config: &FsrsConfig) -> Result<(), CoreError> {
        let json = serde_json::to_string(config).map_err(|_| CoreError::Invalid("config json"))?;
        sqlx::query(
            r#"INSERT INTO fsrs_configs (user_id, config) VALUES (?, ?)
               ON CONFLICT(user_id) DO UPDATE SET config = excluded.config"#,
        )
        .bind(user_id.to_string())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("write config"))?;
        Ok(())
    }

    // ===== Card memory state =====
    async fn put_card_state(&self, state: &CardMemoryState) -> Result<(), CoreError> {
        upsert_state(&self.pool, state)
            .await
            .map_err(|_| CoreError::Storage("write card state"))
    }

    async fn get_card_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardMemoryState>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STATE_COLS} FROM card_states WHERE user_id=? AND card_id=?"
        ))
        .bind(user_id.to_string())
        .bind(card_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("read card state"))?;
        row.map(row_into_state).transpose()
    }

    async fn list_due_states(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        subject: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CardMemoryState>, CoreError> {
        let base = format!(
            r#"SELECT {STATE_COLS} FROM card_states cs
               JOIN cards c ON c.id = cs.card_id
               WHERE cs.user_id = ?
                 AND cs.due_at IS NOT NULL AND cs.due_at <= ?
                 AND cs.state NOT IN ('new','buried','suspended')"#
        );
        let rows = if let Some(filter) = subject {
            sqlx::query(&format!(
                "{base} AND (c.subject = ? OR c.subject LIKE ? || '/%') ORDER BY cs.due_at ASC LIMIT ?"
            ))
            .bind(user_id.to_string())
            .bind(dt_to_str(now))
            .bind(filter)
            .bind(filter)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(&format!("{base} ORDER BY cs.due_at ASC LIMIT ?"))
                .bind(user_id.to_string())
                .bind(dt_to_str(now))
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|_| CoreError::Storage("list due states"))?;
        rows.into_iter().map(row_into_state).collect()
    }

    async fn list_unseen_cards(
        &self,
        user_id: UserId,
        subject: Option<&str>,
    ) -> Result<Vec<CardId>, CoreError> {
        let base = r#"SELECT c.id FROM cards c
               WHERE NOT EXISTS (
                 SELECT 1 FROM card_states s WHERE s.user_id = ? AND s.card_id = c.id
               )"#;
        let rows = if let Some(filter) = subject {
            sqlx::query(&format!(
                "{base} AND (c.subject = ? OR c.subject LIKE ? || '/%') ORDER BY c.created_at ASC"
            ))
            .bind(user_id.to_string())
            .bind(filter)
            .bind(filter)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(&format!("{base} ORDER BY c.created_at ASC"))
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|_| CoreError::Storage("list unseen"))?;
        rows.into_iter()
            .map(|r| uuid_from_str(r.get::<String, _>("id")))
            .collect()
    }

    // ===== Sessions =====
    async fn insert_session(&self, session: &StudySession) -> Result<(), CoreError> {
        let res = sqlx::query(
            r#"INSERT INTO sessions
               (id,user_id,cards,current_index,submitted_count,status,subject_filter,seed,day,created_at)
               VALUES (?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(cards_to_json(&session.cards)?)
        .bind(session.current_index as i64)
        .bind(session.submitted_count as i64)
        .bind(status_to_str(session.status))
        .bind(session.subject_filter.clone())
        .bind(session.seed as i64)
        .bind(session.day.to_string())
        .bind(dt_to_str(session.created_at))
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(()),
            // The partial unique index on open (user, day, filter) fires here.
            Err(e) if is_unique_violation(&e) => {
                Err(CoreError::Conflict("open session already exists"))
            }
            Err(_) => Err(CoreError::Storage("insert session")),
        }
    }

    async fn get_session(&self, id: SessionId) -> Result<StudySession, CoreError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLS} FROM sessions WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read session"))?;
        let row = row.ok_or(CoreError::NotFound("session"))?;
        row_into_session(row)
    }

    async fn update_session(&self, session: &StudySession) -> Result<(), CoreError> {
        let res = sqlx::query(
            r#"UPDATE sessions SET
               cards=?, current_index=?, submitted_count=?, status=?
               WHERE id=?"#,
        )
        .bind(cards_to_json(&session.cards)?)
        .bind(session.current_index as i64)
        .bind(session.submitted_count as i64)
        .bind(status_to_str(session.status))
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("update session"))?;
        if res.rows_affected() == 0 {
            return Err(CoreError::NotFound("session"));
        }
        Ok(())
    }

    async fn find_open_session(
        &self,
        user_id: UserId,
        day: NaiveDate,
        subject: Option<&str>,
    ) -> Result<Option<StudySession>, CoreError> {
        let row = sqlx::query(&format!(
            r#"SELECT {SESSION_COLS} FROM sessions
               WHERE user_id=? AND day=? AND status != 'completed' AND subject_filter IS ?"#
        ))
        .bind(user_id.to_string())
        .bind(day.to_string())
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("find session"))?;
        row.map(row_into_session).transpose()
    }

    // ===== Reviews =====
    async fn review_exists(
        &self,
        session_id: SessionId,
        card_id: CardId,
    ) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM reviews WHERE session_id=? AND card_id=? LIMIT 1")
            .bind(session_id.to_string())
            .bind(card_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read review"))?;
        Ok(row.is_some())
    }

    async fn list_reviews_for_card(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Vec<ReviewEvent>, CoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLS} FROM reviews WHERE user_id=? AND card_id=? ORDER BY reviewed_at ASC"
        ))
        .bind(user_id.to_string())
        .bind(card_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("list reviews"))?;
        rows.into_iter().map(row_into_review).collect()
    }

    // ===== Daily usage =====
    async fn usage_for_day(&self, user_id: UserId, day: NaiveDate) -> Result<DailyUsage, CoreError> {
        let row = sqlx::query("SELECT reviews,sessions FROM daily_usage WHERE user_id=? AND day=?")
            .bind(user_id.to_string())
            .bind(day.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read usage"))?;
        let mut usage = DailyUsage::new(user_id, day);
        if let Some(r) = row {
            usage.reviews = r.get::<i64, _>("reviews") as u32;
            usage.sessions = r.get::<i64, _>("sessions") as u32;
        }
        Ok(usage)
    }

    async fn record_session_created(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO daily_usage (user_id, day, reviews, sessions) VALUES (?, ?, 0, 1)
               ON CONFLICT(user_id, day) DO UPDATE SET sessions = sessions + 1"#,
        )
        .bind(user_id.to_string())
        .bind(day.to_string())
        .execute(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("write usage"))?;
        Ok(())
    }

    async fn commit_review(
        &self,
        session: &StudySession,
        state: &CardMemoryState,
        event: &ReviewEvent,
        day: NaiveDate,
    ) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;

        // The unique (session_id, card_id) index serializes duplicate
        // submissions: the loser gets Conflict and the rollback below.
        let res = sqlx::query(&format!(
            "INSERT INTO reviews ({REVIEW_COLS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"
        ))
        .bind(event.id.to_string())
        .bind(event.user_id.to_string())
        .bind(event.card_id.to_string())
        .bind(event.session_id.map(|s| s.to_string()))
        .bind(event.rating.as_score() as i64)
        .bind(event.response_time_ms as i64)
        .bind(state_to_str(event.state_before))
        .bind(state_to_str(event.state_after))
        .bind(event.stability_before)
        .bind(event.stability_after)
        .bind(event.difficulty_before)
        .bind(event.difficulty_after)
        .bind(event.due_before.map(dt_to_str))
        .bind(event.due_after.map(dt_to_str))
        .bind(event.elapsed_days)
        .bind(event.scheduled_days)
        .bind(event.reps_before as i64)
        .bind(event.lapses_before as i64)
        .bind(dt_to_str(event.reviewed_at))
        .execute(&mut *tx)
        .await;
        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.ok();
                return Err(CoreError::Conflict("review already exists"));
            }
            Err(_) => {
                tx.rollback().await.ok();
                return Err(CoreError::Storage("insert review"));
            }
        }

        upsert_state(&mut *tx, state)
            .await
            .map_err(|_| CoreError::Storage("write card state"))?;

        let res = sqlx::query(
            "UPDATE sessions SET cards=?, current_index=?, submitted_count=?, status=? WHERE id=?",
        )
        .bind(cards_to_json(&session.cards)?)
        .bind(session.current_index as i64)
        .bind(session.submitted_count as i64)
        .bind(status_to_str(session.status))
        .bind(session.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|_| CoreError::Storage("update session"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("session"));
        }

        sqlx::query(
            r#"INSERT INTO daily_usage (user_id, day, reviews, sessions) VALUES (?, ?, 1, 0)
               ON CONFLICT(user_id, day) DO UPDATE SET reviews = reviews + 1"#,
        )
        .bind(event.user_id.to_string())
        .bind(day.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|_| CoreError::Storage("write usage"))?;

        tx.commit().await.map_err(|_| CoreError::Storage("tx commit"))
    }
}

// ===== Column lists =====
const STATE_COLS: &str = "user_id,card_id,state,stability,difficulty,due_at,last_reviewed_at,reps,lapses,total_reviews,correct_reviews,incorrect_reviews,avg_response_time_ms";
const SESSION_COLS: &str =
    "id,user_id,cards,current_index,submitted_count,status,subject_filter,seed,day,created_at";
const REVIEW_COLS: &str = "id,user_id,card_id,session_id,rating,response_time_ms,state_before,state_after,stability_before,stability_after,difficulty_before,difficulty_after,due_before,due_after,elapsed_days,scheduled_days,reps_before,lapses_before,reviewed_at";

// ===== Helpers =====
async fn upsert_state<'e, E>(executor: E, state: &CardMemoryState) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(&format!(
        r#"INSERT INTO card_states ({STATE_COLS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)
           ON CONFLICT(user_id, card_id) DO UPDATE SET
             state=excluded.state, stability=excluded.stability,
             difficulty=excluded.difficulty, due_at=excluded.due_at,
             last_reviewed_at=excluded.last_reviewed_at, reps=excluded.reps,
             lapses=excluded.lapses, total_reviews=excluded.total_reviews,
             correct_reviews=excluded.correct_reviews,
             incorrect_reviews=excluded.incorrect_reviews,
             avg_response_time_ms=excluded.avg_response_time_ms"#
    ))
    .bind(state.user_id.to_string())
    .bind(state.card_id.to_string())
    .bind(state_to_str(state.state))
    .bind(state.stability)
    .bind(state.difficulty)
    .bind(state.due_at.map(dt_to_str))
    .bind(state.last_reviewed_at.map(dt_to_str))
    .bind(state.reps as i64)
    .bind(state.lapses as i64)
    .bind(state.total_reviews as i64)
    .bind(state.correct_reviews as i64)
    .bind(state.incorrect_reviews as i64)
    .bind(state.average_response_time_ms)
    .execute(executor)
    .await?;
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Invalid("uuid"))
}

fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Invalid("datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn day_from_str(s: String) -> Result<NaiveDate, CoreError> {
    s.parse().map_err(|_| CoreError::Invalid("date"))
}

fn tier_to_str(t: Tier) -> &'static str {
    match t {
        Tier::Free => "free",
        Tier::Paid => "paid",
        Tier::Admin => "admin",
    }
}

fn tier_from_str(s: &str) -> Result<Tier, CoreError> {
    match s {
        "free" => Ok(Tier::Free),
        "paid" => Ok(Tier::Paid),
        "admin" => Ok(Tier::Admin),
        _ => Err(CoreError::Invalid("tier")),
    }
}

fn state_to_str(s: CardState) -> &'static str {
    match s {
        CardState::New => "new",
        CardState::Learning => "learning",
        CardState::Review => "review",
        CardState::Relearning => "relearning",
        CardState::Buried => "buried",
        CardState::Suspended => "suspended",
    }
}

fn state_from_str(s: &str) -> Result<CardState, CoreError> {
    match s {
        "new" => Ok(CardState::New),
        "learning" => Ok(CardState::Learning),
        "review" => Ok(CardState::Review),
        "relearning" => Ok(CardState::Relearning),
        "buried" => Ok(CardState::Buried),
        "suspended" => Ok(CardState::Suspended),
        _ => Err(CoreError::Invalid("card state")),
    }
}

fn status_to_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Created => "created",
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
    }
}

fn status_from_str(s: &str) -> Result<SessionStatus, CoreError> {
    match s {
        "created" => Ok(SessionStatus::Created),
        "active" => Ok(SessionStatus::Active),
        "completed" => Ok(SessionStatus::Completed),
        _ => Err(CoreError::Invalid("session status")),
    }
}

fn cards_to_json(cards: &[CardId]) -> Result<String, CoreError> {
    serde_json::to_string(cards).map_err(|_| CoreError::Invalid("cards json"))
}

fn row_into_user(row: sqlx::sqlite::SqliteRow) -> Result<UserProfile, CoreError> {
    Ok(UserProfile {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        name: row.get::<String, _>("name"),
        tier: tier_from_str(&row.get::<String, _>("tier"))?,
        timezone: chrono_tz::Tz::from_str(&row.get::<String, _>("timezone"))
            .map_err(|_| CoreError::Invalid("timezone"))?,
        day_start_hour: row.get::<i64, _>("day_start_hour") as u8,
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_card(row: sqlx::sqlite::SqliteRow) -> Result<Card, CoreError> {
    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(Card {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        front: row.get::<String, _>("front"),
        back: row.get::<String, _>("back"),
        tags,
        subject: row.get::<Option<String>, _>("subject"),
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_state(row: sqlx::sqlite::SqliteRow) -> Result<CardMemoryState, CoreError> {
    Ok(CardMemoryState {
        user_id: uuid_from_str(row.get::<String, _>("user_id"))?,
        card_id: uuid_from_str(row.get::<String, _>("card_id"))?,
        state: state_from_str(&row.get::<String, _>("state"))?,
        stability: row.get::<f64, _>("stability"),
        difficulty: row.get::<f64, _>("difficulty"),
        due_at: row
            .get::<Option<String>, _>("due_at")
            .map(dt_from_str)
            .transpose()?,
        last_reviewed_at: row
            .get::<Option<String>, _>("last_reviewed_at")
            .map(dt_from_str)
            .transpose()?,
        reps: row.get::<i64, _>("reps") as u32,
        lapses: row.get::<i64, _>("lapses") as u32,
        total_reviews: row.get::<i64, _>("total_reviews") as u32,
        correct_reviews: row.get::<i64, _>("correct_reviews") as u32,
        incorrect_reviews: row.get::<i64, _>("incorrect_reviews") as u32,
        average_response_time_ms: row.get::<f64, _>("avg_response_time_ms"),
    })
}

fn row_into_session(row: sqlx::sqlite::SqliteRow) -> Result<StudySession, CoreError> {
    let cards_json: String = row.get("cards");
    let cards: Vec<CardId> =
        serde_json::from_str(&cards_json).map_err(|_| CoreError::Invalid("cards json"))?;
    Ok(StudySession {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        user_id: uuid_from_str(row.get::<String, _>("user_id"))?,
        cards,
        current_index: row.get::<i64, _>("current_index") as u32,
        submitted_count: row.get::<i64, _>("submitted_count") as u32,
        status: status_from_str(&row.get::<String, _>("status"))?,
        subject_filter: row.get::<Option<String>, _>("subject_filter"),
        seed: row.get::<i64, _>("seed") as u64,
        day: day_from_str(row.get::<String, _>("day"))?,
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
    })
}

fn row_into_review(row: sqlx::sqlite::SqliteRow) -> Result<ReviewEvent, CoreError> {
    Ok(ReviewEvent {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        user_id: uuid_from_str(row.get::<String, _>("user_id"))?,
        card_id: uuid_from_str(row.get::<String, _>("card_id"))?,
        session_id: row
            .get::<Option<String>, _>("session_id")
            .map(uuid_from_str)
            .transpose()?,
        rating: Rating::from_score(row.get::<i64, _>("rating") as i32)
            .ok_or(CoreError::Invalid("rating"))?,
        response_time_ms: row.get::<i64, _>("response_time_ms") as u32,
        state_before: state_from_str(&row.get::<String, _>("state_before"))?,
        state_after: state_from_str(&row.get::<String, _>("state_after"))?,
        stability_before: row.get::<f64, _>("stability_before"),
        stability_after: row.get::<f64, _>("stability_after"),
        difficulty_before: row.get::<f64, _>("difficulty_before"),
        difficulty_after: row.get::<f64, _>("difficulty_after"),
        due_before: row
            .get::<Option<String>, _>("due_before")
            .map(dt_from_str)
            .transpose()?,
        due_after: row
            .get::<Option<String>, _>("due_after")
            .map(dt_from_str)
            .transpose()?,
        elapsed_days: row.get::<f64, _>("elapsed_days"),
        scheduled_days: row.get::<f64, _>("scheduled_days"),
        reps_before: row.get::<i64, _>("reps_before") as u32,
        lapses_before: row.get::<i64, _>("lapses_before") as u32,
        reviewed_at: dt_from_str(row.get::<String, _>("reviewed_at"))?,
    })
}
