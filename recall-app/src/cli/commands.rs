use crate::api::server as api_server;
use crate::cli::opts::*;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use recall_core::{
    get_or_create_session, submit_answer, Card, MemoryRepo, Rating, Repository, SessionOutcome,
    SubmitOutcome, UserProfile,
};
use recall_sqlite::SqliteRepo;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub async fn run_cli(args: Cli) -> Result<()> {
    match &args.cmd {
        Command::Api(api) => {
            let repo = open_repo(&args.store, args.db_path.clone()).await?;
            let addr: std::net::SocketAddr = api.addr.parse()?;
            api_server::run(repo, addr).await
        }
        _ => {
            let repo = open_repo(&args.store, args.db_path.clone()).await?;
            match args.cmd.clone() {
                Command::User(cmd) => user_cmd(repo, cmd).await,
                Command::Card(cmd) => card_cmd(repo, cmd).await,
                Command::Study(cmd) => study_cmd(repo, cmd).await,
                _ => unreachable!(),
            }
        }
    }
}

pub async fn open_repo(store: &StoreKind, db_path: Option<PathBuf>) -> Result<Arc<dyn Repository>> {
    match store {
        StoreKind::Memory => Ok(Arc::new(MemoryRepo::new())),
        StoreKind::Sqlite => {
            let p = db_path.unwrap_or_else(default_db_path);
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let s = SqliteRepo::open_file(&p).await?;
            Ok(Arc::new(s))
        }
    }
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "recall")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recall.sqlite3")
}

async fn user_cmd(repo: Arc<dyn Repository>, cmd: UserCmd) -> Result<()> {
    match cmd {
        UserCmd::Add(a) => {
            let mut profile = UserProfile::new(&a.name, a.tier.into());
            if let Some(tz) = &a.timezone {
                profile.timezone =
                    chrono_tz::Tz::from_str(tz).map_err(|_| anyhow!("unknown timezone: {tz}"))?;
            }
            if let Some(h) = a.day_start_hour {
                if h > 23 {
                    bail!("day start hour must be 0-23");
                }
                profile.day_start_hour = h;
            }
            repo.create_user(&profile).await?;
            println!("{}", profile.id);
        }
        UserCmd::List => {
            let mut v = repo.list_users().await?;
            v.sort_by_key(|u| u.created_at);
            for u in v {
                println!("{}\t{}\ttier={:?}\ttz={}", u.id, u.name, u.tier, u.timezone);
            }
        }
    }
    Ok(())
}

async fn card_cmd(repo: Arc<dyn Repository>, cmd: CardCmd) -> Result<()> {
    match cmd {
        CardCmd::Add(a) => {
            let mut card = Card::new(&a.front, &a.back);
            card.subject = a.subject;
            card.tags = a.tags;
            repo.add_card(&card).await?;
            println!("{}", card.id);
        }
        CardCmd::List { subject } => {
            let cards = repo.list_cards(subject.as_deref()).await?;
            for c in cards {
                let subject = c.subject.unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}\tsubject={}", c.id, c.front, c.back, subject);
            }
        }
    }
    Ok(())
}

async fn study_cmd(repo: Arc<dyn Repository>, cmd: StudyCmd) -> Result<()> {
    let user = resolve_user(&*repo, &cmd.user).await?;

    let session = match get_or_create_session(&*repo, user.id, cmd.subject.as_deref(), Utc::now())
        .await?
    {
        SessionOutcome::Ready(s) => s,
        SessionOutcome::LimitReached { tier, used, limit } => {
            println!("daily limit reached ({used}/{limit}, {tier:?} tier), come back tomorrow");
            return Ok(());
        }
        SessionOutcome::NoCards => {
            println!("nothing left to study");
            return Ok(());
        }
    };

    let cards = repo.get_cards(&session.cards).await?;
    let total = session.cards.len();
    println!(
        "session {}: {} card(s), {} already submitted",
        session.id, total, session.submitted_count
    );

    // Resume where the last sitting left off.
    for (i, card_id) in session
        .cards
        .iter()
        .enumerate()
        .skip(session.submitted_count as usize)
    {
        let Some(card) = cards.iter().find(|c| c.id == *card_id) else {
            continue;
        };
        println!("\n[{}/{}]", i + 1, total);
        println!("Q: {}", card.front);
        prompt_enter("[enter=show]")?;
        println!("A: {}", card.back);
        println!("[0=Again, 1=Hard, 2=Good, 3=Easy, s=skip, q=quit]");

        let started = Instant::now();
        let rating = loop {
            let line = read_line("rating> ")?;
            match line.trim().to_lowercase().as_str() {
                "s" | "skip" => break None,
                "q" | "quit" => return Ok(()),
                other => match other.parse::<i32>().ok().and_then(Rating::from_score) {
                    Some(r) => break Some(r),
                    None => println!("enter 0/1/2/3, s, or q"),
                },
            }
        };
        let Some(rating) = rating else { continue };
        let response_ms = (started.elapsed().as_millis() as u32).max(1);

        match submit_answer(
            &*repo,
            user.id,
            session.id,
            *card_id,
            rating,
            response_ms,
            Utc::now(),
        )
        .await?
        {
            SubmitOutcome::Recorded {
                new_state, progress, ..
            } => {
                if let Some(due) = new_state.due_at {
                    println!("→ next due {}", due.format("%Y-%m-%d %H:%M"));
                }
                if progress.completed {
                    println!("\nsession complete ({} reviewed)", progress.submitted_count);
                    return Ok(());
                }
            }
            SubmitOutcome::AlreadyRecorded => println!("already recorded, skipping"),
            SubmitOutcome::DailyLimitReached { used, limit, .. } => {
                println!("daily review limit reached ({used}/{limit})");
                return Ok(());
            }
        }
    }
    Ok(())
}

// ===== Helpers =====
async fn resolve_user<R: Repository + ?Sized>(repo: &R, sel: &str) -> Result<UserProfile> {
    if let Ok(id) = Uuid::parse_str(sel) {
        if let Ok(u) = repo.get_user(id).await {
            return Ok(u);
        }
    }
    let users = repo.list_users().await?;
    if let Some(u) = users.into_iter().find(|u| u.name.eq_ignore_ascii_case(sel)) {
        return Ok(u);
    }
    bail!("user not found: {}", sel)
}

fn prompt_enter(label: &str) -> Result<()> {
    print!("{label}");
    stdout().flush().ok();
    let mut s = String::new();
    stdin().read_line(&mut s)?;
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush().ok();
    let mut s = String::new();
    stdin().read_line(&mut s)?;
    Ok(s)
}
