use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TierArg {
    Free,
    Paid,
    Admin,
}

impl From<TierArg> for recall_core::Tier {
    fn from(t: TierArg) -> Self {
        match t {
            TierArg::Free => recall_core::Tier::Free,
            TierArg::Paid => recall_core::Tier::Paid,
            TierArg::Admin => recall_core::Tier::Admin,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(name = "recall", version, about = "Recall CLI/API: FSRS study sessions")]
pub struct Cli {
    /// Storage backend (memory is non-persistent, for demos)
    #[arg(long, value_enum, default_value = "sqlite")]
    pub store: StoreKind,

    /// SQLite DB path when --store sqlite (defaults to app data dir)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// User operations (CLI)
    #[command(subcommand)]
    User(UserCmd),
    /// Card operations (CLI)
    #[command(subcommand)]
    Card(CardCmd),
    /// Interactive study session (CLI)
    Study(StudyCmd),
    /// Launch Axum HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum UserCmd {
    Add(UserAdd),
    List,
}

#[derive(Debug, Args, Clone)]
pub struct UserAdd {
    pub name: String,
    #[arg(long, value_enum, default_value = "free")]
    pub tier: TierArg,
    /// IANA timezone name, e.g. Europe/Warsaw (defaults to UTC)
    #[arg(long)]
    pub timezone: Option<String>,
    /// Hour (0-23) at which the study day rolls over
    #[arg(long)]
    pub day_start_hour: Option<u8>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    Add(CardAdd),
    List {
        #[arg(long)]
        subject: Option<String>,
    },
}

#[derive(Debug, Args, Clone)]
pub struct CardAdd {
    #[arg(long)]
    pub front: String,
    #[arg(long)]
    pub back: String,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct StudyCmd {
    /// User name or id
    #[arg(long)]
    pub user: String,
    /// Restrict the session to a subject path
    #[arg(long)]
    pub subject: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: String,
}
