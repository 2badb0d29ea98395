use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nablijven_core::models::{DayOfWeek, TimePeriod};

#[derive(Parser)]
#[command(name = "nablijven")]
#[command(about = "Keep the detention register offline and sync it when the API is reachable")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Remote API base URL, e.g. <https://school.example.be/api>
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Queue changes locally without contacting the API
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage students
    Student {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// Manage detentions
    Detention {
        #[command(subcommand)]
        command: DetentionCommands,
    },
    /// List operations waiting to be synced
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay pending operations against the API once
    Sync,
    /// Show connectivity and queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the background and report status until Ctrl-C
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum StudentCommands {
    /// Add or overwrite a student
    Add {
        /// Full name
        name: String,
        /// Class, e.g. 2A
        #[arg(long, default_value = "")]
        grade: String,
        /// Detention day
        #[arg(long, value_parser = parse_day)]
        day: DayOfWeek,
        /// Existing id to overwrite (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// List students
    List {
        /// Only students of this day
        #[arg(long, value_parser = parse_day)]
        day: Option<DayOfWeek>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a student
    Delete {
        /// Student id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum DetentionCommands {
    /// Add a detention to a session
    Add {
        /// Session date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Student label, e.g. "Jan Peeters - 2A"
        #[arg(long)]
        student: String,
        /// Session day (derived from the date when omitted)
        #[arg(long, value_parser = parse_day)]
        day: Option<DayOfWeek>,
        /// Position in the session (next free number when omitted)
        #[arg(long)]
        number: Option<u32>,
        #[command(flatten)]
        details: DetentionDetails,
    },
    /// Change fields of an existing detention
    Update {
        /// Detention id
        id: String,
        /// New session date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// New student label
        #[arg(long)]
        student: Option<String>,
        /// New session day
        #[arg(long, value_parser = parse_day)]
        day: Option<DayOfWeek>,
        /// New position in the session
        #[arg(long)]
        number: Option<u32>,
        #[command(flatten)]
        details: DetentionDetails,
    },
    /// List detentions
    List {
        /// Only this session date
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<String>,
        /// Range start (inclusive)
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Range end (inclusive)
        #[arg(long, requires = "from")]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sessions grouped by date
    Sessions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Renumber a session in the given order
    Reorder {
        /// Session date (YYYY-MM-DD)
        date: String,
        /// Every detention id of the session, in the new order
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Copy a whole session to another date
    Duplicate {
        /// Session date to copy (YYYY-MM-DD)
        from: String,
        /// New session date (YYYY-MM-DD)
        to: String,
    },
    /// Delete a detention
    Delete {
        /// Detention id
        id: String,
    },
}

/// Optional detention fields shared by `add` and `update`
#[derive(Args, Debug, Default)]
pub struct DetentionDetails {
    /// Teacher who assigned the detention
    #[arg(long)]
    pub teacher: Option<String>,
    /// Reason for the detention
    #[arg(long)]
    pub reason: Option<String>,
    /// Task to work on
    #[arg(long)]
    pub task: Option<String>,
    /// Date registered in the LVS (YYYY-MM-DD)
    #[arg(long)]
    pub lvs_date: Option<String>,
    /// Task must be printed
    #[arg(long)]
    pub print: Option<bool>,
    /// Student may use a Chromebook
    #[arg(long)]
    pub chromebook: Option<bool>,
    /// Extra notes
    #[arg(long)]
    pub notes: Option<String>,
    /// Double period (Monday sessions only)
    #[arg(long)]
    pub double_period: Option<bool>,
    /// Time slot, e.g. 16:00-16:15
    #[arg(long, value_parser = parse_time_period)]
    pub time_period: Option<TimePeriod>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn parse_day(value: &str) -> Result<DayOfWeek, String> {
    value.parse().map_err(|_| {
        format!("expected one of MAANDAG, DINSDAG, DONDERDAG, got '{value}'")
    })
}

fn parse_time_period(value: &str) -> Result<TimePeriod, String> {
    value.parse().map_err(|_| {
        let options = TimePeriod::ALL
            .iter()
            .map(|period| period.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("expected one of {options}, got '{value}'")
    })
}
