//! Nablijven CLI - keep the detention register usable without a connection
//!
//! Every change lands in the local queue first and is replayed against the
//! school API whenever it is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, DetentionCommands, StudentCommands};
use crate::commands::common::{AppContext, GlobalOptions};
use crate::commands::completions::run_completions;
use crate::commands::detention::{
    run_detention_add, run_detention_delete, run_detention_duplicate, run_detention_list,
    run_detention_reorder, run_detention_sessions, run_detention_update, DetentionChanges,
    NewDetention,
};
use crate::commands::pending::run_pending;
use crate::commands::student::{run_student_add, run_student_delete, run_student_list};
use crate::commands::sync::{run_status, run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nablijven=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let options = GlobalOptions {
        db_path: cli.db_path,
        api_url: cli.api_url,
        offline: cli.offline,
    };
    let context = AppContext::open(&options).await?;

    match cli.command {
        Commands::Student { command } => run_student(&context, command).await?,
        Commands::Detention { command } => run_detention(&context, command).await?,
        Commands::Pending { json } => {
            run_pending(&context, json).await?;
        }
        Commands::Sync => {
            run_sync(&context).await?;
        }
        Commands::Status { json } => {
            run_status(&context, json).await?;
        }
        Commands::Watch => run_watch(&context).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn run_student(context: &AppContext, command: StudentCommands) -> Result<(), CliError> {
    match command {
        StudentCommands::Add {
            name,
            grade,
            day,
            id,
        } => {
            run_student_add(context, &name, &grade, day, id).await?;
        }
        StudentCommands::List { day, json } => run_student_list(context, day, json).await?,
        StudentCommands::Delete { id } => run_student_delete(context, &id).await?,
    }
    Ok(())
}

async fn run_detention(context: &AppContext, command: DetentionCommands) -> Result<(), CliError> {
    match command {
        DetentionCommands::Add {
            date,
            student,
            day,
            number,
            details,
        } => {
            let new = NewDetention {
                date: &date,
                student: &student,
                day,
                number,
            };
            run_detention_add(context, new, &details).await?;
        }
        DetentionCommands::Update {
            id,
            date,
            student,
            day,
            number,
            details,
        } => {
            let changes = DetentionChanges {
                date,
                student,
                day,
                number,
            };
            run_detention_update(context, &id, changes, &details).await?;
        }
        DetentionCommands::List {
            date,
            from,
            to,
            json,
        } => {
            let range = from.as_deref().zip(to.as_deref());
            run_detention_list(context, date.as_deref(), range, json).await?;
        }
        DetentionCommands::Sessions { json } => run_detention_sessions(context, json).await?,
        DetentionCommands::Reorder { date, ids } => {
            run_detention_reorder(context, &date, &ids).await?;
        }
        DetentionCommands::Duplicate { from, to } => {
            run_detention_duplicate(context, &from, &to).await?;
        }
        DetentionCommands::Delete { id } => run_detention_delete(context, &id).await?,
    }
    Ok(())
}
