use std::sync::Arc;

use nablijven_core::sync::{
    ConnectivityObserver, StatusReporter, SweepOutcome, SyncReport, SyncStatus,
};

use crate::commands::common::{format_status_line, print_json, AppContext, StatusItem};
use crate::error::CliError;

pub async fn run_sync(context: &AppContext) -> Result<SyncReport, CliError> {
    let reporter = StatusReporter::new(context.engine.clone());
    let report = reporter.trigger_sync().await?;
    let status = reporter.current();

    match report.outcome {
        SweepOutcome::Offline => {
            println!("Offline, nothing sent. {}", format_status_line(&status));
        }
        SweepOutcome::AlreadyRunning => println!("A sync is already running"),
        SweepOutcome::Completed => {
            println!("Sync: {report}. {}", format_status_line(&status));
        }
    }
    Ok(report)
}

pub async fn run_status(context: &AppContext, as_json: bool) -> Result<SyncStatus, CliError> {
    let status = StatusReporter::new(context.engine.clone()).refresh().await;
    if as_json {
        print_json(&StatusItem::from(status))?;
    } else {
        println!("{}", format_status_line(&status));
        println!("Database: {}", context.db_path.display());
        match &context.settings.api_url {
            Some(api_url) => println!("API: {api_url}"),
            None => println!("API: not configured"),
        }
    }
    Ok(status)
}

/// Run the connectivity observer and status poller until Ctrl-C.
pub async fn run_watch(context: &AppContext) -> Result<(), CliError> {
    let observer = ConnectivityObserver::start(
        context.engine.clone(),
        context.probe.clone(),
        context.settings.observer_config(),
    )
    .await;
    let reporter = Arc::new(StatusReporter::new(context.engine.clone()));
    let mut updates = reporter.subscribe();
    let poller = reporter
        .clone()
        .spawn_polling(context.settings.status_poll_interval);

    println!(
        "Watching {} (Ctrl-C to stop)",
        context.db_path.display()
    );
    if observer.state().is_online() {
        if let Err(error) = reporter.trigger_sync().await {
            tracing::error!("Initial sync failed: {}", error);
        }
    }

    let mut last_printed: Option<SyncStatus> = None;
    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let status = *updates.borrow_and_update();
                if last_printed != Some(status) {
                    println!("{}", format_status_line(&status));
                    last_printed = Some(status);
                }
            }
        }
    };

    poller.abort();
    observer.shutdown().await;
    println!("Stopped watching");
    result
}
