use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use nablijven_core::config::SyncSettings;
use nablijven_core::db::SqliteStore;
use nablijven_core::models::{Detention, DetentionSession, PendingOperation, Student};
use nablijven_core::remote::{HttpRemoteApi, RemoteApi, RemoteError, RemoteRequest, RemoteResult};
use nablijven_core::services::{RecordService, Source, WriteReceipt};
use nablijven_core::sync::{
    ConnectivityProbe, ConnectivityState, HttpHealthProbe, StaticProbe, SyncEngine, SyncStatus,
};
use nablijven_core::util::{is_http_url, normalize_text_option};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

/// Global options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub offline: bool,
}

/// Everything a command needs: settings, the sync engine and the record service.
pub struct AppContext {
    pub settings: SyncSettings,
    pub db_path: PathBuf,
    pub engine: Arc<SyncEngine>,
    pub records: RecordService,
    pub probe: Arc<dyn ConnectivityProbe>,
}

impl AppContext {
    pub async fn open(options: &GlobalOptions) -> Result<Self, CliError> {
        let settings = SyncSettings::from_env()?;
        Self::open_with_settings(options, settings).await
    }

    /// Build the context; the store itself is opened lazily on first use.
    pub async fn open_with_settings(
        options: &GlobalOptions,
        mut settings: SyncSettings,
    ) -> Result<Self, CliError> {
        if let Some(api_url) = options.api_url.clone() {
            settings.api_url = Some(normalize_api_url(api_url)?);
        }
        let db_path = resolve_db_path(options.db_path.clone(), settings.db_path.clone());
        settings.db_path = Some(db_path.clone());

        let store = Arc::new(SqliteStore::new(db_path.clone()));
        let (remote, probe) = match (&settings.api_url, options.offline) {
            (Some(api_url), false) => {
                let remote: Arc<dyn RemoteApi> =
                    Arc::new(HttpRemoteApi::new(api_url.clone(), settings.request_timeout)?);
                let probe: Arc<dyn ConnectivityProbe> =
                    Arc::new(HttpHealthProbe::new(remote.clone()));
                (remote, probe)
            }
            (None, false) => {
                tracing::info!("No API URL configured, working offline");
                offline_transport()
            }
            (_, true) => offline_transport(),
        };

        let online = probe.probe().await;
        let engine = Arc::new(
            SyncEngine::new(store, remote, ConnectivityState::new(online))
                .with_retry_policy(settings.retry_policy()),
        );
        let records = RecordService::new(engine.clone());

        Ok(Self {
            settings,
            db_path,
            engine,
            records,
            probe,
        })
    }
}

/// Stand-in remote when no API is configured or `--offline` is set.
struct NoRemote;

fn offline_transport() -> (Arc<dyn RemoteApi>, Arc<dyn ConnectivityProbe>) {
    let remote: Arc<dyn RemoteApi> = Arc::new(NoRemote);
    let probe: Arc<dyn ConnectivityProbe> = Arc::new(StaticProbe::new(false));
    (remote, probe)
}

#[async_trait]
impl RemoteApi for NoRemote {
    async fn execute(&self, request: &RemoteRequest) -> RemoteResult<Value> {
        Err(RemoteError::InvalidConfiguration(format!(
            "cannot send {request}: no API URL configured"
        )))
    }
}

pub fn normalize_api_url(raw: String) -> Result<String, CliError> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| CliError::Config("API URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(CliError::Config(
            "API URL must include http:// or https://".to_string(),
        ))
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, env_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path.or(env_db_path).unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nablijven")
        .join("nablijven.db")
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Stderr note when a listing came from the local mirror.
pub fn report_source(source: Source) {
    if source == Source::Mirror {
        eprintln!("(offline: showing locally cached records)");
    }
}

pub fn describe_write(action: &str, receipt: &WriteReceipt) -> String {
    match receipt.sync {
        Some(report) if !report.skipped() && report.failed == 0 && report.exhausted == 0 => {
            format!("{action} and synced")
        }
        Some(report) => format!(
            "{action}, queued as #{} (sync: {report})",
            receipt.pending_id
        ),
        None => format!("{action}, queued as #{} until online", receipt.pending_id),
    }
}

pub fn format_student_lines(students: &[Student]) -> Vec<String> {
    students
        .iter()
        .map(|student| {
            format!(
                "{:<28}  {:<24}  {:<6}  {}",
                student.id,
                student.name,
                student.grade,
                student.day.as_str()
            )
        })
        .collect()
}

pub fn format_detention_lines(detentions: &[Detention]) -> Vec<String> {
    detentions
        .iter()
        .map(|detention| {
            let mut line = format!(
                "{}  #{:<2}  {:<10}  {:<28}  {}",
                detention.date,
                detention.number,
                detention.day_of_week.as_str(),
                detention.student,
                detention.id
            );
            if let Some(reason) = &detention.reason {
                line.push_str(&format!("  ({reason})"));
            }
            if let Some(period) = detention.time_period {
                line.push_str(&format!("  [{period}]"));
            }
            line
        })
        .collect()
}

pub fn format_session_lines(sessions: &[DetentionSession]) -> Vec<String> {
    sessions
        .iter()
        .map(|session| {
            let count = session.detentions.len();
            format!(
                "{}  {:<10}  {count} leerling{}",
                session.date,
                session.day_of_week.as_str(),
                if count == 1 { "" } else { "en" }
            )
        })
        .collect()
}

pub fn format_pending_lines(operations: &[PendingOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            format!(
                "#{:<5} {:<6} {:<9} {:<28}  {}",
                operation.id.get(),
                operation.op_type.as_str(),
                operation.entity.as_str(),
                operation.record_id().unwrap_or("?"),
                format_timestamp(operation.timestamp)
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// JSON form of a status snapshot
#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub state: nablijven_core::sync::SyncState,
    pub label: String,
    pub detail: Option<&'static str>,
    pub online: bool,
    pub pending_count: usize,
    pub syncing: bool,
    pub store_available: bool,
}

impl From<SyncStatus> for StatusItem {
    fn from(status: SyncStatus) -> Self {
        Self {
            state: status.state(),
            label: status.label(),
            detail: status.detail(),
            online: status.online,
            pending_count: status.pending_count,
            syncing: status.syncing,
            store_available: status.store_available,
        }
    }
}

pub fn format_status_line(status: &SyncStatus) -> String {
    match status.detail() {
        Some(detail) => format!("{} - {detail}", status.label()),
        None => status.label(),
    }
}
