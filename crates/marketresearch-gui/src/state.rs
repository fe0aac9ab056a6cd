use crate::config::AppConfig;
use crate::metrics;
use anyhow::{Context, Result, anyhow};
use axum::response::sse::Event;
use dashmap::DashMap;
use marketresearch_core::{
    ExportOptions, GraphFlowCrew, Report, ResearchBackend, SourceCategory, generate_report_file,
};
use serde::Serialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{self as stream, Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    report_service: Arc<ReportService>,
    gui_enabled: bool,
    auth_token: Option<Arc<String>>,
}

impl AppState {
    pub async fn try_new(config: &AppConfig) -> Result<Self> {
        let backend: Arc<dyn ResearchBackend> = Arc::new(GraphFlowCrew::new(config.crew.clone()));
        Self::with_backend(config, backend)
    }

    /// Build the state around a custom research backend.
    pub fn with_backend(config: &AppConfig, backend: Arc<dyn ResearchBackend>) -> Result<Self> {
        if config.report_title.trim().is_empty() {
            return Err(anyhow!("report title must not be empty"));
        }

        let export = ExportOptions {
            output_dir: config.output_dir.clone(),
            title: config.report_title.clone(),
            company: None,
            generated_on: None,
        };
        let service = ReportService::new(
            backend,
            export,
            config.max_concurrency,
            config.generation_timeout,
            config.max_reports,
        );

        Ok(Self {
            report_service: Arc::new(service),
            gui_enabled: config.gui_enabled,
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        })
    }

    pub fn report_service(&self) -> Arc<ReportService> {
        self.report_service.clone()
    }

    pub fn gui_enabled(&self) -> bool {
        self.gui_enabled
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }

    pub fn metrics(&self) -> ReportMetrics {
        self.report_service.metrics()
    }
}

/// Runs research requests in the background and keeps their results.
///
/// At most `max_reports` records are retained; the oldest finished ones are
/// dropped, with their files, when a new report starts.
pub struct ReportService {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    max_reports: usize,
    sequence: AtomicU64,
    backend: Arc<dyn ResearchBackend>,
    export: ExportOptions,
    timeout: Duration,
    reports: Arc<DashMap<String, ReportRecord>>,
    streams: Arc<DashMap<String, broadcast::Sender<ReportEvent>>>,
}

impl ReportService {
    pub fn new(
        backend: Arc<dyn ResearchBackend>,
        export: ExportOptions,
        max_concurrency: usize,
        timeout: Duration,
        max_reports: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            max_reports: max_reports.max(1),
            sequence: AtomicU64::new(0),
            backend,
            export,
            timeout,
            reports: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
        }
    }

    pub fn title(&self) -> &str {
        &self.export.title
    }

    pub fn start_report(&self, request: ReportRequest) -> String {
        let report_id = Uuid::new_v4().to_string();

        let sender = self
            .streams
            .entry(report_id.clone())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(32);
                tx
            })
            .clone();
        let _ = sender.send(ReportEvent::started());
        self.evict_finished();
        self.reports.insert(
            report_id.clone(),
            ReportRecord {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                query: request.query.clone(),
                phase: ReportPhase::Running,
            },
        );

        // Each report gets its own directory so same-company reports never
        // share a file.
        let export = self
            .export
            .clone()
            .with_output_dir(self.report_dir(&report_id))
            .with_company(request.company.clone());
        let job = ReportJob {
            report_id: report_id.clone(),
            request,
            backend: self.backend.clone(),
            export,
            timeout: self.timeout,
        };
        let semaphore = self.semaphore.clone();
        let reports = self.reports.clone();
        let streams = self.streams.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => job.run().await,
                Err(err) => Err(anyhow!(err)),
            };
            let elapsed_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;
            let report_id = job.report_id;

            let (phase, event) = match result {
                Ok(outcome) => {
                    info!(%report_id, filename = %outcome.filename, "report completed");
                    metrics::report_completed(
                        &report_id,
                        &outcome.filename,
                        outcome.source_count,
                        elapsed_ms,
                    );
                    let event = ReportEvent::completed(&outcome);
                    (
                        ReportPhase::Completed {
                            outcome: Arc::new(outcome),
                            event: event.clone(),
                        },
                        event,
                    )
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(%report_id, error = %message, "report failed");
                    metrics::report_failed(&report_id, elapsed_ms, &message);
                    let event = ReportEvent::error(&message);
                    (
                        ReportPhase::Failed {
                            error: message,
                            event: event.clone(),
                        },
                        event,
                    )
                }
            };

            if let Some(mut record) = reports.get_mut(&report_id) {
                record.phase = phase;
            }
            if let Some((_, sender)) = streams.remove(&report_id) {
                let _ = sender.send(event);
            }
        });

        report_id
    }

    fn report_dir(&self, report_id: &str) -> PathBuf {
        self.export.output_dir.join(report_id)
    }

    /// Make room for one more record. Running reports are never evicted, so
    /// the map may exceed the cap while they are all in flight.
    fn evict_finished(&self) {
        let excess = (self.reports.len() + 1).saturating_sub(self.max_reports);
        if excess == 0 {
            return;
        }

        let mut finished: Vec<(u64, String)> = self
            .reports
            .iter()
            .filter(|entry| !matches!(entry.value().phase, ReportPhase::Running))
            .map(|entry| (entry.value().sequence, entry.key().clone()))
            .collect();
        finished.sort_unstable();

        for (_, report_id) in finished.into_iter().take(excess) {
            if self.reports.remove(&report_id).is_none() {
                continue;
            }
            let dir = self.report_dir(&report_id);
            info!(%report_id, "evicting finished report");
            tokio::spawn(async move {
                if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %dir.display(), error = %err, "failed to remove report files");
                    }
                }
            });
        }
    }

    pub fn status(&self, report_id: &str) -> Option<ReportStatus> {
        self.reports
            .get(report_id)
            .map(|record| record.status(report_id))
    }

    pub fn list(&self) -> Vec<ReportStatus> {
        let mut reports: Vec<(u64, ReportStatus)> = self
            .reports
            .iter()
            .map(|entry| (entry.value().sequence, entry.value().status(entry.key())))
            .collect();
        reports.sort_by_key(|(sequence, _)| *sequence);
        reports.into_iter().map(|(_, status)| status).collect()
    }

    pub fn outcome(&self, report_id: &str) -> Option<Arc<ReportOutcome>> {
        self.reports
            .get(report_id)
            .and_then(|record| match &record.phase {
                ReportPhase::Completed { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
    }

    pub fn metrics(&self) -> ReportMetrics {
        let running_reports = self
            .reports
            .iter()
            .filter(|entry| matches!(entry.value().phase, ReportPhase::Running))
            .count();
        let available_permits = self.semaphore.available_permits();
        let generating_reports = self.max_concurrency.saturating_sub(available_permits);
        ReportMetrics {
            max_concurrency: self.max_concurrency,
            available_permits,
            running_reports,
            generating_reports,
            queued_reports: running_reports.saturating_sub(generating_reports),
            total_reports: self.reports.len(),
            max_reports: self.max_reports,
        }
    }

    pub fn event_stream(&self, report_id: &str) -> Option<SseStream> {
        if let Some(stream) = self.final_event(report_id) {
            return Some(stream);
        }

        let live = self.streams.get(report_id).map(|sender| {
            let rx = sender.subscribe();
            let stream = BroadcastStream::new(rx).filter_map(|event| match event {
                Ok(event) => Some(Result::<Event, Infallible>::Ok(event.into_sse_event())),
                Err(err) => {
                    warn!(error = %err, "report event stream lagged");
                    None
                }
            });
            Box::pin(stream) as SseStream
        });

        // The job may have finished between the two lookups.
        live.or_else(|| self.final_event(report_id))
    }

    fn final_event(&self, report_id: &str) -> Option<SseStream> {
        let record = self.reports.get(report_id)?;
        match &record.phase {
            ReportPhase::Completed { event, .. } | ReportPhase::Failed { event, .. } => {
                let event = event.clone().into_sse_event();
                let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(event)]);
                Some(Box::pin(stream) as SseStream)
            }
            ReportPhase::Running => None,
        }
    }
}

struct ReportJob {
    report_id: String,
    request: ReportRequest,
    backend: Arc<dyn ResearchBackend>,
    export: ExportOptions,
    timeout: Duration,
}

impl ReportJob {
    async fn run(&self) -> Result<ReportOutcome> {
        let content = tokio::time::timeout(self.timeout, self.backend.research(&self.request.query))
            .await
            .map_err(|_| {
                anyhow!(
                    "report generation timed out after {}s",
                    self.timeout.as_secs()
                )
            })?
            .context("research failed")?;

        let sources = Report::parse(&content).sources;
        let options = self.export.clone();
        let generated =
            tokio::task::spawn_blocking(move || generate_report_file(&content, &options))
                .await
                .context("export task panicked")??;

        info!(report_id = %self.report_id, path = %generated.path.display(), "report exported");

        Ok(ReportOutcome {
            report_id: self.report_id.clone(),
            filename: generated.filename,
            path: generated.path,
            content: generated.content,
            source_count: sources.len(),
            categories: sources.categories().collect(),
        })
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub query: String,
    pub company: Option<String>,
}

impl ReportRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            company: None,
        }
    }

    pub fn with_company(mut self, company: Option<String>) -> Self {
        self.company = company;
        self
    }
}

/// A finished report on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub report_id: String,
    pub filename: String,
    pub path: PathBuf,
    #[serde(skip)]
    pub content: String,
    pub source_count: usize,
    pub categories: Vec<SourceCategory>,
}

#[derive(Debug)]
struct ReportRecord {
    sequence: u64,
    query: String,
    phase: ReportPhase,
}

impl ReportRecord {
    fn status(&self, report_id: &str) -> ReportStatus {
        let (state, outcome, error) = match &self.phase {
            ReportPhase::Running => (ReportState::Running, None, None),
            ReportPhase::Completed { outcome, .. } => {
                (ReportState::Completed, Some(outcome.as_ref()), None)
            }
            ReportPhase::Failed { error, .. } => (ReportState::Failed, None, Some(error.clone())),
        };

        ReportStatus {
            report_id: report_id.to_string(),
            query: self.query.clone(),
            state,
            filename: outcome.map(|outcome| outcome.filename.clone()),
            source_count: outcome.map(|outcome| outcome.source_count),
            categories: outcome
                .map(|outcome| outcome.categories.clone())
                .unwrap_or_default(),
            error,
        }
    }
}

#[derive(Debug)]
enum ReportPhase {
    Running,
    Completed {
        outcome: Arc<ReportOutcome>,
        event: ReportEvent,
    },
    Failed {
        error: String,
        event: ReportEvent,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportStatus {
    pub report_id: String,
    pub query: String,
    pub state: ReportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<SourceCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ReportMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    /// Reports not yet finished, whether generating or waiting for a permit.
    pub running_reports: usize,
    pub generating_reports: usize,
    pub queued_reports: usize,
    pub total_reports: usize,
    pub max_reports: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportEvent {
    pub kind: ReportEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
}

impl ReportEvent {
    pub fn started() -> Self {
        Self {
            kind: ReportEventKind::Started,
            message: Some("report started".into()),
            filename: None,
            source_count: None,
        }
    }

    pub fn completed(outcome: &ReportOutcome) -> Self {
        Self {
            kind: ReportEventKind::Completed,
            message: Some("report completed".into()),
            filename: Some(outcome.filename.clone()),
            source_count: Some(outcome.source_count),
        }
    }

    pub fn error(error: &str) -> Self {
        Self {
            kind: ReportEventKind::Error,
            message: Some(format!("report failed: {error}")),
            filename: None,
            source_count: None,
        }
    }

    pub fn into_sse_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": ReportEventKind::Error,
                "message": "failed to serialize report event",
            })
            .to_string()
        });

        Event::default().event(self.kind.as_str()).data(data)
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportEventKind {
    Started,
    Completed,
    Error,
}

impl ReportEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            ReportEventKind::Started => "started",
            ReportEventKind::Completed => "completed",
            ReportEventKind::Error => "error",
        }
    }
}
