use crate::config::CrewConfig;
use crate::tasks::{
    AnalysisTask, MIN_SOURCES_KEY, QUERY_KEY, REPORT_KEY, ScrapeTask, SearchTask, VERBOSE_KEY,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// The crew's tasks, exposed so callers can inspect or extend the graph.
#[derive(Clone)]
pub struct CrewTasks {
    pub search: Arc<SearchTask>,
    pub scrape: Arc<ScrapeTask>,
    pub analysis: Arc<AnalysisTask>,
}

impl CrewTasks {
    fn new() -> Self {
        Self {
            search: Arc::new(SearchTask),
            scrape: Arc::new(ScrapeTask),
            analysis: Arc::new(AnalysisTask),
        }
    }
}

fn build_graph() -> (Arc<graph_flow::Graph>, CrewTasks) {
    let tasks = CrewTasks::new();

    let builder = GraphBuilder::new("market_research_crew")
        .add_task(tasks.search.clone())
        .add_task(tasks.scrape.clone())
        .add_task(tasks.analysis.clone())
        .add_edge(tasks.search.id(), tasks.scrape.id())
        .add_edge(tasks.scrape.id(), tasks.analysis.id())
        .set_start_task(tasks.search.id());

    (Arc::new(builder.build()), tasks)
}

fn new_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("crew-{}", nanos)
}

/// Options for a single crew run.
#[derive(Debug, Clone)]
pub struct CrewOptions<'a> {
    pub query: &'a str,
    pub session_id: Option<String>,
    pub min_sources: usize,
    /// Log every agent's brief at info level.
    pub verbose: bool,
}

impl<'a> CrewOptions<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            session_id: None,
            min_sources: CrewConfig::default().min_sources,
            verbose: CrewConfig::default().verbose,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_config(mut self, config: &CrewConfig) -> Self {
        self.min_sources = config.min_sources;
        self.verbose = config.verbose;
        self
    }

    pub fn with_min_sources(mut self, min_sources: usize) -> Self {
        self.min_sources = min_sources;
        self
    }
}

/// Run the research crew for `query` with default settings and return the
/// markdown report.
pub async fn run_market_research(query: &str) -> Result<String> {
    run_market_research_with_options(CrewOptions::new(query)).await
}

/// Run the research crew with custom options.
pub async fn run_market_research_with_options(options: CrewOptions<'_>) -> Result<String> {
    let (graph, tasks) = build_graph();

    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let session_id = options.session_id.clone().unwrap_or_else(new_session_id);
    let session = Session::new_from_task(session_id.clone(), tasks.search.id());

    session
        .context
        .set(QUERY_KEY, options.query.to_string())
        .await;
    session
        .context
        .set(MIN_SOURCES_KEY, options.min_sources.max(1))
        .await;
    session.context.set(VERBOSE_KEY, options.verbose).await;

    storage
        .save(session)
        .await
        .map_err(|err| anyhow!("failed to persist crew session: {err}"))?;

    info!(%session_id, query = %options.query, "crew kickoff");

    loop {
        let result = runner
            .run(&session_id)
            .await
            .map_err(|err| anyhow!("crew execution failure: {err}"))?;

        match result.status {
            ExecutionStatus::Completed => break,
            ExecutionStatus::WaitingForInput => continue,
            ExecutionStatus::Error(message) => return Err(anyhow!(message)),
        }
    }

    let session = storage
        .get(&session_id)
        .await
        .map_err(|err| anyhow!("failed to reload crew session: {err}"))?
        .ok_or_else(|| anyhow!("crew session missing after execution"))?;

    let report: String = session
        .context
        .get(REPORT_KEY)
        .await
        .ok_or_else(|| anyhow!("crew finished without producing a report"))?;

    Ok(report)
}

/// Anything that can turn a research query into a markdown report.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    async fn research(&self, query: &str) -> Result<String>;
}

/// The default backend: the graph_flow research crew.
#[derive(Debug, Clone, Default)]
pub struct GraphFlowCrew {
    config: CrewConfig,
}

impl GraphFlowCrew {
    pub fn new(config: CrewConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResearchBackend for GraphFlowCrew {
    async fn research(&self, query: &str) -> Result<String> {
        run_market_research_with_options(CrewOptions::new(query).with_config(&self.config)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crew_options_follow_config() {
        let config = CrewConfig {
            min_sources: 4,
            verbose: false,
        };
        let options = CrewOptions::new("Overview of Acme").with_config(&config);
        assert_eq!(options.min_sources, 4);
        assert!(!options.verbose);
        assert!(CrewOptions::new("Overview of Acme").verbose);
    }

    #[tokio::test]
    async fn quiet_crew_still_reports() {
        let config = CrewConfig {
            min_sources: 2,
            verbose: false,
        };
        let report = GraphFlowCrew::new(config)
            .research("Overview of Acme Robotics")
            .await
            .expect("crew should succeed");
        assert!(report.starts_with("# Market Analysis of Acme Robotics"));
    }
}
