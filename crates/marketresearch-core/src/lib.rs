//! MarketResearch core: report parsing and export built around a `graph_flow`
//! research crew.
//!
//! The crew (researcher, scraper, analyst) produces a markdown report; the
//! [`report`] module turns it into ordered document blocks and categorised
//! citations, which [`export`] writes as a `.docx` and [`render`] turns into a
//! navigable HTML page.

mod config;
pub mod crew;
mod error;
pub mod export;
pub mod render;
pub mod report;
mod tasks;
mod telemetry;
mod workflow;

pub use config::{Config, ConfigLoader, CrewConfig, LoggingConfig, ReportConfig};
pub use error::MarketResearchError;
pub use export::{ExportOptions, GeneratedReport, generate_report_file, render_docx};
pub use render::{ReportView, render_html};
pub use report::{
    Block, CategorizedSources, Citation, Report, SourceCategory, extract_and_build_filename,
    parse,
};
pub use tasks::{AnalysisTask, ScrapeTask, ScrapedExtract, SearchTask, SourceLead};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use workflow::{
    CrewOptions, CrewTasks, GraphFlowCrew, ResearchBackend, run_market_research,
    run_market_research_with_options,
};
