use std::fmt::Write as _;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, instrument};

use crate::crew::{
    ANALYST, APPENDIX_SECTION, AgentProfile, REPORT_SECTIONS, RESEARCHER, SCRAPER, TaskBrief,
    analysis_brief, scrape_brief, search_brief,
};
use crate::report::{SourceCategory, extract_company_name};

pub(crate) const QUERY_KEY: &str = "query";
pub(crate) const MIN_SOURCES_KEY: &str = "crew.min_sources";
pub(crate) const VERBOSE_KEY: &str = "crew.verbose";
pub(crate) const SOURCES_KEY: &str = "search.sources";
pub(crate) const EXTRACTS_KEY: &str = "scrape.extracts";
pub(crate) const REPORT_KEY: &str = "analysis.report";

const DEFAULT_QUERY: &str = "general market outlook";
const DEFAULT_MIN_SOURCES: usize = 12;

/// A source the search task decided is worth reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLead {
    pub title: String,
    pub url: String,
    pub category: SourceCategory,
    pub summary: String,
}

/// Content pulled from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedExtract {
    pub source: SourceLead,
    pub key_points: Vec<String>,
}

struct LeadTemplate {
    category: SourceCategory,
    title: &'static str,
    host: &'static str,
    summary: &'static str,
}

/// `{subject}` is replaced with the research subject, `{slug}` with its
/// URL-safe form.
const LEAD_CATALOG: &[LeadTemplate] = &[
    LeadTemplate {
        category: SourceCategory::MarketResearch,
        title: "Grand View Research",
        host: "www.grandviewresearch.com/industry-analysis/{slug}",
        summary: "market size and growth forecast",
    },
    LeadTemplate {
        category: SourceCategory::ScientificPublications,
        title: "Nature Medicine",
        host: "www.nature.com/articles/{slug}",
        summary: "peer-reviewed evaluation of the core technology",
    },
    LeadTemplate {
        category: SourceCategory::RegulatoryGovernment,
        title: "U.S. FDA",
        host: "www.fda.gov/search?q={slug}",
        summary: "regulatory status and guidance",
    },
    LeadTemplate {
        category: SourceCategory::IndustryNews,
        title: "Reuters",
        host: "www.reuters.com/business/{slug}",
        summary: "recent deals and competitive moves",
    },
    LeadTemplate {
        category: SourceCategory::CompanyResources,
        title: "{subject} Investor Relations",
        host: "investors.{slug}.com",
        summary: "official strategy and leadership materials",
    },
    LeadTemplate {
        category: SourceCategory::HealthcareOrganizations,
        title: "World Health Organization",
        host: "www.who.int/search?q={slug}",
        summary: "adoption context from healthcare institutions",
    },
    LeadTemplate {
        category: SourceCategory::MarketResearch,
        title: "MarketsandMarkets",
        host: "www.marketsandmarkets.com/{slug}",
        summary: "competitive landscape study",
    },
    LeadTemplate {
        category: SourceCategory::ScientificPublications,
        title: "The Lancet",
        host: "www.thelancet.com/search?q={slug}",
        summary: "clinical outcomes literature",
    },
    LeadTemplate {
        category: SourceCategory::RegulatoryGovernment,
        title: "SEC EDGAR filings",
        host: "www.sec.gov/edgar/search/#/q={slug}",
        summary: "funding and financial disclosures",
    },
    LeadTemplate {
        category: SourceCategory::IndustryNews,
        title: "Bloomberg",
        host: "www.bloomberg.com/search?query={slug}",
        summary: "executive interviews and market trends",
    },
    LeadTemplate {
        category: SourceCategory::CompanyResources,
        title: "{subject} Press Release",
        host: "{slug}.com/newsroom",
        summary: "product launches and partnerships",
    },
    LeadTemplate {
        category: SourceCategory::HealthcareOrganizations,
        title: "American Medical Association",
        host: "www.ama-assn.org/search?q={slug}",
        summary: "clinical guideline perspective",
    },
];

fn slugify(subject: &str) -> String {
    let slug: String = subject
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "company".to_string()
    } else {
        slug
    }
}

/// Research subject named by the query, reusing the report title heuristic.
pub fn research_subject(query: &str) -> String {
    extract_company_name(query.trim())
}

/// Deterministic source leads covering every category, at least `count` long.
pub fn plan_sources(subject: &str, count: usize) -> Vec<SourceLead> {
    let slug = slugify(subject);
    let count = count.max(1);

    (0..count)
        .map(|index| {
            let template = &LEAD_CATALOG[index % LEAD_CATALOG.len()];
            let round = index / LEAD_CATALOG.len();
            let mut title = template.title.replace("{subject}", subject);
            let mut url = format!("https://{}", template.host.replace("{slug}", &slug));
            if round > 0 {
                let _ = write!(title, " ({})", round + 1);
                let _ = write!(url, "&page={}", round + 1);
            }
            SourceLead {
                title,
                url,
                category: template.category,
                summary: template.summary.to_string(),
            }
        })
        .collect()
}

/// Verbose crews log each agent's brief at info level, quiet ones at debug.
async fn announce(context: &Context, agent: &AgentProfile, brief: &TaskBrief) {
    let verbose: bool = context.get(VERBOSE_KEY).await.unwrap_or(false);
    if verbose {
        info!(
            agent = agent.role,
            goal = agent.goal,
            brief = %brief.description,
            expected = brief.expected_output,
            "task brief issued"
        );
    } else {
        debug!(agent = agent.role, brief = %brief.description, "task brief issued");
    }
}

#[derive(Default)]
pub struct SearchTask;

#[async_trait]
impl Task for SearchTask {
    fn id(&self) -> &str {
        "search"
    }

    #[instrument(name = "task.search", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = context
            .get(QUERY_KEY)
            .await
            .unwrap_or_else(|| DEFAULT_QUERY.to_string());
        let min_sources: usize = context
            .get(MIN_SOURCES_KEY)
            .await
            .unwrap_or(DEFAULT_MIN_SOURCES);

        announce(&context, &RESEARCHER, &search_brief(&query, min_sources)).await;

        // Simulate search latency
        sleep(Duration::from_millis(40)).await;

        let subject = research_subject(&query);
        let sources = plan_sources(&subject, min_sources);

        info!(%query, %subject, sources = sources.len(), "researcher collected sources");

        context.set(SOURCES_KEY, &sources).await;

        Ok(TaskResult::new(
            Some(format!("Found {} sources for \"{}\"", sources.len(), query)),
            NextAction::ContinueAndExecute,
        ))
    }
}

#[derive(Default)]
pub struct ScrapeTask;

#[async_trait]
impl Task for ScrapeTask {
    fn id(&self) -> &str {
        "scrape"
    }

    #[instrument(name = "task.scrape", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let sources: Vec<SourceLead> = context.get(SOURCES_KEY).await.unwrap_or_default();
        let query: String = context
            .get(QUERY_KEY)
            .await
            .unwrap_or_else(|| DEFAULT_QUERY.to_string());
        let subject = research_subject(&query);

        announce(&context, &SCRAPER, &scrape_brief()).await;

        // Simulate page fetch latency
        sleep(Duration::from_millis(40)).await;

        let extracts: Vec<ScrapedExtract> = sources
            .into_iter()
            .map(|source| {
                let key_points = vec![
                    format!("{} reports on {} for {}", source.title, source.summary, subject),
                    format!(
                        "{} highlights momentum in the {} landscape",
                        source.title,
                        source.category.label().to_lowercase()
                    ),
                ];
                ScrapedExtract { source, key_points }
            })
            .collect();

        info!(extracts = extracts.len(), "scraper extracted content");

        context.set(EXTRACTS_KEY, &extracts).await;

        Ok(TaskResult::new(
            Some(format!("Extracted content from {} sources", extracts.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

#[derive(Default)]
pub struct AnalysisTask;

#[async_trait]
impl Task for AnalysisTask {
    fn id(&self) -> &str {
        "analysis"
    }

    #[instrument(name = "task.analysis", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let extracts: Vec<ScrapedExtract> = context.get(EXTRACTS_KEY).await.unwrap_or_default();
        let query: String = context
            .get(QUERY_KEY)
            .await
            .unwrap_or_else(|| DEFAULT_QUERY.to_string());
        let subject = research_subject(&query);

        announce(&context, &ANALYST, &analysis_brief()).await;

        let report = compose_report(&subject, &extracts);
        context.set(REPORT_KEY, report.clone()).await;

        info!(
            %subject,
            sources = extracts.len(),
            chars = report.len(),
            "analyst produced report"
        );

        Ok(TaskResult::new(Some(report), NextAction::End))
    }
}

/// Markdown report with one inline citation per paragraph and an appendix
/// grouped by category.
pub fn compose_report(subject: &str, extracts: &[ScrapedExtract]) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "# Market Analysis of {subject}");
    let _ = writeln!(report);

    for (index, section) in REPORT_SECTIONS.iter().enumerate() {
        let _ = writeln!(report, "## {section}");
        if extracts.is_empty() {
            let _ = writeln!(report, "No source material was available for this section.");
            let _ = writeln!(report);
            continue;
        }

        let primary = &extracts[index % extracts.len()];
        let secondary = &extracts[(index + REPORT_SECTIONS.len()) % extracts.len()];
        if let Some(lead) = primary.key_points.first() {
            let _ = writeln!(
                report,
                "{lead} [{}]({}).",
                primary.source.title, primary.source.url
            );
        }
        for extract in [primary, secondary] {
            if let Some(point) = extract.key_points.get(1) {
                let _ = writeln!(
                    report,
                    "- {point} [{}]({})",
                    extract.source.title, extract.source.url
                );
            }
        }
        let _ = writeln!(report);
    }

    let _ = writeln!(report, "## {APPENDIX_SECTION}");
    let mut categories: Vec<SourceCategory> = Vec::new();
    for extract in extracts {
        if !categories.contains(&extract.source.category) {
            categories.push(extract.source.category);
        }
    }
    for category in categories {
        let _ = writeln!(report, "### {}", category.label());
        for extract in extracts
            .iter()
            .filter(|extract| extract.source.category == category)
        {
            let _ = writeln!(
                report,
                "- [{}]({})",
                extract.source.title, extract.source.url
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Report, categorize};

    #[test]
    fn planned_leads_categorize_as_intended() {
        for lead in plan_sources("Acme Robotics", 12) {
            assert_eq!(
                categorize(&lead.title, &lead.url),
                lead.category,
                "{} ({})",
                lead.title,
                lead.url
            );
        }
    }

    #[test]
    fn extra_rounds_get_distinct_urls() {
        let leads = plan_sources("Acme", 14);
        assert_eq!(leads.len(), 14);
        assert_ne!(leads[0].url, leads[12].url);
        assert!(leads[12].title.ends_with("(2)"));
    }

    #[test]
    fn slug_is_url_safe() {
        assert_eq!(slugify("Moderna's COVID"), "moderna-s-covid");
        assert_eq!(slugify("!!"), "company");
    }

    #[test]
    fn composed_report_parses_into_sections_and_sources() {
        let extracts: Vec<ScrapedExtract> = plan_sources("Acme", 6)
            .into_iter()
            .map(|source| ScrapedExtract {
                key_points: vec![format!("{} point", source.title), "trend".to_string()],
                source,
            })
            .collect();
        let text = compose_report("Acme", &extracts);
        let report = Report::parse(&text);

        let headings: Vec<_> = report.headings().map(|(_, text)| text).collect();
        assert_eq!(headings[0], "Market Analysis of Acme");
        assert!(headings.contains(&"SWOT Analysis"));
        assert!(headings.contains(&APPENDIX_SECTION));
        assert_eq!(report.sources.categories().count(), 6);
        assert_eq!(extract_company_name(&text), "Acme");
    }

    #[test]
    fn empty_extracts_still_compose() {
        let text = compose_report("Acme", &[]);
        assert!(text.contains("## Conclusion"));
        assert!(Report::parse(&text).sources.is_empty());
    }
}
