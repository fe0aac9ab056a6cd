//! Agent profiles and task briefs for the research crew.

use serde::Serialize;

/// Persona an agent works under.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

pub const RESEARCHER: AgentProfile = AgentProfile {
    role: "Market Research Analyst",
    goal: "Find relevant and high-quality articles about the company and its market",
    backstory: "An experienced market research analyst who identifies reliable sources \
                and relevant company and industry content.",
};

pub const SCRAPER: AgentProfile = AgentProfile {
    role: "Content Scraper",
    goal: "Extract and process content from identified sources",
    backstory: "A web content specialist who extracts clean, relevant text without markup \
                and keeps source attribution intact.",
};

pub const ANALYST: AgentProfile = AgentProfile {
    role: "Business Analyst",
    goal: "Analyze gathered information and generate comprehensive insights with proper citations",
    backstory: "A seasoned business analyst who synthesizes findings into actionable insight \
                and backs every significant claim with a source URL.",
};

/// Instructions handed to one crew task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskBrief {
    pub agent: &'static str,
    pub description: String,
    pub expected_output: &'static str,
}

/// Source types the search brief asks for, in the order they are requested.
pub const SOURCE_TYPES: [&str; 6] = [
    "Market Research Reports",
    "Scientific Publications",
    "Regulatory & Government",
    "Industry News & Analysis",
    "Company Resources",
    "Healthcare Organizations",
];

/// Top-level sections of the analyst's report, in order.
pub const REPORT_SECTIONS: [&str; 9] = [
    "Executive Summary",
    "Company Overview",
    "Product/Service Analysis",
    "Market Analysis",
    "Business Strategy",
    "Financial Analysis",
    "SWOT Analysis",
    "Future Outlook",
    "Conclusion",
];

pub const APPENDIX_SECTION: &str = "Appendix: Sources and Citations";

pub fn search_brief(query: &str, min_sources: usize) -> TaskBrief {
    TaskBrief {
        agent: RESEARCHER.role,
        description: format!(
            "Search for comprehensive articles and reliable sources about {query}. \
             Cover these source types: {}. Prefer recent, authoritative sources and \
             identify at least {min_sources} of them.",
            SOURCE_TYPES.join(", ")
        ),
        expected_output: "A list of relevant articles with URLs and brief descriptions, \
                          organized by category.",
    }
}

pub fn scrape_brief() -> TaskBrief {
    TaskBrief {
        agent: SCRAPER.role,
        description: "Extract clean content from each source: key data points and \
                      statistics, quotes, publication details and methodology."
            .to_string(),
        expected_output: "Structured markdown content per source with attribution.",
    }
}

pub fn analysis_brief() -> TaskBrief {
    TaskBrief {
        agent: ANALYST.role,
        description: format!(
            "Write a market research report with sections: {}; finish with \"{APPENDIX_SECTION}\". \
             Cite inline as \"Text [Source Name](URL)\", never show raw URLs in the text, \
             and group the appendix by source category.",
            REPORT_SECTIONS.join(", ")
        ),
        expected_output: "A comprehensive market research report in markdown format.",
    }
}
