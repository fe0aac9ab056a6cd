//! Inline citation extraction and keyword categorisation.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::blocks::parse_heading;

/// Section title used for citations that precede every heading.
pub const DEFAULT_SECTION: &str = "General";

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]\n]*)\]\(([^)\n]*)\)").expect("invalid link regex"));

/// Topical bucket assigned to a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceCategory {
    #[serde(rename = "Market Research")]
    MarketResearch,
    #[serde(rename = "Scientific Publications")]
    ScientificPublications,
    #[serde(rename = "Regulatory & Government")]
    RegulatoryGovernment,
    #[serde(rename = "Industry News")]
    IndustryNews,
    #[serde(rename = "Company Resources")]
    CompanyResources,
    #[serde(rename = "Healthcare Organizations")]
    HealthcareOrganizations,
    #[serde(rename = "Other Sources")]
    Other,
}

impl SourceCategory {
    pub fn label(self) -> &'static str {
        match self {
            SourceCategory::MarketResearch => "Market Research",
            SourceCategory::ScientificPublications => "Scientific Publications",
            SourceCategory::RegulatoryGovernment => "Regulatory & Government",
            SourceCategory::IndustryNews => "Industry News",
            SourceCategory::CompanyResources => "Company Resources",
            SourceCategory::HealthcareOrganizations => "Healthcare Organizations",
            SourceCategory::Other => "Other Sources",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Keyword table evaluated top to bottom; the first hit wins.
pub const CATEGORY_KEYWORDS: &[(SourceCategory, &[&str])] = &[
    (
        SourceCategory::MarketResearch,
        &[
            "research",
            "market analysis",
            "forecast",
            "report",
            "grandview",
            "frost",
            "marketsandmarkets",
            "statista",
            "mckinsey",
            "gartner",
        ],
    ),
    (
        SourceCategory::ScientificPublications,
        &[
            "journal",
            "nature",
            "science",
            "pubmed",
            "ncbi",
            "lancet",
            "nejm",
            "arxiv",
            "springer",
            "elsevier",
            "wiley",
            "study",
            "doi.org",
        ],
    ),
    (
        SourceCategory::RegulatoryGovernment,
        &[
            "fda",
            "regulat",
            "government",
            ".gov",
            "sec.gov",
            "europa.eu",
            "policy",
            "federal",
            "ministry",
        ],
    ),
    (
        SourceCategory::IndustryNews,
        &[
            "news",
            "reuters",
            "bloomberg",
            "forbes",
            "techcrunch",
            "cnbc",
            "wsj",
            "ft.com",
            "financial times",
            "fiercebiotech",
            "businesswire",
        ],
    ),
    (
        SourceCategory::CompanyResources,
        &[
            "press release",
            "investor",
            "about",
            "careers",
            "official",
            "company",
            "blog",
        ],
    ),
    (
        SourceCategory::HealthcareOrganizations,
        &[
            "health",
            "hospital",
            "clinic",
            "medical",
            "association",
            "who.int",
            "cancer.org",
            "mayo",
        ],
    ),
];

/// A single inline `[label](url)` reference found in the report text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub display_text: String,
    pub url: String,
    pub surrounding_line: String,
    pub section_title: String,
    pub category: SourceCategory,
}

impl Citation {
    pub fn new(
        display_text: impl Into<String>,
        url: impl Into<String>,
        surrounding_line: impl Into<String>,
        section_title: impl Into<String>,
    ) -> Self {
        let display_text = display_text.into();
        let url = url.into();
        let category = categorize(&display_text, &url);
        Self {
            display_text,
            url,
            surrounding_line: surrounding_line.into(),
            section_title: section_title.into(),
            category,
        }
    }

    /// The surrounding line, when it adds anything beyond the label itself.
    pub fn context(&self) -> Option<&str> {
        let line = self.surrounding_line.trim();
        (!line.is_empty() && line != self.display_text.trim()).then_some(line)
    }
}

/// Host component of `url`, lowercased. Scheme-less values are tolerated.
pub fn url_host(url: &str) -> Option<String> {
    if let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
    {
        return Some(host);
    }

    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().trim();
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// Assign a category by matching the label and the URL host against
/// [`CATEGORY_KEYWORDS`] in table order.
pub fn categorize(label: &str, url: &str) -> SourceCategory {
    let label = label.to_lowercase();
    let host = url_host(url).unwrap_or_default();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| label.contains(keyword) || host.contains(keyword))
        })
        .map(|(category, _)| *category)
        .unwrap_or(SourceCategory::Other)
}

/// Every inline link in `text`, in order of appearance, tagged with the most
/// recent heading.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut section = DEFAULT_SECTION.to_string();

    for line in text.lines() {
        if let Some((_, title)) = parse_heading(line) {
            section = title;
        }

        for caps in LINK_PATTERN.captures_iter(line) {
            citations.push(Citation::new(
                &caps[1],
                &caps[2],
                line.trim(),
                section.clone(),
            ));
        }
    }

    citations
}

/// A run of block text: either plain or an inline link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InlineSegment {
    Text { text: String },
    Link { label: String, url: String },
}

/// Split `text` around its inline links. Empty runs are omitted.
pub fn split_links(text: &str) -> Vec<InlineSegment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in LINK_PATTERN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(InlineSegment::Text {
                text: text[cursor..whole.start()].to_string(),
            });
        }
        segments.push(InlineSegment::Link {
            label: caps[1].to_string(),
            url: caps[2].to_string(),
        });
        cursor = whole.end();
    }

    if cursor < text.len() {
        segments.push(InlineSegment::Text {
            text: text[cursor..].to_string(),
        });
    }

    segments
}

/// Citations grouped by category, in first-seen order at both levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedSources {
    groups: Vec<SourceGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub category: SourceCategory,
    pub citations: Vec<Citation>,
}

impl CategorizedSources {
    pub fn from_citations<I>(citations: I) -> Self
    where
        I: IntoIterator<Item = Citation>,
    {
        let mut groups: Vec<SourceGroup> = Vec::new();
        for citation in citations {
            match groups
                .iter_mut()
                .find(|group| group.category == citation.category)
            {
                Some(group) => group.citations.push(citation),
                None => groups.push(SourceGroup {
                    category: citation.category,
                    citations: vec![citation],
                }),
            }
        }
        Self { groups }
    }

    pub fn groups(&self) -> &[SourceGroup] {
        &self.groups
    }

    pub fn get(&self, category: SourceCategory) -> Option<&[Citation]> {
        self.groups
            .iter()
            .find(|group| group.category == category)
            .map(|group| group.citations.as_slice())
    }

    pub fn categories(&self) -> impl Iterator<Item = SourceCategory> + '_ {
        self.groups.iter().map(|group| group.category)
    }

    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.groups.iter().flat_map(|group| group.citations.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.citations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
