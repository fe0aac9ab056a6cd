//! Markdown report transformation.
//!
//! A report is parsed once into an ordered block sequence (for document and
//! page rendering) plus the inline citations grouped by inferred topic (for
//! the sources appendix). Parsing never fails; unrecognised lines degrade to
//! plain paragraphs.

mod blocks;
mod citations;
mod filename;

pub use blocks::{Block, MAX_HEADING_LEVEL, parse_blocks};
pub use citations::{
    CATEGORY_KEYWORDS, CategorizedSources, Citation, DEFAULT_SECTION, InlineSegment,
    SourceCategory, SourceGroup, categorize, extract_citations, split_links, url_host,
};
pub use filename::{
    build_filename, extract_and_build_filename, extract_company_name, sanitize_filename,
};

use serde::{Deserialize, Serialize};

/// Parsed report: blocks in input order plus categorised sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub blocks: Vec<Block>,
    pub sources: CategorizedSources,
}

impl Report {
    pub fn parse(text: &str) -> Self {
        Self {
            blocks: parse_blocks(text),
            sources: CategorizedSources::from_citations(extract_citations(text)),
        }
    }

    pub fn headings(&self) -> impl Iterator<Item = (u8, &str)> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Heading { level, text } => Some((*level, text.as_str())),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.sources.is_empty()
    }
}

pub fn parse(text: &str) -> Report {
    Report::parse(text)
}

/// HTML id for a heading; `index` disambiguates repeated titles.
pub fn section_anchor(title: &str, index: Option<usize>) -> String {
    let base: String = title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    match index {
        Some(index) => format!("{index}-{base}"),
        None => base,
    }
}
