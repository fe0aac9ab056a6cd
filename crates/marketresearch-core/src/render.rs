//! Navigable HTML view of a parsed report.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::MarketResearchError;
use crate::report::{Block, InlineSegment, Report, SourceCategory, section_anchor, split_links};

const REPORT_TEMPLATE_NAME: &str = "report.html";
const REPORT_TEMPLATE: &str = include_str!("../templates/report.html");
const HTML_MAX_HEADING: u8 = 6;

#[derive(Debug, Clone, Serialize)]
pub struct NavEntry {
    pub anchor: String,
    pub title: String,
    pub level: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentView {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewNode {
    Heading {
        level: u8,
        anchor: String,
        segments: Vec<SegmentView>,
    },
    Paragraph {
        segments: Vec<SegmentView>,
    },
    Quote {
        segments: Vec<SegmentView>,
    },
    List {
        ordered: bool,
        items: Vec<Vec<SegmentView>>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceView {
    pub label: String,
    pub href: Option<String>,
    pub url: String,
    pub context: Option<String>,
    pub section: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceGroupView {
    pub category: SourceCategory,
    pub title: &'static str,
    pub sources: Vec<SourceView>,
}

/// Report blocks annotated for page rendering: heading anchors, inline links,
/// grouped list items and the side navigation.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub title: String,
    pub navigation: Vec<NavEntry>,
    pub nodes: Vec<ViewNode>,
    pub sources: Vec<SourceGroupView>,
}

impl ReportView {
    pub fn from_report(report: &Report, title: impl Into<String>) -> Self {
        let mut navigation = Vec::new();
        let mut nodes: Vec<ViewNode> = Vec::new();

        for block in &report.blocks {
            match block {
                Block::Heading { level, text } => {
                    let anchor = section_anchor(text, Some(navigation.len()));
                    navigation.push(NavEntry {
                        anchor: anchor.clone(),
                        title: text.clone(),
                        level: *level,
                    });
                    nodes.push(ViewNode::Heading {
                        level: (*level).min(HTML_MAX_HEADING),
                        anchor,
                        segments: segments(text),
                    });
                }
                Block::Paragraph { text } => nodes.push(ViewNode::Paragraph {
                    segments: segments(text),
                }),
                Block::Quote { text } => nodes.push(ViewNode::Quote {
                    segments: segments(text),
                }),
                Block::BulletItem { text } => push_list_item(&mut nodes, false, text),
                Block::NumberedItem { text } => push_list_item(&mut nodes, true, text),
            }
        }

        let sources = report
            .sources
            .groups()
            .iter()
            .map(|group| SourceGroupView {
                category: group.category,
                title: group.category.label(),
                sources: group
                    .citations
                    .iter()
                    .map(|citation| SourceView {
                        label: citation.display_text.clone(),
                        href: safe_href(&citation.url),
                        url: citation.url.clone(),
                        context: citation.context().map(str::to_string),
                        section: citation.section_title.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            title: title.into(),
            navigation,
            nodes,
            sources,
        }
    }
}

fn push_list_item(nodes: &mut Vec<ViewNode>, ordered: bool, text: &str) {
    if let Some(ViewNode::List {
        ordered: current,
        items,
    }) = nodes.last_mut()
    {
        if *current == ordered {
            items.push(segments(text));
            return;
        }
    }
    nodes.push(ViewNode::List {
        ordered,
        items: vec![segments(text)],
    });
}

fn segments(text: &str) -> Vec<SegmentView> {
    split_links(text)
        .into_iter()
        .map(|segment| match segment {
            InlineSegment::Text { text } => SegmentView { text, href: None },
            InlineSegment::Link { label, url } => SegmentView {
                href: safe_href(&url),
                text: label,
            },
        })
        .collect()
}

/// Only web links become anchors; anything else is shown as text. The
/// returned value is the normalised URL and is emitted unescaped.
fn safe_href(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let href = parsed.as_str();
    is_attribute_safe(href).then(|| href.to_string())
}

fn is_attribute_safe(value: &str) -> bool {
    !value.contains(['"', '\'', '<', '>', '`']) && !value.chars().any(char::is_whitespace)
}

/// Render the full report page. `download_url`, when given, adds a download
/// button to the top bar; `back_url` adds a link back to the query form.
pub fn render_html(
    view: &ReportView,
    download_url: Option<&str>,
    back_url: Option<&str>,
) -> Result<String, MarketResearchError> {
    let mut env = Environment::new();
    env.add_template(REPORT_TEMPLATE_NAME, REPORT_TEMPLATE)?;
    let template = env.get_template(REPORT_TEMPLATE_NAME)?;
    let html = template.render(context! {
        report => view,
        download_url => download_url.filter(|url| is_attribute_safe(url)),
        back_url => back_url.filter(|url| is_attribute_safe(url)),
    })?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Acme Report\n## Overview\nAcme per [Forbes](https://forbes.com/acme).\n- one\n- two\n1. first\n## Overview\n> <script>alert(1)</script>\n[bad](javascript:alert(1))\n";

    #[test]
    fn headings_get_unique_anchors_and_nav_entries() {
        let view = ReportView::from_report(&Report::parse(SAMPLE), "Acme");
        let anchors: Vec<_> = view.navigation.iter().map(|e| e.anchor.as_str()).collect();
        assert_eq!(anchors, vec!["0-acme-report", "1-overview", "2-overview"]);
    }

    #[test]
    fn consecutive_items_share_a_list() {
        let view = ReportView::from_report(&Report::parse(SAMPLE), "Acme");
        let lists: Vec<_> = view
            .nodes
            .iter()
            .filter_map(|node| match node {
                ViewNode::List { ordered, items } => Some((*ordered, items.len())),
                _ => None,
            })
            .collect();
        assert_eq!(lists, vec![(false, 2), (true, 1)]);
    }

    #[test]
    fn page_links_navigation_to_sections() {
        let view = ReportView::from_report(&Report::parse(SAMPLE), "Acme");
        let html = render_html(&view, Some("/download"), None).unwrap();

        assert!(html.contains("id=\"1-overview\""));
        assert!(html.contains("href=\"#1-overview\""));
        assert!(html.contains("href=\"https://forbes.com/acme\""));
        assert!(html.contains("href=\"/download\""));
        assert!(html.contains("Industry News"));
    }

    #[test]
    fn markup_in_report_text_is_escaped() {
        let view = ReportView::from_report(&Report::parse(SAMPLE), "Acme");
        let html = render_html(&view, None, None).unwrap();

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("href=\"javascript:"));
    }

    #[test]
    fn empty_report_renders_a_page() {
        let view = ReportView::from_report(&Report::default(), "Empty");
        let html = render_html(&view, None, None).unwrap();
        assert!(html.contains("<title>Empty</title>"));
        assert!(view.navigation.is_empty());
    }
}
