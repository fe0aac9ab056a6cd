//! Line-oriented block parsing.

use serde::{Deserialize, Serialize};

/// Deepest heading level a document style can express.
pub const MAX_HEADING_LEVEL: u8 = 9;

/// One parsed unit of report text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    BulletItem { text: String },
    NumberedItem { text: String },
    Quote { text: String },
}

impl Block {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::Heading {
            level: level.clamp(1, MAX_HEADING_LEVEL),
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Block::Heading { text, .. }
            | Block::Paragraph { text }
            | Block::BulletItem { text }
            | Block::NumberedItem { text }
            | Block::Quote { text } => text,
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Block::Heading { .. })
    }
}

/// A heading line split into level and title, if the line is one.
pub(crate) fn parse_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim();
    if !trimmed.starts_with('#') {
        return None;
    }

    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    let level = hashes.min(MAX_HEADING_LEVEL as usize) as u8;
    let text = trimmed
        .trim_matches(|c: char| c == '#' || c.is_whitespace())
        .to_string();
    Some((level, text))
}

/// Classify a single line. Blank lines yield nothing.
pub(crate) fn parse_line(line: &str) -> Option<Block> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some((level, text)) = parse_heading(trimmed) {
        return Some(Block::Heading { level, text });
    }

    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
    {
        return Some(Block::BulletItem {
            text: rest.trim().to_string(),
        });
    }

    if let Some(rest) = strip_number_marker(trimmed) {
        return Some(Block::NumberedItem {
            text: rest.trim().to_string(),
        });
    }

    if let Some(rest) = trimmed.strip_prefix('>') {
        return Some(Block::Quote {
            text: rest.trim_start_matches('>').trim().to_string(),
        });
    }

    Some(Block::paragraph(trimmed))
}

/// Every non-empty line becomes exactly one block, in input order.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    text.lines().filter_map(parse_line).collect()
}

fn strip_number_marker(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_level_counts_leading_hashes() {
        assert_eq!(parse_blocks("### Title"), vec![Block::heading(3, "Title")]);
    }

    #[test]
    fn heading_level_clamps_to_nine() {
        let line = format!("{} Deep", "#".repeat(12));
        assert_eq!(parse_blocks(&line), vec![Block::heading(9, "Deep")]);
    }

    #[test]
    fn heading_text_drops_trailing_hashes() {
        assert_eq!(
            parse_blocks("  ## Market Analysis ##  "),
            vec![Block::heading(2, "Market Analysis")]
        );
    }

    #[test]
    fn list_quote_and_paragraph_lines() {
        let text = "- first\n* second\n1. numbered\n12. later\n> quoted\nplain text\n";
        assert_eq!(
            parse_blocks(text),
            vec![
                Block::BulletItem {
                    text: "first".into()
                },
                Block::BulletItem {
                    text: "second".into()
                },
                Block::NumberedItem {
                    text: "numbered".into()
                },
                Block::NumberedItem {
                    text: "later".into()
                },
                Block::Quote {
                    text: "quoted".into()
                },
                Block::paragraph("plain text"),
            ]
        );
    }

    #[test]
    fn blank_lines_emit_nothing() {
        assert!(parse_blocks("").is_empty());
        assert!(parse_blocks("\n   \n\t\n").is_empty());
        assert_eq!(parse_blocks("a\n\nb").len(), 2);
    }

    #[test]
    fn marker_without_space_is_a_paragraph() {
        assert_eq!(parse_blocks("-dash"), vec![Block::paragraph("-dash")]);
        assert_eq!(parse_blocks("1.5 million"), vec![Block::paragraph("1.5 million")]);
        assert_eq!(parse_blocks("**Bold**"), vec![Block::paragraph("**Bold**")]);
    }
}
