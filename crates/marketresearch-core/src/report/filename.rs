//! Output filename derivation.

const SCAN_LINES: usize = 10;
const TITLE_KEYWORDS: [&str; 3] = ["overview", "analysis", "report"];
const LEAD_WORDS: [&str; 3] = ["of", "for", "about"];
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_NAME: &str = "Company";

/// Guess the company a report is about from its opening lines.
///
/// Looks for a title-like line ("overview", "analysis", "report") and takes
/// up to two words after its first "of"/"for"/"about"; otherwise the first
/// two words of the first non-heading line; otherwise `"Company"`.
pub fn extract_company_name(content: &str) -> String {
    let first_lines: Vec<&str> = content.lines().take(SCAN_LINES).collect();

    for line in &first_lines {
        let lower = line.to_lowercase();
        if !TITLE_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
            continue;
        }

        let words: Vec<&str> = line.trim().trim_matches('#').split_whitespace().collect();
        let lead = words
            .iter()
            .position(|word| LEAD_WORDS.contains(&word.to_lowercase().as_str()));
        if let Some(index) = lead {
            let name = words[index + 1..].iter().take(2).copied().collect::<Vec<_>>();
            if !name.is_empty() {
                return name.join(" ");
            }
        }
    }

    first_lines
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split_whitespace().take(2).collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Strip characters no common filesystem accepts and collapse whitespace.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Filename for the exported report about `company`.
pub fn build_filename(company: &str) -> String {
    let company = sanitize_filename(company);
    let company = if company.is_empty() {
        FALLBACK_NAME
    } else {
        company.as_str()
    };
    sanitize_filename(&format!("Market Analysis of {company}.docx"))
}

pub fn extract_and_build_filename(content: &str) -> String {
    build_filename(&extract_company_name(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_heading_names_the_company() {
        let content = "## Overview of Acme Robotics\nBody text.";
        assert_eq!(extract_company_name(content), "Acme Robotics");
        assert_eq!(
            extract_and_build_filename(content),
            "Market Analysis of Acme Robotics.docx"
        );
    }

    #[test]
    fn lead_word_match_is_case_insensitive() {
        assert_eq!(
            extract_company_name("# Market Analysis For Tesla Inc. in EVs"),
            "Tesla Inc."
        );
    }

    #[test]
    fn dangling_lead_word_keeps_scanning() {
        let content = "# Report of\n## Analysis about Delfi Diagnostics Early\n";
        assert_eq!(extract_company_name(content), "Delfi Diagnostics");
    }

    #[test]
    fn falls_back_to_first_body_line() {
        let content = "# Executive Summary\n\nMoonshot Labs builds rockets.";
        assert_eq!(extract_company_name(content), "Moonshot Labs");
    }

    #[test]
    fn falls_back_to_placeholder() {
        assert_eq!(extract_company_name(""), "Company");
        assert_eq!(extract_company_name("# Only\n## Headings"), "Company");
    }

    #[test]
    fn invalid_characters_are_removed() {
        let filename = build_filename("Acme: <Robo|tics>?");
        assert_eq!(filename, "Market Analysis of Acme Robotics.docx");
        assert!(!filename.contains(INVALID_CHARS));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(sanitize_filename("  a \t b\n c  "), "a b c");
    }

    #[test]
    fn empty_company_uses_placeholder() {
        assert_eq!(build_filename("///"), "Market Analysis of Company.docx");
    }
}
