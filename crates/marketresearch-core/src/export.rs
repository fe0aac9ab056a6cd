//! WordprocessingML (`.docx`) export of a parsed report.

use std::fmt::Write as _;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use quick_xml::escape::escape;
use serde::Serialize;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::MarketResearchError;
use crate::config::ReportConfig;
use crate::report::{Block, InlineSegment, Report, build_filename, extract_company_name, split_links};

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const HYPERLINK_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
const SOURCES_HEADING: &str = "Sources";
const BASE_FONT: &str = "Calibri";
/// Half-points; 22 is 11pt.
const BASE_FONT_SIZE: u32 = 22;

/// Settings for a single export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub title: String,
    /// Overrides the company name guessed from the report text.
    pub company: Option<String>,
    /// Defaults to today (UTC).
    pub generated_on: Option<NaiveDate>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&ReportConfig::default())
    }
}

impl From<&ReportConfig> for ExportOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            title: config.title.clone(),
            company: None,
            generated_on: None,
        }
    }
}

impl ExportOptions {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_company(mut self, company: Option<String>) -> Self {
        self.company = company
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_generated_on(mut self, date: NaiveDate) -> Self {
        self.generated_on = Some(date);
        self
    }

    /// Filename `content` is exported under: the explicit company when set,
    /// the heuristic guess otherwise.
    pub fn filename_for(&self, content: &str) -> String {
        match &self.company {
            Some(company) => build_filename(company),
            None => build_filename(&extract_company_name(content)),
        }
    }

    /// Full path `content` is exported to.
    pub fn target_path(&self, content: &str) -> PathBuf {
        self.output_dir.join(self.filename_for(content))
    }

    fn date(&self) -> NaiveDate {
        self.generated_on
            .unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// Location and source text of a written report.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub path: PathBuf,
    pub filename: String,
    pub content: String,
}

/// Parse `content`, write it as a `.docx` under the configured directory and
/// return where it landed. The directory is created when missing.
pub fn generate_report_file(
    content: &str,
    options: &ExportOptions,
) -> Result<GeneratedReport, MarketResearchError> {
    let report = Report::parse(content);
    let filename = options.filename_for(content);

    let bytes = render_docx(&report, options)?;

    fs::create_dir_all(&options.output_dir)
        .map_err(|err| MarketResearchError::export_io(options.output_dir.clone(), err))?;
    let path = options.output_dir.join(&filename);
    fs::write(&path, &bytes).map_err(|err| MarketResearchError::export_io(path.clone(), err))?;

    info!(
        path = %path.display(),
        blocks = report.blocks.len(),
        sources = report.sources.len(),
        bytes = bytes.len(),
        "report document written"
    );

    Ok(GeneratedReport {
        path,
        filename,
        content: content.to_string(),
    })
}

/// Build the complete `.docx` package in memory.
pub fn render_docx(report: &Report, options: &ExportOptions) -> Result<Vec<u8>, MarketResearchError> {
    let date = options.date();
    let mut body = BodyWriter::default();

    body.paragraph(Some("Title"), true, &[Run::plain(&options.title)]);
    let generated = format!("Generated on {}", date.format("%B %-d, %Y"));
    body.paragraph(None, true, &[Run::plain(&generated)]);

    for block in &report.blocks {
        match block {
            Block::Heading { level, text } => {
                let style = format!("Heading{level}");
                body.paragraph(Some(style.as_str()), false, &[Run::plain(text)]);
            }
            Block::Paragraph { text } => body.inline(None, text),
            Block::BulletItem { text } => body.inline(Some("ListBullet"), text),
            Block::NumberedItem { text } => body.inline(Some("ListNumber"), text),
            Block::Quote { text } => body.inline(Some("Quote"), text),
        }
    }

    if !report.sources.is_empty() {
        body.paragraph(Some("Heading1"), false, &[Run::plain(SOURCES_HEADING)]);
        for group in report.sources.groups() {
            body.paragraph(Some("Heading2"), false, &[Run::plain(group.category.label())]);
            for citation in &group.citations {
                let mut runs = vec![Run::bold(&citation.display_text), Run::Break];
                runs.push(body.link_run(&citation.url, &citation.url));
                if let Some(context) = citation.context() {
                    runs.push(Run::Break);
                    runs.push(Run::italic(context));
                }
                body.paragraph(Some("ListBullet"), false, &runs);
            }
        }
    }

    debug!(links = body.links.len(), "assembled document body");

    let parts: [(&str, String); 7] = [
        ("[Content_Types].xml", content_types_xml()),
        ("_rels/.rels", package_rels_xml()),
        ("docProps/core.xml", core_props_xml(&options.title, date)),
        ("word/document.xml", body.document_xml()),
        ("word/styles.xml", styles_xml()),
        ("word/numbering.xml", numbering_xml()),
        ("word/_rels/document.xml.rels", body.document_rels_xml()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let file_options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, xml) in parts {
        zip.start_file(name, file_options)?;
        zip.write_all(xml.as_bytes()).map_err(ZipError::from)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

enum Run {
    Text { text: String, bold: bool, italic: bool },
    Link { rel_id: String, text: String },
    Break,
}

impl Run {
    fn plain(text: &str) -> Self {
        Run::Text {
            text: text.to_string(),
            bold: false,
            italic: false,
        }
    }

    fn bold(text: &str) -> Self {
        Run::Text {
            text: text.to_string(),
            bold: true,
            italic: false,
        }
    }

    fn italic(text: &str) -> Self {
        Run::Text {
            text: text.to_string(),
            bold: false,
            italic: true,
        }
    }
}

#[derive(Default)]
struct BodyWriter {
    xml: String,
    /// Hyperlink targets; index `i` is relationship `rId{i + 3}`.
    links: Vec<String>,
}

impl BodyWriter {
    /// Relationship ids 1 and 2 belong to styles and numbering.
    const FIRST_LINK_REL: usize = 3;

    fn link_run(&mut self, label: &str, url: &str) -> Run {
        if url::Url::parse(url).is_err() {
            return Run::plain(label);
        }
        let rel_id = format!("rId{}", self.links.len() + Self::FIRST_LINK_REL);
        self.links.push(url.to_string());
        Run::Link {
            rel_id,
            text: label.to_string(),
        }
    }

    fn inline(&mut self, style: Option<&str>, text: &str) {
        let runs: Vec<Run> = split_links(text)
            .into_iter()
            .map(|segment| match segment {
                InlineSegment::Text { text } => Run::plain(&text),
                InlineSegment::Link { label, url } => self.link_run(&label, &url),
            })
            .collect();
        self.paragraph(style, false, &runs);
    }

    fn paragraph(&mut self, style: Option<&str>, centered: bool, runs: &[Run]) {
        self.xml.push_str("<w:p>");
        if style.is_some() || centered {
            self.xml.push_str("<w:pPr>");
            if let Some(style) = style {
                let _ = write!(self.xml, "<w:pStyle w:val=\"{style}\"/>");
            }
            if centered {
                self.xml.push_str("<w:jc w:val=\"center\"/>");
            }
            self.xml.push_str("</w:pPr>");
        }
        for run in runs {
            match run {
                Run::Text { text, bold, italic } => {
                    self.xml.push_str("<w:r>");
                    if *bold || *italic {
                        self.xml.push_str("<w:rPr>");
                        if *bold {
                            self.xml.push_str("<w:b/>");
                        }
                        if *italic {
                            self.xml.push_str("<w:i/>");
                        }
                        self.xml.push_str("</w:rPr>");
                    }
                    let _ = write!(
                        self.xml,
                        "<w:t xml:space=\"preserve\">{}</w:t></w:r>",
                        xml_text(text)
                    );
                }
                Run::Link { rel_id, text } => {
                    let _ = write!(
                        self.xml,
                        "<w:hyperlink r:id=\"{rel_id}\"><w:r><w:rPr><w:rStyle w:val=\"Hyperlink\"/></w:rPr><w:t xml:space=\"preserve\">{}</w:t></w:r></w:hyperlink>",
                        xml_text(text)
                    );
                }
                Run::Break => self.xml.push_str("<w:r><w:br/></w:r>"),
            }
        }
        self.xml.push_str("</w:p>");
    }

    fn document_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:document xmlns:w=\"{WORD_NS}\" xmlns:r=\"{REL_NS}\"><w:body>{}\
<w:sectPr><w:pgSz w:w=\"12240\" w:h=\"15840\"/>\
<w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/>\
</w:sectPr></w:body></w:document>",
            self.xml
        )
    }

    fn document_rels_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering\" Target=\"numbering.xml\"/>",
        );
        for (index, target) in self.links.iter().enumerate() {
            let _ = write!(
                xml,
                "<Relationship Id=\"rId{}\" Type=\"{HYPERLINK_REL}\" Target=\"{}\" TargetMode=\"External\"/>",
                index + Self::FIRST_LINK_REL,
                xml_text(target)
            );
        }
        xml.push_str("</Relationships>");
        xml
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Escape for element text or attribute values, dropping code points XML 1.0 forbids.
fn xml_text(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| is_xml_char(*c)).collect();
    escape(cleaned.as_str()).into_owned()
}

fn content_types_xml() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
<Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>\
<Override PartName=\"/word/numbering.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml\"/>\
<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
</Types>"
        .to_string()
}

fn package_rels_xml() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>\
</Relationships>"
        .to_string()
}

fn core_props_xml(title: &str, date: NaiveDate) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
<dc:title>{}</dc:title><dc:creator>marketresearch</dc:creator>\
<dcterms:created xsi:type=\"dcterms:W3CDTF\">{}T00:00:00Z</dcterms:created>\
</cp:coreProperties>",
        xml_text(title),
        date.format("%Y-%m-%d")
    )
}

fn heading_size(level: u8) -> u32 {
    match level {
        1 => 32,
        2 => 28,
        3 => 26,
        4 => 24,
        _ => BASE_FONT_SIZE,
    }
}

fn styles_xml() -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:styles xmlns:w=\"{WORD_NS}\">\
<w:docDefaults><w:rPrDefault><w:rPr>\
<w:rFonts w:ascii=\"{BASE_FONT}\" w:hAnsi=\"{BASE_FONT}\" w:eastAsia=\"{BASE_FONT}\" w:cs=\"{BASE_FONT}\"/>\
<w:sz w:val=\"{BASE_FONT_SIZE}\"/><w:szCs w:val=\"{BASE_FONT_SIZE}\"/>\
</w:rPr></w:rPrDefault>\
<w:pPrDefault><w:pPr><w:spacing w:after=\"160\" w:line=\"259\" w:lineRule=\"auto\"/></w:pPr></w:pPrDefault>\
</w:docDefaults>\
<w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/><w:qFormat/></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Title\"><w:name w:val=\"Title\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
<w:pPr><w:spacing w:after=\"120\"/></w:pPr><w:rPr><w:sz w:val=\"56\"/><w:szCs w:val=\"56\"/></w:rPr></w:style>"
    );

    for level in 1..=crate::report::MAX_HEADING_LEVEL {
        let size = heading_size(level);
        let _ = write!(
            xml,
            "<w:style w:type=\"paragraph\" w:styleId=\"Heading{level}\"><w:name w:val=\"heading {level}\"/>\
<w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
<w:pPr><w:keepNext/><w:spacing w:before=\"240\" w:after=\"80\"/><w:outlineLvl w:val=\"{}\"/></w:pPr>\
<w:rPr><w:b/><w:color w:val=\"1F3864\"/><w:sz w:val=\"{size}\"/><w:szCs w:val=\"{size}\"/></w:rPr></w:style>",
            level - 1
        );
    }

    xml.push_str(
        "<w:style w:type=\"paragraph\" w:styleId=\"ListBullet\"><w:name w:val=\"List Bullet\"/><w:basedOn w:val=\"Normal\"/>\
<w:pPr><w:numPr><w:numId w:val=\"1\"/></w:numPr><w:spacing w:after=\"60\"/></w:pPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"ListNumber\"><w:name w:val=\"List Number\"/><w:basedOn w:val=\"Normal\"/>\
<w:pPr><w:numPr><w:numId w:val=\"2\"/></w:numPr><w:spacing w:after=\"60\"/></w:pPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Quote\"><w:name w:val=\"Quote\"/><w:basedOn w:val=\"Normal\"/><w:qFormat/>\
<w:pPr><w:ind w:left=\"720\" w:right=\"720\"/></w:pPr><w:rPr><w:i/><w:color w:val=\"404040\"/></w:rPr></w:style>\
<w:style w:type=\"character\" w:styleId=\"Hyperlink\"><w:name w:val=\"Hyperlink\"/>\
<w:rPr><w:color w:val=\"0563C1\"/><w:u w:val=\"single\"/></w:rPr></w:style>\
</w:styles>",
    );
    xml
}

fn numbering_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:numbering xmlns:w=\"{WORD_NS}\">\
<w:abstractNum w:abstractNumId=\"0\"><w:multiLevelType w:val=\"singleLevel\"/>\
<w:lvl w:ilvl=\"0\"><w:start w:val=\"1\"/><w:numFmt w:val=\"bullet\"/><w:lvlText w:val=\"\u{2022}\"/><w:lvlJc w:val=\"left\"/>\
<w:pPr><w:ind w:left=\"720\" w:hanging=\"360\"/></w:pPr></w:lvl></w:abstractNum>\
<w:abstractNum w:abstractNumId=\"1\"><w:multiLevelType w:val=\"singleLevel\"/>\
<w:lvl w:ilvl=\"0\"><w:start w:val=\"1\"/><w:numFmt w:val=\"decimal\"/><w:lvlText w:val=\"%1.\"/><w:lvlJc w:val=\"left\"/>\
<w:pPr><w:ind w:left=\"720\" w:hanging=\"360\"/></w:pPr></w:lvl></w:abstractNum>\
<w:num w:numId=\"1\"><w:abstractNumId w:val=\"0\"/></w:num>\
<w:num w:numId=\"2\"><w:abstractNumId w:val=\"1\"/></w:num>\
</w:numbering>"
    )
}
