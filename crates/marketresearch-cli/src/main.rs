use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use marketresearch_core::{
    Config, ConfigLoader, CrewOptions, ExportOptions, Report, ReportView, TelemetryOptions,
    generate_report_file, init_telemetry, render_html, run_market_research_with_options,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "marketresearch",
    version,
    about = "Company market research reports as DOCX and HTML"
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the research crew for a query and export the report.
    Run(RunArgs),
    /// Convert existing markdown reports to DOCX.
    Export(ExportArgs),
    /// Print the categorised sources cited by a report.
    Sources(SourcesArgs),
    /// Write the navigable HTML view of a report.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Company name for the output filename (guessed from the report otherwise).
    #[arg(long)]
    company: Option<String>,

    /// Directory the DOCX is written to (defaults to `report.output_dir`).
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Natural-language research query.
    #[arg(long, default_value = "Overview of Delfi Diagnostics Early Cancer Detection")]
    query: String,

    /// Minimum number of sources to gather (defaults to `crew.min_sources`).
    #[arg(long)]
    min_sources: Option<usize>,

    /// Also save the raw markdown next to the DOCX.
    #[arg(long, default_value_t = false)]
    keep_markdown: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Markdown file, or directory of `.md` files.
    #[arg(long)]
    input: PathBuf,

    /// Recurse into subdirectories when `input` is a directory.
    #[arg(long, default_value_t = false)]
    recursive: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct SourcesArgs {
    /// Markdown report to inspect.
    #[arg(long)]
    input: PathBuf,

    /// Emit JSON instead of a grouped listing.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Markdown report to render.
    #[arg(long)]
    input: PathBuf,

    /// HTML file to write.
    #[arg(long)]
    output: PathBuf,

    /// Link the page's download button to this DOCX path or URL.
    #[arg(long)]
    download_url: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.clone())?;

    init_telemetry(TelemetryOptions {
        env_filter: Some(format!(
            "{level},marketresearch_core={level}",
            level = config.logging.level
        )),
        ..TelemetryOptions::default()
    })?;

    match cli.command {
        Command::Run(args) => {
            let rt = Runtime::new()?;
            rt.block_on(run_command(&config, args))?
        }
        Command::Export(args) => export_command(&config, args)?,
        Command::Sources(args) => sources_command(args)?,
        Command::Render(args) => render_command(&config, args)?,
    }

    Ok(())
}

fn export_options(config: &Config, output: OutputArgs) -> ExportOptions {
    let mut options = ExportOptions::from(&config.report).with_company(output.company);
    if let Some(dir) = output.output_dir {
        options = options.with_output_dir(dir);
    }
    options
}

async fn run_command(config: &Config, args: RunArgs) -> Result<()> {
    if args.query.trim().is_empty() {
        bail!("query must not be empty");
    }
    info!(query = %args.query, "starting market research");

    let mut crew = CrewOptions::new(&args.query).with_config(&config.crew);
    if let Some(min_sources) = args.min_sources {
        crew = crew.with_min_sources(min_sources);
    }

    let content = run_market_research_with_options(crew).await?;
    let options = export_options(config, args.output);
    let generated = generate_report_file(&content, &options)?;

    if args.keep_markdown {
        let markdown = generated.path.with_extension("md");
        fs::write(&markdown, &content)
            .with_context(|| format!("failed to write {}", markdown.display()))?;
        info!(path = %markdown.display(), "markdown saved");
    }

    println!("{}", generated.path.display());
    Ok(())
}

fn export_command(config: &Config, args: ExportArgs) -> Result<()> {
    let inputs = collect_reports(&args.input, args.recursive)?;
    if inputs.is_empty() {
        warn!(path = %args.input.display(), "no markdown reports found");
        return Ok(());
    }

    let options = export_options(config, args.output);
    let jobs = plan_exports(inputs, &options)?;
    for job in jobs {
        let generated = generate_report_file(&job.content, &options)
            .with_context(|| format!("failed to export {}", job.input.display()))?;
        println!("{} -> {}", job.input.display(), generated.path.display());
    }
    Ok(())
}

/// A markdown input paired with the DOCX path it will be exported to.
struct ExportJob {
    input: PathBuf,
    content: String,
    target: PathBuf,
}

/// Read every input and resolve its output path, refusing to run when two
/// inputs would write the same file.
fn plan_exports(inputs: Vec<PathBuf>, options: &ExportOptions) -> Result<Vec<ExportJob>> {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut jobs = Vec::with_capacity(inputs.len());

    for input in inputs {
        let content = fs::read_to_string(&input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let target = options.target_path(&content);

        if let Some(previous) = claimed.get(&target) {
            bail!(
                "{} and {} would both be exported to {}; export them separately or with distinct --company names",
                previous.display(),
                input.display(),
                target.display()
            );
        }
        claimed.insert(target.clone(), input.clone());
        jobs.push(ExportJob {
            input,
            content,
            target,
        });
    }

    debug!(
        jobs = jobs.len(),
        targets = ?jobs.iter().map(|job| job.target.display().to_string()).collect::<Vec<_>>(),
        "export plan ready"
    );
    Ok(jobs)
}

fn sources_command(args: SourcesArgs) -> Result<()> {
    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let report = Report::parse(&content);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.sources)?);
        return Ok(());
    }

    if report.sources.is_empty() {
        println!("(no sources cited)");
        return Ok(());
    }

    for group in report.sources.groups() {
        println!("{}", group.category);
        for citation in &group.citations {
            println!("  - {} <{}>", citation.display_text, citation.url);
            println!("    section: {}", citation.section_title);
        }
    }
    Ok(())
}

fn render_command(config: &Config, args: RenderArgs) -> Result<()> {
    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let view = ReportView::from_report(&Report::parse(&content), config.report.title.clone());
    let html = render_html(&view, args.download_url.as_deref(), None)?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&args.output, html)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("{}", args.output.display());
    Ok(())
}

fn collect_reports(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|file| {
            file.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        })
        .collect();
    files.sort();
    Ok(files)
}
