use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use unbind_engine::{rewrite_source, Mode, RewriteOutcome};
use unbind_layout::{LayoutIndex, LayoutSession};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "unbind",
    version,
    about = "Rewrite ButterKnife bindings to findViewById or View Binding"
)]
struct Cli {
    /// Java file or directory to rewrite
    path: PathBuf,
    /// Require `path` to be a single file; never recurse
    #[arg(long)]
    file_only: bool,
    /// Rewrite strategy
    #[arg(long, value_enum, default_value_t = ModeArg::ViewBinding)]
    mode: ModeArg,
    /// Root used to locate layout XML (defaults to the target's directory)
    #[arg(long)]
    project_root: Option<PathBuf>,
    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    FindViewById,
    ViewBinding,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::FindViewById => Mode::FindViewById,
            ModeArg::ViewBinding => Mode::ViewBinding,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

#[derive(Serialize)]
struct FileReport {
    path: PathBuf,
    changed: bool,
    layout: Option<String>,
    diagnostics: Vec<DiagnosticReport>,
}

#[derive(Serialize)]
struct DiagnosticReport {
    severity: String,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct BatchReport {
    files: Vec<FileReport>,
    layouts_repaired: Vec<PathBuf>,
    dry_run: bool,
}

fn run(cli: Cli) -> Result<i32> {
    if !cli.path.exists() {
        bail!("path does not exist: {}", cli.path.display());
    }
    if cli.file_only && !cli.path.is_file() {
        bail!("--file-only requires a file, got {}", cli.path.display());
    }

    let project_root = cli
        .project_root
        .clone()
        .or_else(|| default_project_root(&cli.path))
        .unwrap_or_else(|| PathBuf::from("."));
    debug!(root = %project_root.display(), "scanning for layouts");
    let mut session = LayoutSession::new(LayoutIndex::scan(&project_root));

    let targets = collect_targets(&cli.path)?;
    let mode = Mode::from(cli.mode);

    let mut files = Vec::new();
    for target in &targets {
        match process_file(target, mode, &mut session, cli.dry_run) {
            Ok(report) => {
                if !cli.json {
                    print_file_line(&report, cli.dry_run);
                }
                files.push(report);
            }
            // A broken file never aborts the batch.
            Err(err) => eprintln!("{}: {:#}", target.display(), err),
        }
    }

    let layouts_repaired = if cli.dry_run {
        session.dirty_paths().iter().map(|p| p.to_path_buf()).collect()
    } else {
        session.commit_all()?
    };

    if cli.json {
        let report = BatchReport {
            files,
            layouts_repaired,
            dry_run: cli.dry_run,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for path in &layouts_repaired {
            let verb = if cli.dry_run { "would repair" } else { "repaired" };
            println!("{}: {verb} layout", path.display());
        }
    }

    Ok(0)
}

fn default_project_root(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        Some(path.to_path_buf())
    } else {
        path.parent().map(Path::to_path_buf)
    }
}

fn collect_targets(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut targets = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", path.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("java")
        {
            targets.push(entry.path().to_path_buf());
        }
    }
    Ok(targets)
}

fn process_file(
    path: &Path,
    mode: Mode,
    session: &mut LayoutSession,
    dry_run: bool,
) -> Result<FileReport> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let outcome = rewrite_source(&source, mode, Some(session))
        .with_context(|| format!("rewriting {}", path.display()))?;

    if outcome.changed && !dry_run {
        std::fs::write(path, &outcome.source)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(file_report(path, outcome))
}

fn file_report(path: &Path, outcome: RewriteOutcome) -> FileReport {
    FileReport {
        path: path.to_path_buf(),
        changed: outcome.changed,
        layout: outcome.layout,
        diagnostics: outcome
            .diagnostics
            .into_iter()
            .map(|d| DiagnosticReport {
                severity: d.severity.to_string(),
                code: d.code,
                message: d.message,
            })
            .collect(),
    }
}

fn print_file_line(report: &FileReport, dry_run: bool) {
    let status = match (report.changed, dry_run) {
        (true, true) => "would rewrite",
        (true, false) => "rewritten",
        (false, _) => "unchanged",
    };
    match &report.layout {
        Some(layout) if report.changed => {
            println!("{}: {status} (layout {layout})", report.path.display())
        }
        _ => println!("{}: {status}", report.path.display()),
    }
    for d in &report.diagnostics {
        println!("  {}[{}]: {}", d.severity, d.code, d.message);
    }
}
