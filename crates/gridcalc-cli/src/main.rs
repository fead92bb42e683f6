//! gridcalc CLI - recalculate, validate and analyze workbooks

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gridcalc::prelude::*;
use gridcalc::{load_cases, Decimal, DEFAULT_MIN_DEPENDENCIES};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(author, version, about = "Deterministic spreadsheet formula engine")]
struct Cli {
    /// Calculation settings (JSON), replacing the workbook's own
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Resolve circular references by iteration
    #[arg(long, global = true)]
    iterative: bool,

    /// Worker threads for wide levels (1 disables the pool)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a workbook, then apply edits and print what changed
    Calc {
        /// Workbook file (JSON)
        book: PathBuf,

        /// Edit as Sheet!A1=value; repeatable, applied in one pass
        #[arg(short, long = "edit")]
        edits: Vec<Edit>,

        /// Print change-sets as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check golden cases against a workbook; fails when any case fails
    Validate {
        /// Workbook file (JSON)
        book: PathBuf,

        /// Golden cases file (JSON array)
        golden: PathBuf,

        /// Absolute tolerance for financial formulas
        #[arg(long)]
        financial_tolerance: Option<Decimal>,

        /// Absolute tolerance for other numbers
        #[arg(long)]
        numeric_tolerance: Option<Decimal>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize formulas, categories and dependencies
    Analyze {
        /// Workbook file (JSON)
        book: PathBuf,

        /// Write the full analysis as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reference count at which a formula counts as complex
        #[arg(long, default_value_t = DEFAULT_MIN_DEPENDENCIES)]
        min_deps: usize,
    },

    /// List circular references
    Cycles {
        /// Workbook file (JSON)
        book: PathBuf,
    },

    /// Evaluate one formula against an empty workbook
    Eval {
        /// Formula text; the leading '=' is optional
        formula: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Calc { book, edits, json } => calc(&cli, book, edits, *json),
        Commands::Validate {
            book,
            golden,
            financial_tolerance,
            numeric_tolerance,
            json,
        } => {
            let mut policy = TolerancePolicy::default();
            if let Some(tolerance) = financial_tolerance {
                policy.financial = *tolerance;
            }
            if let Some(tolerance) = numeric_tolerance {
                policy.numeric = *tolerance;
            }
            validate(&cli, book, golden, policy, *json)
        }
        Commands::Analyze { book, output, min_deps } => analyze(&cli, book, output.as_deref(), *min_deps),
        Commands::Cycles { book } => cycles(&cli, book),
        Commands::Eval { formula } => eval(formula),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Read a workbook file and apply the global settings flags
fn load_book(cli: &Cli, path: &Path) -> Result<WorkbookSource> {
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut source = WorkbookSource::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to read workbook '{}'", path.display()))?;

    let mut settings: CalculationSettings = match &cli.config {
        Some(config) => {
            let file = File::open(config).with_context(|| format!("Failed to open '{}'", config.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to read settings '{}'", config.display()))?
        }
        None => source.settings.clone().unwrap_or_default(),
    };
    if cli.iterative {
        settings.iterative = true;
    }
    if cli.threads == Some(1) {
        settings.parallel = false;
    }
    source.settings = Some(settings);
    Ok(source)
}

fn import(cli: &Cli, path: &Path) -> Result<(Engine, ChangeSet)> {
    let source = load_book(cli, path)?;
    let (mut engine, initial) =
        Engine::import(&source).with_context(|| format!("Failed to import '{}'", path.display()))?;
    if let Some(threads) = cli.threads.filter(|&n| n > 1) {
        engine
            .set_thread_count(threads)
            .context("Failed to start worker threads")?;
    }
    Ok((engine, initial))
}

fn calc(cli: &Cli, book: &Path, edits: &[Edit], json: bool) -> Result<()> {
    let (mut engine, initial) = import(cli, book)?;
    let changes = if edits.is_empty() {
        None
    } else {
        Some(engine.calculate(edits).context("Failed to apply edits")?)
    };

    if json {
        let output = serde_json::json!({ "initial": initial, "edits": changes });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_changes("Initial state", &initial);
    if let Some(changes) = &changes {
        println!();
        print_changes("Edits", changes);
    }
    Ok(())
}

fn print_changes(title: &str, changes: &ChangeSet) {
    let stats = &changes.stats;
    println!(
        "{title}: {} changed, {} formulas, {} evaluated in {} levels, {} errors",
        changes.len(),
        stats.formula_count,
        stats.cells_calculated,
        stats.levels,
        stats.errors
    );
    for change in changes.iter() {
        println!("  {}!{} = {}", change.sheet, change.address, change.value);
    }
    for failure in &changes.non_convergent {
        println!(
            "  warning: no convergence after {} iterations (max delta {}): {}",
            failure.iterations,
            failure.max_delta,
            failure.cells.join(", ")
        );
    }
}

fn validate(cli: &Cli, book: &Path, golden: &Path, policy: TolerancePolicy, json: bool) -> Result<()> {
    let source = load_book(cli, book)?;
    let file = File::open(golden).with_context(|| format!("Failed to open '{}'", golden.display()))?;
    let cases =
        load_cases(BufReader::new(file)).with_context(|| format!("Failed to read golden cases '{}'", golden.display()))?;

    let report = FormulaValidator::new(policy)
        .replay(&source, &cases)
        .with_context(|| format!("Failed to import '{}'", book.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.report());
    }

    if !report.is_success() {
        bail!("{} of {} golden cases failed", report.failed.len(), report.total());
    }
    Ok(())
}

fn analyze(cli: &Cli, book: &Path, output: Option<&Path>, min_deps: usize) -> Result<()> {
    let (engine, _) = import(cli, book)?;
    let analysis = WorkbookAnalysis::of(&engine, min_deps);

    print!("{}", analysis.report());
    if let Some(path) = output {
        std::fs::write(path, analysis.to_json()?).with_context(|| format!("Failed to write '{}'", path.display()))?;
        eprintln!("Wrote analysis to '{}'", path.display());
    }
    Ok(())
}

fn cycles(cli: &Cli, book: &Path) -> Result<()> {
    let (engine, _) = import(cli, book)?;
    let workbook = engine.workbook();
    let components = engine.detect_cycles();

    if components.is_empty() {
        println!("No circular references");
        return Ok(());
    }
    for (i, component) in components.iter().enumerate() {
        let cells: Vec<String> = component.iter().map(|key| workbook.qualified_address(*key)).collect();
        println!("{}. {}", i + 1, cells.join(" -> "));
    }
    Ok(())
}

fn eval(formula: &str) -> Result<()> {
    let input = if formula.starts_with('=') {
        formula.to_string()
    } else {
        format!("={formula}")
    };

    let mut engine = Engine::new(Workbook::new())?;
    engine
        .calculate(&[Edit::new("Sheet1", "A1", input)])
        .context("Failed to evaluate formula")?;
    println!("{}", engine.value("Sheet1", "A1")?);
    Ok(())
}
