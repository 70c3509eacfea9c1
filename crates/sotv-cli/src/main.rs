use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sotv_core::{CatalogLoadError, Priority, ReportFormat, RunError};
use sotv_report::{emit, emit_summary};
use sotv_runner::{now_unix, Options, RunFilter, Runner};

#[derive(Parser)]
#[command(name = "sotv", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default sotv.toml into the target directory
    Init {
        #[arg(long, default_value = ".")]
        target: PathBuf,
    },

    /// Parse a catalog and list its rules without evaluating anything
    Rules {
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Evaluate the catalog against a file tree and print a report
    Validate {
        /// Evaluate every rule (the default when no filter is given)
        #[arg(long, default_value_t = true)]
        all: bool,
        /// Evaluate a single rule by id
        #[arg(long)]
        rule: Option<String>,
        /// Restrict to one priority tier: must, should, have, all
        #[arg(long, default_value = "all")]
        priority: String,
        /// Report format: json, text, markdown
        #[arg(long, default_value = "text")]
        output: String,
        /// Print only the scorecard lines, not per-rule results
        #[arg(long, default_value_t = false)]
        summary: bool,
        /// Catalog path, overriding sotv.toml
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Directory to validate (defaults to the current directory)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Write the report to a file instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
        /// Abandon the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<i64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            if let Some(load) = e.downcast_ref::<CatalogLoadError>() {
                eprint!("{}", load);
            } else if let Some(run) = e.downcast_ref::<RunError>() {
                match run {
                    RunError::Incomplete {
                        evaluated,
                        total,
                        reason,
                        partial,
                    } => {
                        for r in partial {
                            eprintln!(
                                "[{}] {}  {}",
                                if r.passed { "PASS" } else { "FAIL" },
                                r.rule_id,
                                r.message
                            );
                        }
                        eprintln!(
                            "INCOMPLETE: {} of {} rules evaluated ({})",
                            evaluated, total, reason
                        );
                    }
                    RunError::NoRulesMatched { filter } => {
                        eprintln!("no rules matched: {}", filter);
                    }
                }
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Init { target } => {
            let path = Options::config_path(&target);
            Options::default_for_repo().save_to(&path)?;
            println!("Wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Rules { catalog } => {
            let catalog = sotv_catalog::load_catalog(&catalog)?;
            for rule in &catalog.rules {
                println!(
                    "{}  {:?}  {:?}  {:?}",
                    rule.rule_id, rule.kind, rule.severity, rule.priority
                );
            }
            println!("{} rules, catalog {}", catalog.len(), catalog.catalog_hash);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate {
            all: _,
            rule,
            priority,
            output,
            summary,
            catalog,
            target,
            report,
            timeout_secs,
        } => {
            let target_root = match target {
                Some(t) => t,
                None => std::env::current_dir()?,
            };
            let filter = RunFilter {
                rule_id: rule,
                priority: parse_priority(&priority)?,
            };
            let format = parse_format(&output)?;
            let deadline = timeout_secs.map(|s| now_unix() + s);

            let runner = Runner::open(&target_root, catalog.as_deref())?;
            let run_report = runner.run(&filter, deadline)?;

            let rendered = if summary {
                emit_summary(&run_report, format)?
            } else {
                emit(&run_report, format)?
            };
            match report {
                Some(path) => std::fs::write(&path, rendered)?,
                None if rendered.ends_with('\n') => print!("{}", rendered),
                None => println!("{}", rendered),
            }

            if run_report.scorecard.passed {
                Ok(ExitCode::SUCCESS)
            } else {
                // Blocking failures get their own exit code so CI can tell
                // a failed validation from a broken invocation.
                Ok(ExitCode::from(2))
            }
        }
    }
}

fn parse_priority(s: &str) -> anyhow::Result<Option<Priority>> {
    match s {
        "all" => Ok(None),
        "must" => Ok(Some(Priority::Must)),
        "should" => Ok(Some(Priority::Should)),
        "have" => Ok(Some(Priority::Have)),
        other => anyhow::bail!("unknown priority '{}', expected must|should|have|all", other),
    }
}

fn parse_format(s: &str) -> anyhow::Result<ReportFormat> {
    match s {
        "json" => Ok(ReportFormat::Json),
        "text" => Ok(ReportFormat::Text),
        "markdown" => Ok(ReportFormat::Markdown),
        other => anyhow::bail!("unknown output '{}', expected json|text|markdown", other),
    }
}
