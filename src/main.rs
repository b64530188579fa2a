//! strata CLI: layered knowledge graph engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use strata_kg::config::EngineConfig;
use strata_kg::engine::Engine;
use strata_kg::expand::ExpansionOutcome;
use strata_kg::expand::scorer::IterativeScorer;
use strata_kg::graph::Triple;

#[derive(Parser)]
#[command(name = "strata", version, about = "Layered knowledge graph engine")]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON file with an array of facts to ingest before the command runs.
    /// May be repeated.
    #[arg(long, global = true)]
    facts: Vec<PathBuf>,

    /// Edge scorer used for link proposals.
    #[arg(long, global = true, value_enum, default_value_t = ScorerKind::CommonNeighbor)]
    scorer: ScorerKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScorerKind {
    CommonNeighbor,
    Iterative,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-level counts, bootstrap state, invented predicates and goals.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Wildcard query over one or all levels.
    Query {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        predicate: Option<String>,
        #[arg(long)]
        object: Option<String>,
        /// Restrict to one level.
        #[arg(long)]
        level: Option<usize>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Rebuild derived layers.
    Expand {
        /// Expand to full depth even before bootstrap.
        #[arg(long)]
        force: bool,
    },

    /// Run predicate invention on the deepest layer.
    Invent {
        /// Density a cluster must exceed.
        #[arg(long, default_value = "0.3")]
        threshold: f64,
    },

    /// Seed unknown entities, wait for the daemon, and print goals.
    Curiosity {
        /// Labels to seed as unresolved.
        #[arg(long, required = true, num_args = 1..)]
        unknown: Vec<String>,
        /// How long to wait for scans before printing, in milliseconds.
        /// Defaults to a bit more than one scan interval.
        #[arg(long)]
        wait_ms: Option<u64>,
    },

    /// Print a JSON snapshot of one or all levels.
    Export {
        #[arg(long)]
        level: Option<usize>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

fn load_facts(path: &Path) -> Result<Vec<Triple>> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&content).into_diagnostic()
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let engine = match cli.scorer {
        ScorerKind::CommonNeighbor => Engine::new(config)?,
        ScorerKind::Iterative => {
            let scorer = IterativeScorer::new(config.scorer_iterations, config.scorer_seed);
            Engine::with_scorer(config, scorer)?
        }
    };

    for path in &cli.facts {
        let facts = load_facts(path)?;
        let report = engine.ingest(facts)?;
        for rejected in &report.rejected {
            eprintln!(
                "{}: fact #{} rejected: {}",
                path.display(),
                rejected.index,
                rejected.error
            );
        }
        eprintln!(
            "Ingested {} facts from {} (total {}, {} repairs{})",
            report.accepted,
            path.display(),
            report.total_facts,
            report.repairs,
            if report.bootstrap_triggered { ", bootstrapped" } else { "" }
        );
    }

    match cli.command {
        Commands::Stats { json } => {
            let stats = engine.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
            } else {
                print!("{stats}");
            }
        }

        Commands::Query {
            subject,
            predicate,
            object,
            level,
            limit,
        } => {
            let hits = engine.query(&(subject, predicate, object), level, limit);
            if hits.is_empty() {
                println!("No matches.");
            }
            for hit in hits {
                println!(
                    "[L{}] {} --{}--> {} (confidence {:.3})",
                    hit.level, hit.subject, hit.predicate, hit.object, hit.confidence
                );
            }
        }

        Commands::Expand { force } => match engine.expand(force)? {
            ExpansionOutcome::Expanded { levels } => {
                for level in levels {
                    println!(
                        "level {}: {} nodes, {} edges, {} proposals",
                        level.level, level.nodes, level.edges, level.proposals
                    );
                }
            }
            ExpansionOutcome::NothingToExpand => println!("No facts ingested; nothing to expand."),
            ExpansionOutcome::Skipped => println!("Expansion already in flight."),
        },

        Commands::Invent { threshold } => {
            let invented = engine.invent(threshold)?;
            if invented.is_empty() {
                println!("No new predicates.");
            }
            for p in invented {
                let members: Vec<&str> = p.members.iter().map(String::as_str).collect();
                println!("{} (density {:.3}): {}", p.name, p.density, members.join(", "));
            }
        }

        Commands::Curiosity { unknown, wait_ms } => {
            engine.seed_curiosity(unknown)?;
            let wait = wait_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| engine.config().curiosity_interval() + Duration::from_millis(250));
            std::thread::sleep(wait);
            engine.stop_curiosity();
            let goals = engine.goals();
            if goals.is_empty() {
                println!("No goals yet.");
            }
            for goal in goals {
                println!(
                    "{} [{}] {}",
                    goal.created_at.to_rfc3339(),
                    goal.target_entity,
                    goal.description
                );
            }
        }

        Commands::Export { level } => {
            let snapshot = engine.export(level)?;
            println!("{}", serde_json::to_string_pretty(&snapshot).into_diagnostic()?);
        }

        Commands::Config => print!("{}", engine.config().to_toml()?),
    }

    Ok(())
}
