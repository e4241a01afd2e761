//! llm-clean CLI: OntoClean meta-property analysis and upper-ontology
//! classification with LLMs.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use llm_clean::classify::Classifier;
use llm_clean::config::CleanConfig;
use llm_clean::experiment::{RunSummary, run_classification, run_meta_properties};
use llm_clean::evaluate::{evaluate, load_property_table, predictions_from_store};
use llm_clean::export;
use llm_clean::llm::executor::RequestExecutor;
use llm_clean::metaprop::{AnalysisMode, MetaPropertyAnalyzer, MetaPropertyResult, Property};
use llm_clean::ontology::load_ontologies;
use llm_clean::paths::CleanPaths;
use llm_clean::prompt::PromptBuilder;
use llm_clean::prompt::background::{BackgroundTable, Backgrounds};
use llm_clean::store::{ResultStore, Strategy};
use llm_clean::terms::{TermRequest, load_terms};

const DEFAULT_ANALYSIS_MODEL: &str = "gemini";
const DEFAULT_CLASSIFICATION_MODEL: &str = "openai/gpt-4o";

#[derive(Parser)]
#[command(
    name = "llm-clean",
    version,
    about = "Ontological analysis of terms with large language models"
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/llm-clean/config.toml, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model: `gemini`, `anthropic`, or a `vendor/model` gateway identifier.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Accept any `vendor/model` identifier, not only the supported list.
    #[arg(long, global = true)]
    allow_unlisted_model: bool,

    /// Total request attempts on HTTP 429, including the first.
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Backoff after the first rate-limited attempt, in milliseconds.
    #[arg(long, global = true)]
    base_delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the meta-properties of a single term.
    Analyze {
        /// The term to analyse.
        term: String,

        /// Short definition of the term.
        #[arg(long)]
        description: Option<String>,

        /// Example sentence using the term.
        #[arg(long)]
        usage: Option<String>,

        #[arg(long, value_enum, default_value_t = ModeArg::Agents)]
        mode: ModeArg,

        /// Print the full result as JSON instead of one line.
        #[arg(long, short)]
        verbose: bool,

        /// Write the JSON result to a file.
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        backgrounds: BackgroundArgs,
    },

    /// Analyse the meta-properties of every term in a file.
    AnalyzeBatch {
        /// Terms file (.json or .tsv).
        #[arg(long)]
        terms: PathBuf,

        /// Result store (default: $XDG_DATA_HOME/llm-clean/results/meta_property_results.json).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Only process the first N terms (0 for all).
        #[arg(long, default_value = "0")]
        limit: usize,

        #[arg(long, value_enum, default_value_t = ModeArg::Agents)]
        mode: ModeArg,

        #[command(flatten)]
        backgrounds: BackgroundArgs,
    },

    /// Classify terms into upper-ontology classes.
    Classify {
        /// Terms file (.json or .tsv).
        #[arg(long)]
        terms: PathBuf,

        /// Ontology definitions (JSON object keyed by ontology name).
        #[arg(long)]
        ontologies: PathBuf,

        /// Result store (default: $XDG_DATA_HOME/llm-clean/results/experiment_results.json).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Strategies to run (repeatable; default: both).
        #[arg(long = "strategy", value_enum)]
        strategies: Vec<StrategyArg>,

        /// Only process the first N terms (0 for all).
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Export a result store as TSV.
    Export {
        /// Result store to read.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Read the default meta-property store instead of the classification one.
        #[arg(long)]
        meta: bool,

        /// Output file (default: stdout).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Score meta-property predictions against a ground-truth TSV.
    Evaluate {
        /// Ground truth: TSV with `term` and one column per property.
        truth: PathBuf,

        /// Predictions as a meta-property TSV export, instead of a store.
        #[arg(long, conflicts_with = "store")]
        predictions: Option<PathBuf>,

        /// Meta-property store (default: $XDG_DATA_HOME/llm-clean/results/meta_property_results.json).
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Show counts of stored results.
    Summary {
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long)]
        meta: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One specialised request per meta-property.
    Agents,
    /// A single request for all five meta-properties.
    Combined,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Agents => AnalysisMode::Agents,
            ModeArg::Combined => AnalysisMode::Combined,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    OneShot,
    Hierarchical,
}

impl From<StrategyArg> for Strategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::OneShot => Strategy::OneShot,
            StrategyArg::Hierarchical => Strategy::Hierarchical,
        }
    }
}

/// Background material for the meta-property prompts.
#[derive(Args)]
struct BackgroundArgs {
    /// One background file (.txt or .pdf) used for every property.
    #[arg(long)]
    default_background: Option<PathBuf>,

    /// Do not load the built-in per-property background table.
    #[arg(long)]
    no_default_backgrounds: bool,

    #[arg(long)]
    background_rigidity: Option<PathBuf>,

    #[arg(long)]
    background_identity: Option<PathBuf>,

    #[arg(long)]
    background_own_identity: Option<PathBuf>,

    #[arg(long)]
    background_unity: Option<PathBuf>,

    #[arg(long)]
    background_dependence: Option<PathBuf>,
}

impl BackgroundArgs {
    fn overrides(&self) -> BackgroundTable {
        let mut table = BackgroundTable::empty();
        let given = [
            (Property::Rigidity, &self.background_rigidity),
            (Property::Identity, &self.background_identity),
            (Property::OwnIdentity, &self.background_own_identity),
            (Property::Unity, &self.background_unity),
            (Property::Dependence, &self.background_dependence),
        ];
        for (property, path) in given {
            if let Some(path) = path {
                table.set(property, path);
            }
        }
        table
    }

    fn prompt_builder(&self, config: &CleanConfig) -> Result<PromptBuilder> {
        let mut bg = config.backgrounds.clone();
        if let Some(path) = &self.default_background {
            bg.default_file = Some(path.clone());
        }
        if self.no_default_backgrounds {
            bg.use_defaults = false;
        }
        let backgrounds = Backgrounds::load(&bg, &self.overrides())?;
        Ok(PromptBuilder::new(backgrounds, bg.max_chars))
    }
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
    .ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let paths = CleanPaths::resolve().ok();
    let config = load_config(&cli, paths.as_ref())?;

    match cli.command {
        Commands::Analyze {
            term,
            description,
            usage,
            mode,
            verbose,
            output,
            backgrounds,
        } => {
            let model = cli.model.as_deref().unwrap_or(DEFAULT_ANALYSIS_MODEL);
            let executor = RequestExecutor::from_config(model, &config)?;
            let prompts = backgrounds.prompt_builder(&config)?;
            let analyzer = MetaPropertyAnalyzer::new(&executor, &prompts, mode.into());

            let mut request = TermRequest::new(term);
            request.description = description;
            request.usage = usage;
            let result = analyzer.analyze(&request)?;

            if let Some(path) = &output {
                let json = analysis_json(&request, analyzer.model_id(), &result)?;
                write_file(path, &json)?;
                eprintln!("Wrote analysis to {}", path.display());
            }
            if verbose {
                println!("{}", analysis_json(&request, analyzer.model_id(), &result)?);
            } else if output.is_none() {
                println!(
                    "{}: {}  {}",
                    request.term,
                    result.properties.vector(),
                    result.classification
                );
            }
            for issue in result.inconsistencies() {
                eprintln!("warning: {issue}");
            }
        }

        Commands::AnalyzeBatch {
            terms,
            store,
            limit,
            mode,
            backgrounds,
        } => {
            let model = cli.model.as_deref().unwrap_or(DEFAULT_ANALYSIS_MODEL);
            let executor = RequestExecutor::from_config(model, &config)?;
            let prompts = backgrounds.prompt_builder(&config)?;
            let analyzer = MetaPropertyAnalyzer::new(&executor, &prompts, mode.into());

            let terms = limited(load_terms(&terms)?, limit);
            let store_path = store_path(store, paths.as_ref(), Strategy::MetaProperties)?;
            let mut store = ResultStore::open(&store_path)?;

            let summary = run_meta_properties(&analyzer, &terms, &mut store)?;
            print_run_summary(&summary, &store_path);
        }

        Commands::Classify {
            terms,
            ontologies,
            store,
            strategies,
            limit,
        } => {
            let model = cli.model.as_deref().unwrap_or(DEFAULT_CLASSIFICATION_MODEL);
            let executor = RequestExecutor::from_config(model, &config)?;
            let prompts = PromptBuilder::without_backgrounds();
            let classifier = Classifier::new(&executor, &prompts);

            let terms = limited(load_terms(&terms)?, limit);
            let ontologies = load_ontologies(&ontologies)?;
            let strategies: Vec<Strategy> = if strategies.is_empty() {
                vec![Strategy::OneShot, Strategy::Hierarchical]
            } else {
                strategies.into_iter().map(Strategy::from).collect()
            };
            let store_path = store_path(store, paths.as_ref(), Strategy::OneShot)?;
            let mut store = ResultStore::open(&store_path)?;

            let summary =
                run_classification(&classifier, &terms, &ontologies, &strategies, &mut store)?;
            print_run_summary(&summary, &store_path);
        }

        Commands::Export {
            store,
            meta,
            output,
        } => {
            let store = open_existing_store(store, paths.as_ref(), meta)?;
            let out: Box<dyn std::io::Write> = match &output {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent).into_diagnostic()?;
                    }
                    let file = std::fs::File::create(path).into_diagnostic()?;
                    Box::new(std::io::BufWriter::new(file))
                }
                None => Box::new(std::io::stdout().lock()),
            };

            let count = if meta || export::is_meta_store(&store) {
                let rows = export::meta_rows(&store);
                export::write_meta_tsv(&rows, out).into_diagnostic()?;
                rows.len()
            } else {
                let rows = export::rows(&store);
                export::write_tsv(&rows, out).into_diagnostic()?;
                rows.len()
            };
            if let Some(path) = &output {
                eprintln!("Exported {count} rows to {}", path.display());
            }
        }

        Commands::Evaluate {
            truth,
            predictions,
            store,
        } => {
            let truth = load_property_table(&truth)?;
            let predictions = match predictions {
                Some(path) => load_property_table(&path)?,
                None => predictions_from_store(&open_existing_store(store, paths.as_ref(), true)?),
            };
            let evaluation = evaluate(&predictions, &truth);
            print!("{evaluation}");
        }

        Commands::Summary { store, meta } => {
            let store = open_existing_store(store, paths.as_ref(), meta)?;
            let summary = store.summary();
            println!("Store: {}", store.path().display());
            println!("  results:   {}", store.len());
            println!("  succeeded: {}", summary.succeeded);
            println!("  failed:    {}", summary.failed);
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Config file plus CLI overrides.
fn load_config(cli: &Cli, paths: Option<&CleanPaths>) -> Result<CleanConfig> {
    let fallback = paths.map(CleanPaths::config_file);
    let mut config = CleanConfig::discover(cli.config.as_deref(), fallback.as_deref())?;
    if cli.allow_unlisted_model {
        config.models.allow_unlisted = true;
    }
    if let Some(n) = cli.max_attempts {
        config.retry.max_attempts = n;
    }
    if let Some(ms) = cli.base_delay_ms {
        config.retry.base_delay_ms = ms;
    }
    Ok(config)
}

/// Counts, then every failed key, then where the results went.
fn print_run_summary(summary: &RunSummary, store_path: &Path) {
    println!("{summary}");
    for key in &summary.failed_keys {
        println!("  failed: {key}");
    }
    println!("Results saved to {}", store_path.display());
}

fn limited(mut terms: Vec<TermRequest>, limit: usize) -> Vec<TermRequest> {
    if limit > 0 {
        terms.truncate(limit);
    }
    terms
}

fn store_path(
    explicit: Option<PathBuf>,
    paths: Option<&CleanPaths>,
    strategy: Strategy,
) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => {
            let paths = match paths {
                Some(p) => p.clone(),
                None => CleanPaths::resolve()?,
            };
            Ok(paths.default_store(strategy))
        }
    }
}

fn open_existing_store(
    explicit: Option<PathBuf>,
    paths: Option<&CleanPaths>,
    meta: bool,
) -> Result<ResultStore> {
    let strategy = if meta {
        Strategy::MetaProperties
    } else {
        Strategy::OneShot
    };
    let path = store_path(explicit, paths, strategy)?;
    if !path.exists() {
        miette::bail!("no result store at {}", path.display());
    }
    Ok(ResultStore::open(&path)?)
}

fn analysis_json(request: &TermRequest, model: &str, result: &MetaPropertyResult) -> Result<String> {
    let inconsistencies: Vec<String> = result
        .inconsistencies()
        .iter()
        .map(ToString::to_string)
        .collect();
    let value = serde_json::json!({
        "term": request.term,
        "description": request.description,
        "usage": request.usage,
        "model": model,
        "properties": result.properties,
        "classification": result.classification,
        "reasoning": result.reasoning,
        "summary": result.summary,
        "inconsistencies": inconsistencies,
    });
    serde_json::to_string_pretty(&value).into_diagnostic()
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }
    std::fs::write(path, content).into_diagnostic()
}
