//! ATP - Automated equational theorem prover
//!
//! Command-line interface: normalise statements, prove batches against a
//! theorem database, train the heuristic model and initialise contexts.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use atp::hmm::observations;
use atp::{
    AtpConfig, AtpError, KnowledgeKernel, LogLevel, ModelContext, Process, ProcessManager, ProcessReport,
    ProcessSequence, ProofProcess, SearchSettings, Selection, SharedModel, Statement, TheoremStore,
    TrainHmmProcess, UnprovenSelectorProcess,
};

#[derive(Parser)]
#[command(name = "atp")]
#[command(version)]
#[command(about = "Automated equational theorem prover", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the usual search locations)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical form of a statement
    Normalize {
        /// Context name or path to a context JSON file
        context: String,
        statement: String,
    },

    /// Prove statements and record the results
    Prove {
        /// Theorem database
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        context: String,
        /// Search profile name
        profile: String,
        /// Statements to prove
        statements: Vec<String>,
        /// Prove the context's pending tasks instead
        #[arg(long)]
        tasks: bool,
    },

    /// Prove stored theorems that have no proof yet, least attempted first
    ProveUnproven {
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        context: String,
        /// How many theorems to attempt
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Search profile name (defaults to `general.profile`)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Refit the heuristic model on stored proofs
    Train {
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        context: String,
    },

    /// Create the database schema and store a context's axioms
    Init {
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        context: String,
    },

    /// List the available search profiles
    Profiles,

    /// Print a commented default configuration file
    DefaultConfig,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<AtpError>().map_or(-1, AtpError::exit_code)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = AtpConfig::load_from_file(path).map_err(AtpError::from)?;
            config.apply_env_overrides();
            config
        }
        None => AtpConfig::load().map_err(AtpError::from)?,
    };
    init_logging(&cli, config.general.log_level);

    match cli.command {
        Command::Normalize { context, statement } => {
            let ctx = load_context(&config, &context)?;
            println!("{}", ctx.normalize(&statement)?);
            Ok(0)
        }
        Command::Prove { db, context, profile, statements, tasks } => {
            prove(&config, db, &context, &profile, &statements, tasks)
        }
        Command::ProveUnproven { db, context, count, profile } => {
            prove_unproven(&config, db, &context, count, profile.as_deref())
        }
        Command::Train { db, context } => train(&config, db, &context),
        Command::Init { db, context } => {
            let ctx = load_context(&config, &context)?;
            let store = open_store(&config, db)?;
            let ctx_id = store.ensure_context(ctx.name())?;
            let axioms = store.ensure_axioms(ctx_id, &ctx)?;
            println!("Context \"{}\" ready with {} axiom(s).", ctx.name(), axioms.len());
            Ok(0)
        }
        Command::Profiles => {
            for (name, description) in config.available_profiles() {
                println!("{:<12} {}", name, description);
            }
            Ok(0)
        }
        Command::DefaultConfig => {
            print!("{}", AtpConfig::default_config_content());
            Ok(0)
        }
    }
}

/// `RUST_LOG` wins over the configured level; `-v`/`-q` adjust the latter
fn init_logging(cli: &Cli, configured: LogLevel) {
    let level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_context(config: &AtpConfig, name: &str) -> Result<Arc<ModelContext>> {
    let path = config.context_path(name);
    debug!(path = %path.display(), "loading context");
    Ok(Arc::new(ModelContext::load(&path)?))
}

fn open_store(config: &AtpConfig, db: Option<PathBuf>) -> Result<Arc<TheoremStore>> {
    let path = db.unwrap_or_else(|| config.database.path.clone());
    let store = TheoremStore::open(&path)
        .with_context(|| format!("opening theorem database {}", path.display()))?
        .with_retries(config.database.retries);
    Ok(Arc::new(store))
}

fn shared_model(config: &AtpConfig, store: &TheoremStore, ctx: &ModelContext) -> Result<Arc<SharedModel>> {
    let ctx_id = store.ensure_context(ctx.name())?;
    let model = match store.load_hmm(ctx_id)? {
        Some(model) => model,
        None => config.hmm.initial_model(observations::alphabet_size(ctx)),
    };
    Ok(Arc::new(SharedModel::new(model)))
}

fn prove(
    config: &AtpConfig,
    db: Option<PathBuf>,
    context: &str,
    profile: &str,
    statements: &[String],
    tasks: bool,
) -> Result<i32> {
    let ctx = load_context(config, context)?;
    let settings = config.profile(profile).map_err(AtpError::from)?;
    let store = open_store(config, db)?;

    let targets: Vec<Statement> = if tasks {
        let ctx_id = store.ensure_context(ctx.name())?;
        store
            .pending_tasks(ctx_id)?
            .iter()
            .map(|task| ctx.parse_statement(&task.theorem.statement))
            .collect::<Result<_, _>>()?
    } else {
        statements
            .iter()
            .map(|s| ctx.parse_statement(s))
            .collect::<Result<_, _>>()?
    };
    if targets.is_empty() {
        println!("Nothing to prove.");
        return Ok(0);
    }
    info!(targets = targets.len(), profile = %settings.name, "starting proof process");

    let process = proof_process(config, store, &ctx, settings, targets)?;
    let mut manager = ProcessManager::new();
    manager.add(Box::new(process));
    Ok(print_reports(&manager.run()))
}

fn proof_process(
    config: &AtpConfig,
    store: Arc<TheoremStore>,
    ctx: &Arc<ModelContext>,
    settings: SearchSettings,
    targets: Vec<Statement>,
) -> Result<ProofProcess> {
    let kernel = KnowledgeKernel::with_settings(ctx.clone(), config.matching.clone()).into_shared();
    let model = shared_model(config, &store, ctx)?;
    Ok(ProofProcess::new(store, kernel, settings, targets)
        .with_model(model)
        .with_hmm_settings(config.hmm.clone()))
}

fn prove_unproven(
    config: &AtpConfig,
    db: Option<PathBuf>,
    context: &str,
    count: usize,
    profile: Option<&str>,
) -> Result<i32> {
    let ctx = load_context(config, context)?;
    let settings = match profile {
        Some(name) => config.profile(name),
        None => config.default_profile(),
    }
    .map_err(AtpError::from)?;
    let store = open_store(config, db)?;
    info!(count, profile = %settings.name, "selecting unproven theorems");

    let selection = Selection::new();
    let selector = UnprovenSelectorProcess::new(store.clone(), ctx.clone(), count, selection.clone());
    let prover = proof_process(config, store, &ctx, settings, Vec::new())?;
    let sequence = ProcessSequence::new(format!("prove-unproven[{}]", ctx.name()), Box::new(selector))
        .then(move || Ok(Box::new(prover.with_targets(selection.take()?)) as Box<dyn Process>));

    let mut manager = ProcessManager::new();
    manager.add(Box::new(sequence));
    Ok(print_reports(&manager.run()))
}

fn train(config: &AtpConfig, db: Option<PathBuf>, context: &str) -> Result<i32> {
    let ctx = load_context(config, context)?;
    let store = open_store(config, db)?;
    let model = shared_model(config, &store, &ctx)?;
    let process = TrainHmmProcess::new(store, ctx, model, config.hmm.clone());

    let mut manager = ProcessManager::new();
    manager.add(Box::new(process));
    Ok(print_reports(&manager.run()))
}

fn print_reports(reports: &[ProcessReport]) -> i32 {
    let mut code = 0;
    for report in reports {
        for line in &report.lines {
            println!("{}", line);
        }
        if let Some(e) = &report.error {
            eprintln!("{} failed: {}", report.name, e);
            code = e.exit_code();
        }
    }
    code
}
