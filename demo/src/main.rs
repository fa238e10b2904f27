//! Quorum Approval-Policy Editor: Demo CLI
//!
//! Runs one or all of the accounts-payable scenarios against the in-memory
//! policy service, or inspects a live entity's policy forest over HTTP.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- tiered-approval
//!   cargo run -p demo -- prune-leaf
//!   cargo run -p demo -- quorum-rejection
//!   cargo run -p demo -- partial-failure
//!   cargo run -p demo -- inspect --entity ent-42 --config quorum.toml

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quorum_client::HttpPolicyApi;
use quorum_contracts::error::QuorumResult;
use quorum_core::{config::EditorConfig, traits::Validator, PolicyEditor, Submitter};
use quorum_ref_payables::{
    mock_data::render_forest,
    scenarios::{partial_failure, prune_leaf, quorum_rejection, tiered_approval},
};
use quorum_verify::QuorumValidator;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Quorum: hierarchical approval-policy editor demo.
///
/// Each scenario subcommand edits a mock accounts-payable entity and submits
/// the result, showing id resolution, deletes, validation and partial failure.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Quorum approval-policy editor demo",
    long_about = "Runs quorum editor scenarios showing parent-before-child id resolution,\n\
                  leaf deletion, pre-submit quorum validation, and partial-failure retries."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four payables scenarios in sequence.
    RunAll,
    /// Scenario 1: Tiered Approval Chain (new chain, slow parent).
    TieredApproval,
    /// Scenario 2: Prune a Leaf Stage (one DELETE, idempotent re-submit).
    PruneLeaf,
    /// Scenario 3: Unsatisfiable Quorum (validation blocks every write).
    QuorumRejection,
    /// Scenario 4: Partial Failure and Retry.
    PartialFailure,
    /// Load an entity's policies from the live service and check them.
    Inspect {
        /// Entity whose policies to load.
        #[arg(long)]
        entity: String,
        /// Editor config TOML; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides `api.base_url` from the config.
        #[arg(long)]
        base_url: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::TieredApproval => tiered_approval::run_scenario().await,
        Command::PruneLeaf => prune_leaf::run_scenario().await,
        Command::QuorumRejection => quorum_rejection::run_scenario().await,
        Command::PartialFailure => partial_failure::run_scenario().await,
        Command::Inspect {
            entity,
            config,
            base_url,
        } => inspect(&entity, config, base_url).await,
    };

    match result {
        Ok(()) => {
            println!("Done.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

async fn run_all() -> QuorumResult<()> {
    tiered_approval::run_scenario().await?;
    prune_leaf::run_scenario().await?;
    quorum_rejection::run_scenario().await?;
    partial_failure::run_scenario().await?;
    Ok(())
}

// ── Live inspection ───────────────────────────────────────────────────────────

async fn inspect(entity: &str, config: Option<PathBuf>, base_url: Option<String>) -> QuorumResult<()> {
    let mut config = match config {
        Some(path) => EditorConfig::from_file(&path)?,
        None => EditorConfig::default(),
    };
    if let Some(base_url) = base_url {
        config.api.base_url = base_url;
    }

    info!(entity_id = %entity, base_url = %config.api.base_url, "inspecting policies");

    let api = HttpPolicyApi::from_config(&config.api)?;
    let validator = QuorumValidator::new();
    let submitter = Submitter::new(Arc::new(api), Arc::new(validator.clone()), entity, config);
    let editor = PolicyEditor::open(submitter).await?;

    println!("=== Policies for {} ===", entity);
    println!();
    if editor.form().is_empty() {
        println!("  (no approval policies)");
    }
    for line in render_forest(editor.form()).lines() {
        println!("  {}", line);
    }
    println!();

    let report = validator.validate(editor.form());
    if report.passed() {
        println!("  Validation: PASS ({} policies)", editor.form().len());
    } else {
        println!("  Validation: FAIL");
        for failure in &report.failures {
            println!("    - {}", failure);
        }
    }
    println!();

    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Quorum: Approval-Policy Editor");
    println!("Accounts-Payable Reference Demo");
    println!("===============================");
    println!();
    println!("Submission pipeline:");
    println!("  [1] Validation gate checks every rule; any failure blocks all writes");
    println!("  [2] Policies removed from the form are deleted, all at once");
    println!("  [3] Creates and updates run concurrently; each waits for its parent's server id");
    println!("  [4] Per-policy failures are reported; nothing already saved is rolled back");
    println!("  [5] After a clean run the forest is reloaded from the service");
    println!();
}
