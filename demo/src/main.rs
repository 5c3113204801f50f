//! JIT Access Engine — Demo CLI
//!
//! Runs one or all of the §8 reference scenarios (S1–S7) against
//! `jit-ref`'s in-memory mock outbound clients.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- s1
//!   cargo run -p demo -- s2
//!   ...

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jit_contracts::error::JitResult;
use jit_ref::scenarios;

// ── CLI definition ──────────────────────────────────────────────────────────

/// JIT access engine reference runtime demo.
///
/// Each subcommand runs one or all of the seven scenarios from the
/// specification's scenario table, demonstrating eligibility discovery,
/// self- and peer-approved activation, token verification, and the
/// provisioner's purge/replace semantics.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "JIT access engine reference runtime demo",
    long_about = "Runs the JIT access engine's reference scenarios against in-memory\n\
                  mock outbound clients.\n\n\
                  Scenarios:\n\
                  S1 — Self-approved JIT activation\n\
                  S2 — Peer-approved activation\n\
                  S3 — Self-approval denied\n\
                  S4 — Concurrent approval, both succeed\n\
                  S5 — Expired token rejected\n\
                  S6 — Extra-clause condition not recognized\n\
                  S7 — Justification pattern rejected"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all seven scenarios in sequence.
    RunAll,
    /// S1: self-approved JIT activation provisions one binding.
    S1,
    /// S2: peer-approved activation by one of two eligible reviewers.
    S2,
    /// S3: the beneficiary cannot approve their own MPA request.
    S3,
    /// S4: two reviewers approve the same token concurrently.
    S4,
    /// S5: verifying an expired token fails with TokenInvalid.
    S5,
    /// S6: a marker expression with an extra clause is not recognized.
    S6,
    /// S7: a justification failing the configured pattern is rejected.
    S7,
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::S1 => run_one("S1", scenarios::s1_self_approved_activation),
        Command::S2 => run_one("S2", scenarios::s2_peer_approved_activation),
        Command::S3 => run_one("S3", scenarios::s3_self_approval_denied),
        Command::S4 => run_one("S4", scenarios::s4_concurrent_approval_both_succeed),
        Command::S5 => run_one("S5", scenarios::s5_expired_token_rejected),
        Command::S6 => run_one("S6", scenarios::s6_extra_clause_condition_not_recognized),
        Command::S7 => run_one("S7", scenarios::s7_justification_pattern_rejected),
    };

    match result {
        Ok(()) => println!("All selected scenarios completed successfully."),
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_one(label: &str, scenario: fn() -> JitResult<String>) -> JitResult<()> {
    let summary = scenario()?;
    println!("[{label}] {summary}");
    Ok(())
}

fn run_all() -> JitResult<()> {
    run_one("S1", scenarios::s1_self_approved_activation)?;
    run_one("S2", scenarios::s2_peer_approved_activation)?;
    run_one("S3", scenarios::s3_self_approval_denied)?;
    run_one("S4", scenarios::s4_concurrent_approval_both_succeed)?;
    run_one("S5", scenarios::s5_expired_token_rejected)?;
    run_one("S6", scenarios::s6_extra_clause_condition_not_recognized)?;
    run_one("S7", scenarios::s7_justification_pattern_rejected)?;
    Ok(())
}

// ── Banner ───────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("JIT Access Engine — Reference Demo");
    println!("===================================");
    println!();
    println!("Activation state machine per request:");
    println!("  NEW --createJit/createMpa--> VALIDATED --activate/sign+verify+approve--> PROVISIONED");
    println!("  Eligibility is re-checked at activation time, never trusted from discovery.");
    println!();
}
