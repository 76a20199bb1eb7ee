//! `anima-cli` – Anima Command Line Interface
//!
//! This binary is a small host for the memory engine.  It:
//!
//! 1. Checks for `~/.anima/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Builds a [`MemoryEngine`](anima_memory::MemoryEngine) from that config
//!    on a simulated clock.
//! 3. Drops the user into an **interactive REPL** with slash-commands for
//!    forming and recalling memories, learning concepts, advancing time and
//!    saving snapshots (`/help` lists them).
//! 4. Intercepts **Ctrl-C** to stop the REPL cleanly.

mod command;
mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "warn" so the
    // REPL output stays readable).  Set ANIMA_LOG_FORMAT=json to emit
    // newline-delimited JSON logs instead.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("ANIMA_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::AnimaConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Memory engine ─────────────────────────────────────────────────────
    let session = match repl::Session::new(cfg.clone()) {
        Ok(session) => session,
        Err(e) => {
            println!("{}: {}", "Failed to start memory engine".red(), e);
            std::process::exit(1);
        }
    };
    info!(
        max_memories = cfg.episodic.max_memories,
        max_concepts = cfg.semantic.max_concepts,
        seeded = cfg.rng_seed.is_some(),
        "memory engine ready"
    );
    println!("  Snapshots: {}", cfg.snapshot_path.dimmed());

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(session, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::AnimaConfig {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Anima First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Anima.\n");

    let mut cfg = config::AnimaConfig::default();
    config::apply_env_overrides(&mut cfg);

    let path = prompt_line(
        &format!("  Snapshot database [{}]: ", cfg.snapshot_path),
        &cfg.snapshot_path,
    );
    cfg.snapshot_path = path;

    let every = prompt_line(
        &format!("  Run maintenance every N ticks [{}]: ", cfg.maintenance_every),
        &cfg.maintenance_every.to_string(),
    );
    match every.trim().parse::<u64>() {
        Ok(n) if n > 0 => cfg.maintenance_every = n,
        _ => println!("  {} keeping {}", "Not a positive number;".yellow(), cfg.maintenance_every),
    }

    let seed = prompt_line("  Random seed for reproducible recall (blank for none): ", "");
    if let Ok(seed) = seed.trim().parse::<u64>() {
        cfg.rng_seed = Some(seed);
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ___          _              "#.bold().cyan());
    println!("{}", r#"   /   |  ____  (_)___ ___  ____ _"#.bold().cyan());
    println!("{}", r#"  / /| | / __ \/ / __ `__ \/ __ `/"#.bold().cyan());
    println!("{}", r#" / ___ |/ / / / / / / / / / /_/ / "#.bold().cyan());
    println!("{}", r#"/_/  |_/_/ /_/_/_/ /_/ /_/\__,_/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Anima".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Associative Memory Engine");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
