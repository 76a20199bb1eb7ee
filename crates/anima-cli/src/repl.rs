//! REPL – Read-Eval-Print Loop for the Anima interactive shell.
//!
//! The shell owns one [`MemoryEngine`] running on a simulated clock: time only
//! moves on `/tick`, which also offers maintenance to the engine every
//! `maintenance_every` ticks.  Type `/help` for the command list.

use chrono::{DateTime, Duration, Utc};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use anima_memory::archive::{SnapshotArchive, SnapshotKind};
use anima_memory::engine::{EngineMaintenance, MemoryEngine};
use anima_memory::episodic::{EpisodeRequest, EpisodicRecord, RandomRecallOptions};
use anima_memory::graph::{KnowledgeGraph, knowledge_graph_schema};
use anima_memory::semantic::{ConceptRelation, LearnRequest, Provenance, SemanticConcept};
use anima_types::{Clock, ManualClock, MemoryEvent, SearchResult};

use crate::command::{self, Command, RecallTarget, SearchQuery};
use crate::config::AnimaConfig;

/// Snapshots kept per store after each `/save`.
const SNAPSHOT_HISTORY: usize = 20;
const SEARCH_LIMIT: usize = 10;
/// Longest simulated step a single tick may take (one year).
const MAX_TICK_SECONDS: u64 = 365 * 86_400;

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One interactive session: the engine, its clock and the tick counter.
pub struct Session {
    engine: MemoryEngine,
    clock: ManualClock,
    cfg: AnimaConfig,
    tick: u64,
}

impl Session {
    /// A fresh session at tick 0 on a simulated clock.
    pub fn new(cfg: AnimaConfig) -> Result<Self, String> {
        let clock = ManualClock::default();
        let engine = build_engine(&cfg, &clock)?;
        Ok(Self {
            engine,
            clock,
            cfg,
            tick: 0,
        })
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Run one parsed command.  Errors are user-facing messages; the session
    /// stays usable after any of them.
    pub fn execute(&mut self, command: Command) -> Result<Flow, String> {
        match command {
            Command::Help => cmd_help(),
            Command::Quit => return Ok(Flow::Quit),
            Command::Form {
                intensity,
                emotions,
                concepts,
                text,
            } => self.cmd_form(intensity, emotions, concepts, text),
            Command::Recall(target) => self.cmd_recall(target)?,
            Command::Search(query) => self.cmd_search(query),
            Command::Related(id) => {
                let related = self.engine.episodic.get_related(&id);
                if related.is_empty() {
                    println!("  {}", "No associated memories.".dimmed());
                }
                for record in related {
                    print_record(record);
                }
            }
            Command::Recent(limit) => {
                for record in self.engine.episodic.get_recent(limit) {
                    print_record(record);
                }
            }
            Command::Learn {
                source,
                label,
                definition,
            } => {
                let concept = self.engine.semantic.learn_with(
                    LearnRequest::new(label, definition, source).with_provenance(Provenance::Speaker {
                        name: "operator".to_string(),
                    }),
                );
                println!("{} {}", "✓ Learned".green(), concept.concept.bold());
                print_concept(&concept);
            }
            Command::Deepen { label, text } => {
                let id = self.concept_id(&label)?;
                let concept = self.engine.semantic.deepen(&id, &text, &[]).map_err(|e| e.to_string())?;
                println!("{} {}", "✓ Deepened".green(), concept.concept.bold());
                print_concept(&concept);
            }
            Command::Relate {
                label,
                kind,
                target,
                strength,
            } => {
                let id = self.concept_id(&label)?;
                let relation = ConceptRelation::new(target, kind, strength);
                let concept = self
                    .engine
                    .semantic
                    .deepen(&id, "", &[relation])
                    .map_err(|e| e.to_string())?;
                print_concept(&concept);
            }
            Command::Use(label) => {
                let id = self.concept_id(&label)?;
                if let Some(concept) = self.engine.semantic.use_concept(&id) {
                    print_concept(&concept);
                }
            }
            Command::Forget(label) => {
                let id = self.concept_id(&label)?;
                if let Some(concept) = self.engine.semantic.forget(&id) {
                    println!("{} {}", "✓ Forgot".green(), concept.concept.bold());
                }
            }
            Command::Find(query) => {
                let hits = self.engine.semantic.search(&query, SEARCH_LIMIT);
                print_concept_hits(&hits);
            }
            Command::Concept(label) => {
                let concept = self
                    .engine
                    .semantic
                    .get_by_name(&label)
                    .cloned()
                    .ok_or_else(|| format!("No concept named '{}'", label))?;
                print_concept(&concept);
                print_concept_hits(&self.engine.semantic.get_related_concepts(&label));
            }
            Command::Graph { json } => {
                let graph = self.engine.semantic.generate_knowledge_graph();
                if json {
                    println!("{}", to_pretty_json(&graph)?);
                } else {
                    print_graph(&graph);
                }
            }
            Command::Subgraph { center, depth } => {
                let graph = self
                    .engine
                    .semantic
                    .get_subgraph(&center, depth)
                    .ok_or_else(|| format!("No concept named '{}'", center))?;
                print_graph(&graph);
            }
            Command::Timeline => {
                for entry in self.engine.semantic.get_knowledge_timeline() {
                    println!("  {}  {}", entry.date.to_string().bold(), entry.concepts.join(", "));
                }
            }
            Command::Compress => {
                let record = self.engine.semantic.compress_knowledge();
                println!(
                    "{} {} → {} concepts ({} merge group(s), {} pruned)",
                    "✓ Compressed".green(),
                    record.before,
                    record.after,
                    record.merged.len(),
                    record.pruned.len()
                );
                for group in &record.merged {
                    println!("    {} ← {}", group.into.bold(), group.merged.join(", "));
                }
            }
            Command::Tick(n) => self.advance(n),
            Command::Stats => self.cmd_stats(),
            Command::Events(limit) => {
                let mut events = self.engine.episodic.recent_events(limit);
                events.extend(self.engine.semantic.recent_events(limit));
                events.sort_by(|a, b| b.at.cmp(&a.at));
                events.truncate(limit);
                for event in &events {
                    print_event(event);
                }
            }
            Command::Save => self.cmd_save()?,
            Command::Load => self.cmd_load()?,
            Command::Schema => println!("{}", to_pretty_json(&knowledge_graph_schema())?),
        }
        Ok(Flow::Continue)
    }

    // ── episodic ──────────────────────────────────────────────────────────────

    fn cmd_form(&mut self, intensity: f32, emotions: Vec<String>, concepts: Vec<String>, text: String) {
        let summary = summarize(&text);
        let record = self.engine.episodic.form_with(
            EpisodeRequest::new(text, summary)
                .with_emotions(emotions)
                .with_intensity(intensity)
                .with_concepts(concepts),
        );
        println!("{} {}", "✓ Formed".green(), record.id.to_string().dimmed());
        print_record(&record);
    }

    fn cmd_recall(&mut self, target: RecallTarget) -> Result<(), String> {
        let record = match target {
            RecallTarget::Id(id) => self.engine.episodic.recall(&id),
            RecallTarget::Random { emotion } => self.engine.episodic.recall_random(&RandomRecallOptions {
                preferred_emotion: emotion,
                ..Default::default()
            }),
        };
        let record = record.ok_or_else(|| "Nothing to recall.".to_string())?;
        print_record(&record);
        let related = self.engine.episodic.get_related(&record.id);
        if !related.is_empty() {
            println!("    {} {}", "associated:".dimmed(), related.len());
        }
        Ok(())
    }

    fn cmd_search(&self, query: SearchQuery) {
        let hits = match query {
            SearchQuery::Emotion(tag) => self.engine.episodic.search_by_emotion(&tag, SEARCH_LIMIT),
            SearchQuery::Concept(label) => self.engine.episodic.search_by_concept(&label, SEARCH_LIMIT),
            SearchQuery::Text(text) => self.engine.episodic.search(&text, SEARCH_LIMIT),
        };
        if hits.is_empty() {
            println!("  {}", "No matching memories.".dimmed());
        }
        for hit in &hits {
            print!("  {:>5.2} ", hit.relevance_score);
            print_record(&hit.item);
        }
    }

    // ── time ──────────────────────────────────────────────────────────────────

    fn advance(&mut self, ticks: u64) {
        let step = Duration::seconds(self.cfg.tick_seconds.min(MAX_TICK_SECONDS) as i64);
        let every = self.cfg.maintenance_every.max(1);
        for _ in 0..ticks {
            self.tick += 1;
            self.clock.advance(step);
            if self.tick % every == 0 {
                let report = self.engine.perform_maintenance(self.tick);
                print_maintenance(self.tick, &report);
            }
        }
        println!("  tick {} · {}", self.tick.to_string().bold(), self.clock.now().format("%Y-%m-%d %H:%M"));
    }

    fn cmd_stats(&self) {
        let episodic = self.engine.episodic.stats();
        let semantic = self.engine.semantic.stats();

        println!("{}", "Episodic".bold().underline());
        println!("  records          : {}", episodic.total);
        println!("  avg retention    : {:.2}", episodic.average_retention);
        println!("  avg importance   : {:.2}", episodic.average_importance);
        println!("  total recalls    : {}", episodic.total_recalls);
        for (tag, count) in &episodic.emotion_distribution {
            println!("    {:<14} {}", tag, count);
        }
        println!("{}", "Semantic".bold().underline());
        println!("  concepts         : {} ({} seed)", semantic.total, semantic.seed_count);
        println!("  avg comprehension: {:.2}", semantic.average_comprehension);
        println!("  avg interest     : {:.2}", semantic.average_interest);
        println!("  relations        : {}", semantic.total_relations);
        for (source, count) in &semantic.by_source {
            println!("    {:<18} {}", source.as_str(), count);
        }
        let interesting: Vec<String> = self
            .engine
            .semantic
            .get_most_interesting(5)
            .into_iter()
            .map(|c| c.concept.clone())
            .collect();
        if !interesting.is_empty() {
            println!("  most interesting : {}", interesting.join(", "));
        }
        println!("  tick             : {}", self.tick);
    }

    // ── persistence ───────────────────────────────────────────────────────────

    fn cmd_save(&self) -> Result<(), String> {
        let archive = open_archive(&self.cfg.snapshot_path)?;
        self.engine.save(&archive, self.tick).map_err(|e| e.to_string())?;
        for kind in [SnapshotKind::Episodic, SnapshotKind::Semantic] {
            archive.prune(kind, SNAPSHOT_HISTORY).map_err(|e| e.to_string())?;
        }
        println!(
            "{} {}",
            "✓ Snapshot saved to".green(),
            self.cfg.snapshot_path.bold()
        );
        Ok(())
    }

    fn cmd_load(&mut self) -> Result<(), String> {
        let archive = open_archive(&self.cfg.snapshot_path)?;
        let mut latest = Vec::new();
        for kind in [SnapshotKind::Episodic, SnapshotKind::Semantic] {
            let infos = archive.list(kind).map_err(|e| e.to_string())?;
            latest.extend(infos.last().cloned());
        }
        let tick = latest.iter().map(|info| info.tick).max().unwrap_or_default();
        let mut taken_at = None;
        for info in &latest {
            let at = DateTime::parse_from_rfc3339(&info.taken_at)
                .map_err(|e| format!("snapshot {} has a bad timestamp: {}", info.id, e))?
                .with_timezone(&Utc);
            taken_at = taken_at.max(Some(at));
        }

        let engine = MemoryEngine::load(&archive, Arc::new(self.clock.clone())).map_err(|e| e.to_string())?;
        self.engine = match self.cfg.rng_seed {
            Some(seed) => engine.with_rng_seed(seed),
            None => engine,
        };
        // Resume simulated time where the snapshot left it.
        if let Some(at) = taken_at {
            self.clock.set(at);
        }
        self.tick = tick;
        println!(
            "{} tick {} ({} memories, {} concepts)",
            "✓ Snapshot loaded at".green(),
            tick,
            self.engine.episodic.len(),
            self.engine.semantic.len()
        );
        Ok(())
    }

    fn concept_id(&self, label: &str) -> Result<uuid::Uuid, String> {
        self.engine
            .semantic
            .get_by_name(label)
            .map(|c| c.id)
            .ok_or_else(|| format!("No concept named '{}'", label))
    }
}

fn build_engine(cfg: &AnimaConfig, clock: &ManualClock) -> Result<MemoryEngine, String> {
    let engine = MemoryEngine::with_clock(cfg.engine_config(), Arc::new(clock.clone())).map_err(|e| e.to_string())?;
    Ok(match cfg.rng_seed {
        Some(seed) => engine.with_rng_seed(seed),
        None => engine,
    })
}

fn open_archive(path: &str) -> Result<SnapshotArchive, String> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create snapshot directory: {}", e))?;
        }
    }
    SnapshotArchive::open(path).map_err(|e| e.to_string())
}

/// First sentence of `text`, capped at 80 characters.
fn summarize(text: &str) -> String {
    let sentence = text
        .split_terminator(['.', '!', '?'])
        .next()
        .unwrap_or(text)
        .trim();
    let mut summary: String = sentence.chars().take(80).collect();
    if sentence.chars().count() > 80 {
        summary.push('…');
    }
    summary
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize: {}", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(mut session: Session, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => Some(editor),
        Err(e) => {
            warn!(error = %e, "line editor unavailable; falling back to plain stdin");
            None
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let Some(line) = read_line(editor.as_mut()) else {
            break;
        };
        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        if let Some(editor) = editor.as_mut() {
            let _ = editor.add_history_entry(cmd);
        }

        let result = command::parse(cmd).and_then(|parsed| session.execute(parsed));
        match result {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => println!("{} {}. Type {} for available commands.", "✗".red(), e, "/help".bold()),
        }
    }
    info!(tick = session.tick(), "session ended");
}

/// `None` on end of input.
fn read_line(editor: Option<&mut DefaultEditor>) -> Option<String> {
    let prompt = format!("{} ", "anima>".bold().cyan());
    match editor {
        Some(editor) => match editor.readline(&prompt) {
            Ok(line) => Some(line),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                None
            }
        },
        None => {
            print!("{}", prompt);
            io::stdout().flush().ok();
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) => None,
                Ok(_) => Some(line),
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    None
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Episodic memory".bold().underline());
    println!("  {}  – form a memory; #word marks a concept", "/form <0..1> <emotions|-> <text>".bold().cyan());
    println!("  {}            – recall by id or at random", "/recall [id|emotion]".bold().cyan());
    println!("  {} – search memories", "/search [emotion:|concept:]<q>".bold().cyan());
    println!("  {}  – associated memories / newest memories", "/related <id>  /recent [n]".bold().cyan());
    println!("{}", "Semantic memory".bold().underline());
    println!("  {} – learn or deepen a concept", "/learn <source> <label> = <def>".bold().cyan());
    println!("  {}       – add to a definition", "/deepen <label> = <text>".bold().cyan());
    println!("  {} – link two concepts", "/relate <label> <kind> <target> [s]".bold().cyan());
    println!("  {} – use, forget or inspect", "/use  /forget  /concept <label>".bold().cyan());
    println!("  {}                  – search concepts", "/find <query>".bold().cyan());
    println!("  {} – graph views", "/graph [json]  /subgraph <label> [d]  /timeline".bold().cyan());
    println!("  {}                      – merge and prune weak concepts", "/compress".bold().cyan());
    println!("{}", "Engine".bold().underline());
    println!("  {}                     – advance simulated time", "/tick [n]".bold().cyan());
    println!("  {}      – statistics and recent events", "/stats  /events [n]".bold().cyan());
    println!("  {}   – snapshot archive / graph JSON schema", "/save  /load  /schema".bold().cyan());
    println!("  {}                  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn print_record(record: &EpisodicRecord) {
    let tags = if record.emotion_tags.is_empty() {
        "-".to_string()
    } else {
        record.emotion_tags.join(",")
    };
    println!(
        "{} [{}] retention {:.2} · importance {:.2} · recalls {}",
        record.summary.bold(),
        tags.yellow(),
        record.retention_strength,
        record.importance,
        record.recall_count
    );
}

fn print_concept(concept: &SemanticConcept) {
    println!(
        "  {} ({}) comprehension {:.2} · interest {:.2} · used {}",
        concept.concept.bold(),
        concept.source.as_str().dimmed(),
        concept.comprehension,
        concept.interest_level,
        concept.use_count
    );
    println!("    {}", concept.definition);
    for relation in &concept.relations {
        println!("    {} {} ({:.2})", relation.kind.as_str().cyan(), relation.concept, relation.strength);
    }
}

fn print_concept_hits(hits: &[SearchResult<SemanticConcept>]) {
    if hits.is_empty() {
        println!("  {}", "No matching concepts.".dimmed());
    }
    for hit in hits {
        println!(
            "  {:>5.2} {} – {}",
            hit.relevance_score,
            hit.item.concept.bold(),
            hit.item.definition
        );
    }
}

fn print_graph(graph: &KnowledgeGraph) {
    let stats = &graph.stats;
    println!(
        "{} {} nodes · {} edges · density {:.3} · {} isolated",
        "Graph".bold().underline(),
        stats.node_count,
        stats.edge_count,
        stats.density,
        stats.isolated_count
    );
    if let Some(hub) = &stats.hub {
        println!("  hub: {} ({} connections)", hub.bold(), stats.hub_degree);
    }
    for edge in &graph.edges {
        println!("  {} —{}→ {} ({:.2})", edge.source, edge.kind.as_str().cyan(), edge.target, edge.strength);
    }
    for cluster in &graph.clusters {
        println!("  cluster {}: {}", cluster.label.yellow(), cluster.members.join(", "));
    }
}

fn print_event(event: &MemoryEvent) {
    println!(
        "  {} {:<10} {}",
        event.at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        format!("{:?}", event.kind).to_lowercase().cyan(),
        event.label
    );
}

fn print_maintenance(tick: u64, report: &EngineMaintenance) {
    if !report.ran() {
        return;
    }
    let removed = |r: &Option<anima_memory::retention::MaintenanceReport>| r.as_ref().map_or(0, |r| r.removed.len());
    println!(
        "  {} tick {}: {} memories and {} concepts faded",
        "⟳ maintenance".dimmed(),
        tick,
        removed(&report.episodic),
        removed(&report.semantic)
    );
    let compressed = report.semantic.as_ref().and_then(|r| r.compression.as_ref());
    if let Some(record) = compressed {
        println!("    compressed knowledge: {} → {} concepts", record.before, record.after);
    }
}
