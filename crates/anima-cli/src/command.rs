//! Slash-command parsing for the REPL.
//!
//! Parsing is kept apart from execution so every command shape can be tested
//! without a terminal.

use anima_types::{ConceptSource, RelationKind};
use uuid::Uuid;

const DEFAULT_SUBGRAPH_DEPTH: usize = 2;
const DEFAULT_LIST_LIMIT: usize = 10;
const DEFAULT_RELATION_STRENGTH: f32 = 0.5;

/// What `/recall` should bring back.
#[derive(Debug, Clone, PartialEq)]
pub enum RecallTarget {
    Id(Uuid),
    /// Weighted random pick, optionally favouring one emotion.
    Random { emotion: Option<String> },
}

/// The criterion a `/search` runs on.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    Emotion(String),
    Concept(String),
    Text(String),
}

/// A parsed REPL command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Form {
        intensity: f32,
        emotions: Vec<String>,
        concepts: Vec<String>,
        text: String,
    },
    Recall(RecallTarget),
    Search(SearchQuery),
    Related(Uuid),
    Recent(usize),
    Learn {
        source: ConceptSource,
        label: String,
        definition: String,
    },
    Deepen {
        label: String,
        text: String,
    },
    Relate {
        label: String,
        kind: RelationKind,
        target: String,
        strength: f32,
    },
    Use(String),
    Forget(String),
    Find(String),
    Concept(String),
    Graph {
        json: bool,
    },
    Subgraph {
        center: String,
        depth: usize,
    },
    Timeline,
    Compress,
    Tick(u64),
    Stats,
    Events(usize),
    Save,
    Load,
    Schema,
}

/// Parse one REPL line.  The error is a user-facing message.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    match name {
        "/help" | "/?" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/form" => parse_form(rest),
        "/recall" => parse_recall(rest),
        "/search" => parse_search(rest),
        "/related" => parse_uuid(rest).map(Command::Related),
        "/recent" => parse_count(rest, DEFAULT_LIST_LIMIT).map(Command::Recent),
        "/learn" => parse_learn(rest),
        "/deepen" => {
            let (label, text) = split_definition(rest, "/deepen <label> = <text>")?;
            Ok(Command::Deepen { label, text })
        }
        "/relate" => parse_relate(rest),
        "/use" => required(rest, "/use <label>").map(Command::Use),
        "/forget" => required(rest, "/forget <label>").map(Command::Forget),
        "/find" => required(rest, "/find <query>").map(Command::Find),
        "/concept" => required(rest, "/concept <label>").map(Command::Concept),
        "/graph" => match rest {
            "" => Ok(Command::Graph { json: false }),
            "json" => Ok(Command::Graph { json: true }),
            other => Err(format!("Unknown /graph option '{}'; try /graph json", other)),
        },
        "/subgraph" => parse_subgraph(rest),
        "/timeline" => Ok(Command::Timeline),
        "/compress" => Ok(Command::Compress),
        "/tick" => {
            let n = parse_count(rest, 1)?;
            Ok(Command::Tick(n as u64))
        }
        "/stats" => Ok(Command::Stats),
        "/events" => parse_count(rest, DEFAULT_LIST_LIMIT).map(Command::Events),
        "/save" => Ok(Command::Save),
        "/load" => Ok(Command::Load),
        "/schema" => Ok(Command::Schema),
        other => Err(format!("Unknown command: '{}'", other)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-command parsers
// ─────────────────────────────────────────────────────────────────────────────

/// `/form <intensity> <emotion,emotion|-> <text…>`.  Words written `#label`
/// become related concepts; the `#` is dropped from the stored text.
fn parse_form(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "/form <intensity> <emotions|-> <text>";
    let mut parts = rest.splitn(3, char::is_whitespace);
    let intensity = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| usage(USAGE))?;
    let intensity: f32 = intensity
        .parse()
        .map_err(|_| format!("'{}' is not a number; usage: {}", intensity, USAGE))?;
    if !(0.0..=1.0).contains(&intensity) {
        return Err(format!("Intensity must be between 0 and 1, got {}", intensity));
    }

    let emotions = match parts.next() {
        Some("-") => Vec::new(),
        Some(tags) if !tags.is_empty() => split_list(tags),
        _ => return Err(usage(USAGE)),
    };

    let raw = parts.next().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(usage(USAGE));
    }
    let mut concepts = Vec::new();
    let words: Vec<&str> = raw
        .split_whitespace()
        .map(|word| match word.strip_prefix('#') {
            Some(label) if !label.is_empty() => {
                concepts.push(label.trim_end_matches(|c: char| c.is_ascii_punctuation()).to_string());
                label
            }
            _ => word,
        })
        .collect();

    Ok(Command::Form {
        intensity,
        emotions,
        concepts,
        text: words.join(" "),
    })
}

/// `/recall`, `/recall <emotion>` or `/recall <uuid>`.
fn parse_recall(rest: &str) -> Result<Command, String> {
    if rest.is_empty() {
        return Ok(Command::Recall(RecallTarget::Random { emotion: None }));
    }
    if let Ok(id) = Uuid::parse_str(rest) {
        return Ok(Command::Recall(RecallTarget::Id(id)));
    }
    Ok(Command::Recall(RecallTarget::Random {
        emotion: Some(rest.to_string()),
    }))
}

/// `/search emotion:<tag>`, `/search concept:<label>` or `/search <text>`.
fn parse_search(rest: &str) -> Result<Command, String> {
    let rest = required(rest, "/search [emotion:|concept:]<query>")?;
    let query = if let Some(tag) = rest.strip_prefix("emotion:") {
        SearchQuery::Emotion(tag.trim().to_string())
    } else if let Some(label) = rest.strip_prefix("concept:") {
        SearchQuery::Concept(label.trim().to_string())
    } else {
        SearchQuery::Text(rest)
    };
    Ok(Command::Search(query))
}

/// `/learn <source> <label> = <definition>`.
fn parse_learn(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "/learn <source> <label> = <definition>";
    let (source, rest) = rest.split_once(char::is_whitespace).ok_or_else(|| usage(USAGE))?;
    let source = ConceptSource::parse(source).ok_or_else(|| {
        let known: Vec<&str> = ConceptSource::ALL.iter().map(|s| s.as_str()).collect();
        format!("Unknown source '{}'; expected one of: {}", source, known.join(", "))
    })?;
    let (label, definition) = split_definition(rest, USAGE)?;
    Ok(Command::Learn {
        source,
        label,
        definition,
    })
}

/// `/relate <label> <kind> <target> [strength]`.
fn parse_relate(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "/relate <label> <kind> <target> [strength]";
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let (label, kind, target, strength) = match parts.as_slice() {
        [label, kind, target] => (label, kind, target, None),
        [label, kind, target, strength] => (label, kind, target, Some(strength)),
        _ => return Err(usage(USAGE)),
    };
    let kind = RelationKind::parse(kind).ok_or_else(|| {
        let known: Vec<&str> = RelationKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("Unknown relation '{}'; expected one of: {}", kind, known.join(", "))
    })?;
    let strength = match strength {
        Some(raw) => raw
            .parse::<f32>()
            .map_err(|_| format!("'{}' is not a number; usage: {}", raw, USAGE))?,
        None => DEFAULT_RELATION_STRENGTH,
    };
    Ok(Command::Relate {
        label: label.to_string(),
        kind,
        target: target.to_string(),
        strength,
    })
}

/// `/subgraph <label> [depth]`.  The depth is the last word when it parses.
fn parse_subgraph(rest: &str) -> Result<Command, String> {
    let rest = required(rest, "/subgraph <label> [depth]")?;
    if let Some((center, depth)) = rest.rsplit_once(char::is_whitespace) {
        if let Ok(depth) = depth.parse::<usize>() {
            return Ok(Command::Subgraph {
                center: center.trim().to_string(),
                depth,
            });
        }
    }
    Ok(Command::Subgraph {
        center: rest,
        depth: DEFAULT_SUBGRAPH_DEPTH,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn usage(usage: &str) -> String {
    format!("Usage: {}", usage)
}

fn required(rest: &str, usage_text: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(usage(usage_text))
    } else {
        Ok(rest.to_string())
    }
}

fn parse_uuid(rest: &str) -> Result<Uuid, String> {
    Uuid::parse_str(rest).map_err(|_| format!("'{}' is not a memory id", rest))
}

fn parse_count(rest: &str, default: usize) -> Result<usize, String> {
    if rest.is_empty() {
        return Ok(default);
    }
    match rest.parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("'{}' is not a positive count", rest)),
        Ok(n) => Ok(n),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_definition(rest: &str, usage_text: &str) -> Result<(String, String), String> {
    let (label, text) = rest.split_once('=').ok_or_else(|| usage(usage_text))?;
    let (label, text) = (label.trim(), text.trim());
    if label.is_empty() || text.is_empty() {
        return Err(usage(usage_text));
    }
    Ok((label.to_string(), text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── memory commands ──────────────────────────────────────────────────────

    #[test]
    fn form_collects_emotions_and_hash_concepts() {
        let cmd = parse("/form 0.8 joy,wonder Saw a #comet over the #harbour.").unwrap();
        assert_eq!(
            cmd,
            Command::Form {
                intensity: 0.8,
                emotions: vec!["joy".into(), "wonder".into()],
                concepts: vec!["comet".into(), "harbour".into()],
                text: "Saw a comet over the harbour.".into(),
            }
        );
    }

    #[test]
    fn form_accepts_dash_for_no_emotions() {
        let Command::Form { emotions, .. } = parse("/form 0.1 - quiet afternoon").unwrap() else {
            panic!("expected /form");
        };
        assert!(emotions.is_empty());
    }

    #[test]
    fn form_rejects_out_of_range_intensity() {
        let err = parse("/form 1.5 joy too much").unwrap_err();
        assert!(err.contains("between 0 and 1"));
        assert!(parse("/form loud joy text").is_err());
        assert!(parse("/form 0.5 joy").is_err());
    }

    #[test]
    fn recall_variants() {
        assert_eq!(parse("/recall").unwrap(), Command::Recall(RecallTarget::Random { emotion: None }));
        assert_eq!(
            parse("/recall fear").unwrap(),
            Command::Recall(RecallTarget::Random {
                emotion: Some("fear".into())
            })
        );
        let id = Uuid::new_v4();
        assert_eq!(parse(&format!("/recall {id}")).unwrap(), Command::Recall(RecallTarget::Id(id)));
    }

    #[test]
    fn search_prefixes_select_the_index() {
        assert_eq!(parse("/search emotion:joy").unwrap(), Command::Search(SearchQuery::Emotion("joy".into())));
        assert_eq!(parse("/search concept: sea").unwrap(), Command::Search(SearchQuery::Concept("sea".into())));
        assert_eq!(parse("/search the old pier").unwrap(), Command::Search(SearchQuery::Text("the old pier".into())));
        assert!(parse("/search").is_err());
    }

    #[test]
    fn related_requires_a_uuid() {
        assert!(parse("/related nope").unwrap_err().contains("not a memory id"));
    }

    // ── concept commands ─────────────────────────────────────────────────────

    #[test]
    fn learn_splits_label_and_definition() {
        assert_eq!(
            parse("/learn dialogue tide pool = a pool left by the sea").unwrap(),
            Command::Learn {
                source: ConceptSource::Dialogue,
                label: "tide pool".into(),
                definition: "a pool left by the sea".into(),
            }
        );
    }

    #[test]
    fn learn_rejects_unknown_source() {
        let err = parse("/learn gossip x = y").unwrap_err();
        assert!(err.contains("reading_material"));
    }

    #[test]
    fn deepen_needs_both_sides() {
        assert!(parse("/deepen sea = salty").is_ok());
        assert!(parse("/deepen sea =").is_err());
        assert!(parse("/deepen sea").is_err());
    }

    #[test]
    fn relate_parses_kind_and_optional_strength() {
        assert_eq!(
            parse("/relate wave part-of sea 0.9").unwrap(),
            Command::Relate {
                label: "wave".into(),
                kind: RelationKind::PartOf,
                target: "sea".into(),
                strength: 0.9,
            }
        );
        let Command::Relate { strength, .. } = parse("/relate wave causes foam").unwrap() else {
            panic!("expected /relate");
        };
        assert_eq!(strength, DEFAULT_RELATION_STRENGTH);
        assert!(parse("/relate wave loves sea").is_err());
    }

    #[test]
    fn subgraph_depth_is_optional() {
        assert_eq!(
            parse("/subgraph deep sea 3").unwrap(),
            Command::Subgraph {
                center: "deep sea".into(),
                depth: 3
            }
        );
        assert_eq!(
            parse("/subgraph sea").unwrap(),
            Command::Subgraph {
                center: "sea".into(),
                depth: DEFAULT_SUBGRAPH_DEPTH
            }
        );
    }

    // ── housekeeping ─────────────────────────────────────────────────────────

    #[test]
    fn counts_default_and_reject_zero() {
        assert_eq!(parse("/tick").unwrap(), Command::Tick(1));
        assert_eq!(parse("/tick 25").unwrap(), Command::Tick(25));
        assert!(parse("/tick 0").is_err());
        assert_eq!(parse("/events").unwrap(), Command::Events(DEFAULT_LIST_LIMIT));
    }

    #[test]
    fn unknown_command_is_reported() {
        assert!(parse("/dance").unwrap_err().contains("/dance"));
        assert!(parse("/graph svg").is_err());
        assert_eq!(parse("  /quit  ").unwrap(), Command::Quit);
    }
}
