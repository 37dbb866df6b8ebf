use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use crate::operation::{CropMode, Operation, OutputFormat};

const TIME: &str = r"\d+:\d{2}(?::\d{2})?(?:\.\d+)?|\d+(?:\.\d+)?";
const NUM: &str = r"\d+(?:\.\d+)?";
const UNIT: &str = r"seconds?|secs?|s|minutes?|mins?";

/// One operation found in a prompt, with the byte offset of the phrase that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mention {
    pub offset: usize,
    pub rule: &'static str,
    pub operation: Operation,
}

/// Raw parser output: every recognised mention in prompt order plus the format hint.
///
/// Nothing here is validated or deduplicated; that is the assembler's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub mentions: Vec<Mention>,
    pub output: OutputFormat,
}

impl Extraction {
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.mentions.iter().map(|mention| &mention.operation)
    }

    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Op(Operation),
    TrimStart(f64),
    TrimEnd(f64),
    Format(OutputFormat),
}

struct Rule {
    name: &'static str,
    pattern: &'static str,
    extract: fn(&Captures<'_>) -> Option<Piece>,
}

static RULES: [Rule; 10] = [
    Rule {
        name: "trim_range",
        pattern: r"(?i)\b(?:from|between|trim|cut|keep|clip)\s+(?:from\s+)?(?P<start>{time})\s*(?P<su>{unit})?\s*(?:to|and|until|till|through|-)\s*(?P<end>{time})\s*(?P<eu>{unit})?\b",
        extract: extract_trim_range,
    },
    Rule {
        name: "trim_first",
        pattern: r"(?i)\b(?:trim|cut|skip|remove|drop|chop)\s+(?:off\s+)?(?:the\s+)?first\s+(?P<start>{time})\s*(?P<su>{unit})?\b",
        extract: extract_trim_start,
    },
    Rule {
        name: "trim_start_at",
        pattern: r"(?i)\b(?:(?:cut|trim|start|starting|begin|beginning)\s+(?:from|at)|from)\s+(?P<start>{time})\s*(?P<su>{unit})?\b",
        extract: extract_trim_start,
    },
    Rule {
        name: "trim_end",
        pattern: r"(?i)\b(?:to|until|till|through|(?:end|ending|stop|stopping)\s+at)\s+(?P<end>{time})\s*(?P<eu>{unit})?\b",
        extract: extract_trim_end,
    },
    Rule {
        name: "grayscale",
        pattern: r"(?i)\b(?:black\s*(?:and|&|n)\s*white|b\s*&\s*w|gr[ae]y\s*scale|monochrome|desaturate[ds]?)\b",
        extract: extract_grayscale,
    },
    Rule {
        name: "speed",
        pattern: r"(?i)\b(?:(?P<verb>speed(?:\s+it)?\s+up|slow(?:\s+it)?\s+down|playback(?:\s+speed)?|speed)\s+(?:(?:to|by|of|at)\s+)?(?P<to>{num})\s*x\b|(?P<faster>{num})\s*x\s+faster\b|(?P<slower>{num})\s*x\s+slower\b|(?:at\s+)?(?P<at>{num})x\b|(?P<double>double|twice\s+the)\s+speed\b|(?P<half>half)[\s-]+speed\b)",
        extract: extract_speed,
    },
    Rule {
        name: "mute",
        pattern: r"(?i)\b(?:mute[sd]?|muting|silent|silence|(?:remove|strip|drop|kill|cut|delete)\s+(?:the\s+|all\s+)?(?:audio|sound)|no\s+(?:audio|sound)|without\s+(?:the\s+)?(?:audio|sound))\b",
        extract: extract_mute,
    },
    Rule {
        name: "brightness",
        pattern: r"(?i)\b(?:(?P<verb>brighten|lighten|darken|dim)(?:\s+(?:it|the\s+(?:video|clip|footage)))?\s+(?:by\s+)?(?P<amount>{num})\s*(?P<apct>%|percent)?|brightness\s*(?:to|of|by|=|:|at)?\s*(?P<value>[+-]?{num})\s*(?P<vpct>%|percent)?)",
        extract: extract_brightness,
    },
    Rule {
        name: "crop",
        pattern: r"(?i)\b(?:(?P<square>square|1:1)|(?P<portrait>portrait|vertical|9:16|9x16))\b",
        extract: extract_crop,
    },
    Rule {
        name: "gif",
        pattern: r"(?i)\bgifs?\b",
        extract: extract_gif,
    },
];

fn compiled_rules() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| {
                let pattern = rule
                    .pattern
                    .replace("{time}", TIME)
                    .replace("{num}", NUM)
                    .replace("{unit}", UNIT);
                Regex::new(&pattern).expect("prompt rule regex should compile")
            })
            .collect()
    })
}

/// Scans `prompt` with every rule independently.
///
/// Never fails: unrecognised text contributes nothing and an empty prompt yields an
/// empty extraction targeting MP4.
pub fn parse(prompt: &str) -> Extraction {
    let mut found: Vec<(usize, usize, usize, Piece)> = Vec::new();
    for (index, (rule, regex)) in RULES.iter().zip(compiled_rules()).enumerate() {
        for captures in regex.captures_iter(prompt) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if let Some(piece) = (rule.extract)(&captures) {
                found.push((whole.start(), whole.end(), index, piece));
            }
        }
    }
    found.sort_by_key(|(start, _, index, _)| (*start, *index));

    // Loose trim bounds never share text with another operation: "from 2s to 8s" is a
    // range, "crop to 9:16" is an aspect ratio.
    let claimed = found
        .iter()
        .filter(|(_, _, _, piece)| matches!(piece, Piece::Op(_)))
        .map(|(start, end, _, _)| (*start, *end))
        .collect::<Vec<_>>();
    let is_claimed = |start: usize, end: usize| {
        claimed
            .iter()
            .any(|(claim_start, claim_end)| start < *claim_end && *claim_start < end)
    };

    let mut extraction = Extraction::default();
    let mut loose_offset: Option<usize> = None;
    let mut loose_start: Option<f64> = None;
    let mut loose_end: Option<f64> = None;

    for (start, end, index, piece) in found {
        match piece {
            Piece::Op(operation) => extraction.mentions.push(Mention {
                offset: start,
                rule: RULES[index].name,
                operation,
            }),
            Piece::TrimStart(seconds) if !is_claimed(start, end) => {
                loose_offset.get_or_insert(start);
                loose_start.get_or_insert(seconds);
            }
            Piece::TrimEnd(seconds) if !is_claimed(start, end) => {
                loose_offset.get_or_insert(start);
                loose_end.get_or_insert(seconds);
            }
            Piece::TrimStart(_) | Piece::TrimEnd(_) => {}
            Piece::Format(format) => extraction.output = format,
        }
    }

    if let Some(offset) = loose_offset {
        let mention = Mention {
            offset,
            rule: "trim_bounds",
            operation: Operation::Trim {
                start: loose_start.unwrap_or(0.0),
                end: loose_end,
            },
        };
        let position = extraction
            .mentions
            .iter()
            .position(|existing| existing.offset > offset)
            .unwrap_or(extraction.mentions.len());
        extraction.mentions.insert(position, mention);
    }

    debug!(
        mentions = extraction.mentions.len(),
        output = ?extraction.output,
        "parsed prompt"
    );
    extraction
}

fn extract_trim_range(captures: &Captures<'_>) -> Option<Piece> {
    let start_unit = captures.name("su").map(|unit| unit.as_str());
    let end_unit = captures.name("eu").map(|unit| unit.as_str());
    let start = parse_time(captures.name("start")?.as_str(), start_unit.or(end_unit))?;
    let end = parse_time(captures.name("end")?.as_str(), end_unit.or(start_unit))?;
    Some(Piece::Op(Operation::Trim {
        start,
        end: Some(end),
    }))
}

fn extract_trim_start(captures: &Captures<'_>) -> Option<Piece> {
    let seconds = parse_unit_time(captures, "start", "su")?;
    Some(Piece::TrimStart(seconds))
}

fn extract_trim_end(captures: &Captures<'_>) -> Option<Piece> {
    let seconds = parse_unit_time(captures, "end", "eu")?;
    Some(Piece::TrimEnd(seconds))
}

/// Loose bounds need a unit or a clock timestamp, so "speed up to 1.2x" is not an end.
fn parse_unit_time(captures: &Captures<'_>, value: &str, unit: &str) -> Option<f64> {
    let text = captures.name(value)?.as_str();
    let unit = captures.name(unit).map(|unit| unit.as_str());
    if unit.is_none() && !text.contains(':') {
        return None;
    }
    parse_time(text, unit)
}

/// Parses `SS`, `SS.s`, `M:SS` or `H:MM:SS`, scaling plain numbers by a minute unit.
fn parse_time(text: &str, unit: Option<&str>) -> Option<f64> {
    if text.contains(':') {
        return text.split(':').try_fold(0.0_f64, |total, part| {
            part.parse::<f64>().ok().map(|value| total * 60.0 + value)
        });
    }
    let value = text.parse::<f64>().ok()?;
    let minutes = unit.is_some_and(|unit| unit.to_ascii_lowercase().starts_with('m'));
    Some(if minutes { value * 60.0 } else { value })
}

fn extract_grayscale(_: &Captures<'_>) -> Option<Piece> {
    Some(Piece::Op(Operation::Grayscale))
}

fn extract_mute(_: &Captures<'_>) -> Option<Piece> {
    Some(Piece::Op(Operation::Mute))
}

fn extract_gif(_: &Captures<'_>) -> Option<Piece> {
    Some(Piece::Format(OutputFormat::Gif))
}

fn extract_speed(captures: &Captures<'_>) -> Option<Piece> {
    let factor = if let Some(value) = captures.name("to") {
        let value = value.as_str().parse::<f64>().ok()?;
        let slowing = captures
            .name("verb")
            .is_some_and(|verb| verb.as_str().to_ascii_lowercase().starts_with("slow"));
        if slowing && value > 1.0 {
            1.0 / value
        } else {
            value
        }
    } else if let Some(value) = captures.name("faster").or_else(|| captures.name("at")) {
        value.as_str().parse::<f64>().ok()?
    } else if let Some(value) = captures.name("slower") {
        1.0 / value.as_str().parse::<f64>().ok()?
    } else if captures.name("double").is_some() {
        2.0
    } else if captures.name("half").is_some() {
        0.5
    } else {
        return None;
    };
    Some(Piece::Op(Operation::Speed { factor }))
}

fn extract_brightness(captures: &Captures<'_>) -> Option<Piece> {
    let (raw, percent, sign) = if let Some(amount) = captures.name("amount") {
        let verb = captures.name("verb")?.as_str().to_ascii_lowercase();
        let sign = if verb == "darken" || verb == "dim" {
            -1.0
        } else {
            1.0
        };
        (amount.as_str(), captures.name("apct").is_some(), sign)
    } else {
        let value = captures.name("value")?;
        (value.as_str(), captures.name("vpct").is_some(), 1.0)
    };

    let mut value = raw.parse::<f64>().ok()?;
    if percent {
        value /= 100.0;
    }
    let value = (sign * value).clamp(-1.0, 1.0);
    Some(Piece::Op(Operation::Brightness { value }))
}

fn extract_crop(captures: &Captures<'_>) -> Option<Piece> {
    let mode = if captures.name("square").is_some() {
        CropMode::Square
    } else {
        CropMode::PortraitFill
    };
    Some(Piece::Op(Operation::Crop { mode }))
}
