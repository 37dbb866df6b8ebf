use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::operation::{CropMode, Operation, OperationKind, OutputFormat};
use crate::prompt_parser::{parse, Extraction};
use crate::tempo::format_decimal;

/// Which mention wins when a prompt names the same effect more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    First,
    Last,
}

/// Canonically ordered, validated edit plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    operations: Vec<Operation>,
    output: OutputFormat,
}

impl Plan {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.operations.iter().any(|operation| operation.kind() == kind)
    }

    pub fn trim(&self) -> Option<(f64, Option<f64>)> {
        self.operations.iter().find_map(|operation| match *operation {
            Operation::Trim { start, end } => Some((start, end)),
            _ => None,
        })
    }

    pub fn speed(&self) -> Option<f64> {
        self.operations.iter().find_map(|operation| match *operation {
            Operation::Speed { factor } => Some(factor),
            _ => None,
        })
    }

    pub fn is_muted(&self) -> bool {
        self.contains(OperationKind::Mute)
    }
}

/// Validates, deduplicates and canonically orders an extraction.
///
/// Invalid operations (end not after start, non-positive speed, out-of-range brightness)
/// are dropped before duplicate resolution, so a later valid mention can still win
/// under `DuplicatePolicy::First`.
pub fn assemble(extraction: &Extraction, policy: DuplicatePolicy) -> Plan {
    // Keyed by kind, whose ordering is the canonical effect order.
    let mut chosen: BTreeMap<OperationKind, Operation> = BTreeMap::new();
    for mention in &extraction.mentions {
        let operation = &mention.operation;
        if !operation.is_valid() {
            debug!(rule = mention.rule, ?operation, "dropping invalid operation");
            continue;
        }
        match policy {
            DuplicatePolicy::First => {
                if chosen.contains_key(&operation.kind()) {
                    debug!(rule = mention.rule, ?operation, "ignoring duplicate mention");
                } else {
                    chosen.insert(operation.kind(), operation.clone());
                }
            }
            DuplicatePolicy::Last => {
                chosen.insert(operation.kind(), operation.clone());
            }
        }
    }

    Plan {
        operations: chosen.into_values().collect(),
        output: extraction.output,
    }
}

pub fn plan_prompt(prompt: &str, policy: DuplicatePolicy) -> Plan {
    assemble(&parse(prompt), policy)
}

/// One human-readable sentence per operation, in canonical order.
pub fn describe(plan: &Plan) -> Vec<String> {
    plan.operations.iter().map(describe_operation).collect()
}

fn describe_operation(operation: &Operation) -> String {
    match *operation {
        Operation::Trim { start, end } => {
            let end = end
                .map(|end| format!("{}s", format_decimal(end, 2)))
                .unwrap_or_else(|| "end".to_owned());
            format!("Trim from {}s to {end}", format_decimal(start, 2))
        }
        Operation::Grayscale => "Convert to black and white".to_owned(),
        Operation::Speed { factor } => {
            format!("Change playback speed to {}x", format_decimal(factor, 4))
        }
        Operation::Brightness { value } if value < 0.0 => {
            format!("Decrease brightness by {}", format_decimal(-value, 2))
        }
        Operation::Brightness { value } => {
            format!("Increase brightness by {}", format_decimal(value, 2))
        }
        Operation::Crop {
            mode: CropMode::Square,
        } => "Crop to a centered square".to_owned(),
        Operation::Crop {
            mode: CropMode::PortraitFill,
        } => "Scale and crop to fill a 9:16 portrait frame".to_owned(),
        Operation::Mute => "Remove the audio track".to_owned(),
    }
}

/// Keeps the plan for the most recent prompt so an unchanged prompt is not re-parsed.
#[derive(Debug, Default)]
pub struct PlanCache {
    entry: Option<CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    prompt: String,
    policy: DuplicatePolicy,
    plan: Plan,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self, prompt: &str, policy: DuplicatePolicy) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.prompt == prompt && entry.policy == policy)
    }

    pub fn get_or_assemble(&mut self, prompt: &str, policy: DuplicatePolicy) -> &Plan {
        let entry = match self.entry.take() {
            Some(entry) if entry.prompt == prompt && entry.policy == policy => {
                debug!("reusing cached plan");
                entry
            }
            _ => CacheEntry {
                prompt: prompt.to_owned(),
                policy,
                plan: plan_prompt(prompt, policy),
            },
        };
        &self.entry.insert(entry).plan
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_prompt_assembles_in_canonical_order() {
        let plan = plan_prompt(
            "Trim the first 5 seconds, convert to black and white, speed up to 1.2x, and mute the audio.",
            DuplicatePolicy::First,
        );
        assert_eq!(
            plan.operations(),
            &[
                Operation::Trim {
                    start: 5.0,
                    end: None
                },
                Operation::Grayscale,
                Operation::Speed { factor: 1.2 },
                Operation::Mute,
            ]
        );
        assert_eq!(plan.output(), OutputFormat::Mp4);
    }

    #[test]
    fn mention_order_does_not_change_plan() {
        let a = plan_prompt("mute, grayscale, square, 2x speed", DuplicatePolicy::First);
        let b = plan_prompt("2x speed, square, grayscale, mute", DuplicatePolicy::First);
        assert_eq!(a, b);
        let kinds = a.operations().iter().map(Operation::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Grayscale,
                OperationKind::Speed,
                OperationKind::Crop,
                OperationKind::Mute,
            ]
        );
    }

    #[test]
    fn invalid_trim_and_speed_are_omitted() {
        let plan = plan_prompt("from 9s to 3s at 0x speed", DuplicatePolicy::First);
        assert!(plan.is_empty(), "got {:?}", plan.operations());
    }

    #[test]
    fn duplicate_policy_picks_first_or_last() {
        let prompt = "speed up to 1.5x, actually make it 3x speed";
        assert_eq!(
            plan_prompt(prompt, DuplicatePolicy::First).speed(),
            Some(1.5)
        );
        assert_eq!(plan_prompt(prompt, DuplicatePolicy::Last).speed(), Some(3.0));
    }

    #[test]
    fn flags_are_not_counted() {
        let plan = plan_prompt("mute it. silent. grayscale and monochrome", DuplicatePolicy::Last);
        assert_eq!(plan.operations(), &[Operation::Grayscale, Operation::Mute]);
    }

    #[test]
    fn describer_mirrors_canonical_order() {
        let plan = plan_prompt(
            "darken by 20%, mute, from 2s to 7.5s, speed up to 1.2x, portrait",
            DuplicatePolicy::First,
        );
        assert_eq!(
            describe(&plan),
            vec![
                "Trim from 2s to 7.5s".to_owned(),
                "Change playback speed to 1.2x".to_owned(),
                "Decrease brightness by 0.2".to_owned(),
                "Scale and crop to fill a 9:16 portrait frame".to_owned(),
                "Remove the audio track".to_owned(),
            ]
        );
    }

    #[test]
    fn describer_handles_open_trim_and_empty_plan() {
        let plan = plan_prompt("trim the first 5 seconds", DuplicatePolicy::First);
        assert_eq!(describe(&plan), vec!["Trim from 5s to end".to_owned()]);
        assert!(describe(&plan_prompt("", DuplicatePolicy::First)).is_empty());
    }

    #[test]
    fn cache_reuses_plan_for_unchanged_prompt() {
        let mut cache = PlanCache::new();
        assert!(!cache.is_cached("grayscale", DuplicatePolicy::First));
        let first = cache.get_or_assemble("grayscale", DuplicatePolicy::First).clone();
        assert!(cache.is_cached("grayscale", DuplicatePolicy::First));
        assert!(!cache.is_cached("grayscale", DuplicatePolicy::Last));
        assert_eq!(cache.get_or_assemble("grayscale", DuplicatePolicy::First), &first);

        let second = cache.get_or_assemble("mute", DuplicatePolicy::First).clone();
        assert_eq!(second.operations(), &[Operation::Mute]);
        assert!(!cache.is_cached("grayscale", DuplicatePolicy::First));

        cache.clear();
        assert!(!cache.is_cached("mute", DuplicatePolicy::First));
    }
}
