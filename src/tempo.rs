use serde::Serialize;

/// Range accepted by a single `atempo` filter instance.
pub const TEMPO_MIN: f64 = 0.5;
pub const TEMPO_MAX: f64 = 2.0;

/// Ordered in-range tempo factors whose product is the requested speed change.
///
/// An empty chain means no audio tempo adjustment is needed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TempoChain(Vec<f64>);

impl TempoChain {
    pub fn factors(&self) -> &[f64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn product(&self) -> f64 {
        self.0.iter().product()
    }

    /// Renders the chain as a comma-joined `atempo` filter, `None` when empty.
    pub fn to_filter(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let parts = self
            .0
            .iter()
            .map(|factor| format!("atempo={}", format_decimal(*factor, 4)))
            .collect::<Vec<_>>();
        Some(parts.join(","))
    }
}

/// Splits `factor` into a chain of `atempo`-sized steps.
///
/// Non-positive or non-finite factors yield an empty chain; callers filter those out
/// before a plan is assembled.
pub fn clamp_tempo(factor: f64) -> TempoChain {
    if !factor.is_finite() || factor <= 0.0 || factor == 1.0 {
        return TempoChain::default();
    }

    let mut chain = Vec::new();
    let mut remaining = factor;
    while remaining > TEMPO_MAX {
        chain.push(TEMPO_MAX);
        remaining /= TEMPO_MAX;
    }
    while remaining < TEMPO_MIN {
        chain.push(TEMPO_MIN);
        remaining /= TEMPO_MIN;
    }
    chain.push(remaining);
    TempoChain(chain)
}

/// Fixed-precision decimal with trailing zeros (and a bare dot) removed.
pub fn format_decimal(value: f64, precision: usize) -> String {
    let fixed = format!("{value:.precision$}");
    if !fixed.contains('.') {
        return fixed;
    }
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}
