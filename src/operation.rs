use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    Square,
    PortraitFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Gif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// One semantic edit effect extracted from a prompt.
///
/// Consumers match on this exhaustively, so a new effect has to be handled by the
/// assembler, the describer and the filter-graph compiler before the crate builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Trim { start: f64, end: Option<f64> },
    Grayscale,
    Speed { factor: f64 },
    Mute,
    Brightness { value: f64 },
    Crop { mode: CropMode },
}

/// Discriminant used for duplicate resolution and canonical ordering.
///
/// Variants are declared in canonical order; the derived `Ord` is the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Trim,
    Grayscale,
    Speed,
    Brightness,
    Crop,
    Mute,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Trim { .. } => OperationKind::Trim,
            Self::Grayscale => OperationKind::Grayscale,
            Self::Speed { .. } => OperationKind::Speed,
            Self::Mute => OperationKind::Mute,
            Self::Brightness { .. } => OperationKind::Brightness,
            Self::Crop { .. } => OperationKind::Crop,
        }
    }

    /// Rejects operations that must never reach the filter-graph compiler.
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::Trim { start, end } => {
                start.is_finite()
                    && start >= 0.0
                    && end.map_or(true, |end| end.is_finite() && end > start)
            }
            Self::Speed { factor } => factor.is_finite() && factor > 0.0,
            Self::Brightness { value } => value.is_finite() && (-1.0..=1.0).contains(&value),
            Self::Grayscale | Self::Mute | Self::Crop { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ordering_follows_canonical_effect_order() {
        let mut ops = vec![
            Operation::Mute,
            Operation::Crop {
                mode: CropMode::Square,
            },
            Operation::Brightness { value: 0.1 },
            Operation::Speed { factor: 2.0 },
            Operation::Grayscale,
            Operation::Trim {
                start: 1.0,
                end: None,
            },
        ];
        ops.sort_by_key(Operation::kind);
        let kinds = ops.iter().map(Operation::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Trim,
                OperationKind::Grayscale,
                OperationKind::Speed,
                OperationKind::Brightness,
                OperationKind::Crop,
                OperationKind::Mute,
            ]
        );
    }

    #[test]
    fn degenerate_values_are_invalid() {
        assert!(!Operation::Trim {
            start: 5.0,
            end: Some(5.0)
        }
        .is_valid());
        assert!(!Operation::Trim {
            start: 8.0,
            end: Some(3.0)
        }
        .is_valid());
        assert!(Operation::Trim {
            start: 0.0,
            end: Some(3.0)
        }
        .is_valid());
        assert!(!Operation::Speed { factor: 0.0 }.is_valid());
        assert!(!Operation::Speed { factor: f64::NAN }.is_valid());
        assert!(!Operation::Brightness { value: 1.5 }.is_valid());
        assert!(Operation::Brightness { value: -1.0 }.is_valid());
    }

    #[test]
    fn output_format_extension_roundtrip() {
        assert_eq!(OutputFormat::from_extension("GIF"), Some(OutputFormat::Gif));
        assert_eq!(OutputFormat::from_extension("mp4"), Some(OutputFormat::Mp4));
        assert_eq!(OutputFormat::from_extension("mov"), None);
        assert_eq!(OutputFormat::default().extension(), "mp4");
    }
}
