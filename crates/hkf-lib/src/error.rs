use thiserror::Error;

/// Invalid configuration, rejected before any record is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive finite number, got {value}")]
    NonPositiveNoise { name: &'static str, value: f64 },

    #[error("class set must contain at least one symbol")]
    EmptyClassSet,

    #[error("class symbol '{0}' appears more than once")]
    DuplicateClassSymbol(char),

    #[error("test ratio must lie strictly between 0 and 1, got {0}")]
    InvalidSplitRatio(f64),
}

/// Failures surfaced by multi-record dataset preparation.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load record {record}: {reason}")]
    RecordLoad { record: String, reason: String },

    #[error(transparent)]
    Label(#[from] LabelError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("annotation has {samples} sample positions but {symbols} symbols")]
    LengthMismatch { samples: usize, symbols: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("{truth} true labels but {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },

    #[error("label {label} is outside 0..{classes}")]
    OutOfRange { label: usize, classes: usize },

    #[error("dataset has {segments} segments but {labels} labels")]
    Unpaired { segments: usize, labels: usize },

    #[error("segment of width {found} does not match dataset width {expected}")]
    WidthMismatch { expected: usize, found: usize },
}
