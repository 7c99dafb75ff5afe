// =============================================================================
// Feature Engineering
// =============================================================================
//
// candles + indicators --builder--> FeatureMatrix (raw, clean)
//                      --normalizer--> NormalizedMatrix + NormalizationBounds
//                      --windower--> TrainingSet + most recent window
//
// Every stage takes its input by value; nothing holds on to another stage's
// buffers after the handoff.

pub mod builder;
pub mod normalizer;
pub mod windower;

pub use builder::{build_feature_matrix, FeatureMatrix};
pub use normalizer::{denormalize_column, NormalizationBounds, NormalizedMatrix};
pub use windower::{window_sequences, TrainingSet, Windowed};

/// Number of columns in a feature vector.
pub const FEATURE_COUNT: usize = 15;

/// One aligned trading day.
pub type FeatureVector = [f64; FEATURE_COUNT];

pub const OPEN_COLUMN: usize = 0;
pub const CLOSE_COLUMN: usize = 3;

/// Column names in feature-vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Open", "High", "Low", "Close", "Volume", "EMA10", "EMA20", "EMA50", "SMA10", "SMA20",
    "SMA50", "SMA100", "RSI7", "RSI14", "RSI28",
];
