use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while configuring patterns or synthesizing ad units.
///
/// Batch entry points never return these to the caller. They are logged and the affected item
/// degrades (pattern dropped, transaction object left unmatched, ad unit missing).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Ad unit pattern failed validation.
    #[error("invalid ad unit pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    /// `slotPattern` or `divPattern` is not a valid regular expression.
    #[error("invalid regex {pattern:?}")]
    InvalidRegex {
        /// The offending pattern string.
        pattern: String,
        /// regex::Error is not `Clone`, so it's wrapped in an Arc.
        #[source]
        source: Arc<regex::Error>,
    },

    /// Transaction object of a type that cannot be matched against patterns.
    #[error("invalid transaction object type: {0}")]
    InvalidTransactionType(&'static str),

    /// Ad unit could not be built from a pattern.
    #[error("error building ad unit: {0}")]
    AdUnitSynthesis(String),

    /// serde_json::Error is not `Clone`, so it's wrapped in an Arc.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}

/// Configuration errors detected when an ad unit pattern is added.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PatternError {
    /// Pattern declares neither `slotPattern` nor `divPattern`.
    #[error("can't create AUP without slot pattern or div pattern")]
    MissingPattern,

    /// `mediaTypes.banner.sizes` is present but is not an array.
    #[error("sizes should be an array")]
    SizesNotArray,

    /// One of the declared sizes is not a `[width, height]` pair of numbers.
    #[error("invalid size at index {index}")]
    InvalidSize {
        /// Position of the offending entry.
        index: usize,
    },

    /// Pattern is not a JSON object.
    #[error("ad unit pattern should be an object")]
    NotAnObject,
}
