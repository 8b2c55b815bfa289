//! Errors raised while configuring the LOD quadtree.

/// Invalid LOD configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LodError {
    /// Split/unify factors that would make nodes oscillate or never split.
    #[error("invalid LOD thresholds: {0}")]
    InvalidThresholds(String),

    /// Any other setting outside its allowed range.
    #[error("invalid LOD settings: {0}")]
    InvalidSettings(String),
}
