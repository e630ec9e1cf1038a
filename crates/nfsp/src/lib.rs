//! Decision core of a Neural Fictitious Self-Play poker agent.
//!
//! A card featurizer and a shared trunk turn encoded game states into a
//! situation embedding. Two heads sit on top of it: a value head (best
//! response, trained by regression against a periodically synced target
//! network) and a policy head (average strategy, trained by classification).
//! [`nfsp::NfspStrategy`] mixes the two when choosing an action.

pub mod bucket;
pub mod config;
pub mod decision;
pub mod featurizer;
pub mod heads;
pub mod history;
mod layers;
pub mod nfsp;
pub mod policy;
pub mod state;
pub mod strategy;
pub mod target;
pub mod trunk;

pub use bucket::Bucket;
pub use config::NfspConfig;
pub use nfsp::NfspStrategy;

/// Errors raised by the NFSP decision core.
#[derive(thiserror::Error, Debug)]
pub enum NfspError {
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("shape contract violated: {0}")]
    Shape(String),
    #[error("provide either a paired head or a shared trunk, not both")]
    ConflictingTrunk,
    #[error("failed to synchronize target network: {0}")]
    SyncFailed(String),
    #[error("degenerate action distribution: {0}")]
    DegenerateDistribution(String),
    #[error("no legal actions supplied")]
    NoLegalActions,
    #[error("bucket {bucket} is outside an action space of {num_actions}")]
    BucketOutOfRange { bucket: i8, num_actions: usize },
    #[error("seat is flagged all-in but still has {0} chips")]
    AllInWithChips(f32),
    #[error("mirror strategy has no defined action: {0}")]
    MirrorUndefined(&'static str),
}
