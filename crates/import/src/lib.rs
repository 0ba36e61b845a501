pub(crate) mod util;

pub mod extract;
pub mod fuzzy;
pub mod learn;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod registry;
pub mod special;

pub use extract::extract_merchant;
pub use fuzzy::fuzzy_match;
pub use learn::{learn_patterns, Correction, LearnError, LearnReport};
pub use matcher::{MatchTier, MerchantMatcher, Resolution, DEFAULT_FUZZY_THRESHOLD};
pub use normalize::normalize;
pub use orchestrator::{
    import_batch, BatchImporter, ImportContext, ImportError, ImportOutcome, ImportReport,
    UnmatchedDiagnostic,
};
pub use registry::{PatternRegistry, PatternSet, ScoredCandidate};
pub use special::{classify_special, SpecialKind};
