//! Scoring engines: per-image media heuristics and the profile-level
//! quality score.

pub mod media;
pub mod quality;

pub use media::{MediaScorer, LOGO_CANDIDATE_THRESHOLD, LOGO_CONFIRMED_THRESHOLD};
pub use quality::{QualityInputs, QualityReport, Rating};
