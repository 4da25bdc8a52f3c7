mod candidate;
mod job;
mod proposal;
mod rating;
mod taste;
mod title;

pub use candidate::{normalize_title, MergeKey, RankedRecommendation, ScoredCandidate};
pub use job::{GenerationJob, JobStage, JobStatus};
pub use proposal::{LlmVendor, Proposal, SourceId};
pub use rating::{RatedItem, MAX_RATING, MIN_RATING};
pub use taste::{CategoryFocus, RatingStyle, TasteContext, TasteProfile};
pub use title::{CandidateItem, MovieMetadata, ProviderLink, StreamingProviders, TitleId};
