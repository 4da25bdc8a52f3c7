pub mod aggregator;
pub mod collaborative;
pub mod diversity;
pub mod enrichment;
pub mod ensemble;
pub mod generation;
pub mod jobs;
pub mod llm;
pub mod providers;
pub mod sources;
pub mod taste;

pub use generation::{GenerationPipeline, GenerationRequest, PipelineDeps};
pub use jobs::JobTracker;
pub use sources::OpinionSource;
