//! Business-logic orchestrators built on the data-access layer

pub mod merge;
pub mod pipeline;

pub use merge::{MergeImpact, MergeOutcome, MergeService, merge_contact_fields};
pub use pipeline::{IndexUpdate, PipelineService, plan_move};
