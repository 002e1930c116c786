//! Pipeline execution: the parallel group runner and the per-unit worker pipeline.

pub mod parallel;
pub mod worker;

pub use parallel::{GroupReport, MemberFailure, ParallelGroup};
pub use worker::{
    keys, PipelineDeps, PipelineOutcome, PipelineSettings, PipelineStage, WorkerPipeline,
};
