//! # Data Pipeline Module
//!
//! Lazy, pull-based pipelines used while iterating evaluation datasets.
//!
//! ## Key Components
//!
//! - [`Source`]: Resettable producer of examples
//! - [`DataPipelineBuilder`]: Chains stages (`filter`, `map`, ...)
//! - [`DataPipeline`]: Finished pipeline, iterable any number of times via `reset`
//!
//! ## Example
//!
//! ```ignore
//! use rustyeval::data::read_sequence;
//!
//! let mut pipeline = read_sequence(vec![1, 2, 3, 4, 5, 6, 7, 8, 9])
//!     .filter(|d| d % 2 == 1)
//!     .and_return();
//!
//! for epoch in 0..2 {
//!     for example in &mut pipeline {
//!         let example = example?;
//!         // Evaluate on example
//!     }
//!     pipeline.reset();
//! }
//! ```
//!
//! ## Error Handling
//!
//! A failing predicate or map function is yielded as an `Err` exactly at the
//! example that triggered it. The pass stops there; `reset` starts a new one.

pub mod filter;
pub mod pipeline;

pub use filter::Filter;
pub use pipeline::{
    read_sequence, BoxError, DataPipeline, DataPipelineBuilder, Map, PipelineError,
    PipelineResult, PipelineState, ReadSequence, Source,
};
