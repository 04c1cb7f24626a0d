//! # RustyEval: Distributed Evaluation Metrics in Rust
//!
//! **RustyEval** collects evaluation metrics (BLEU-family, WER, throughput,
//! perplexity) across parallel workers. Every metric keeps only *sufficient
//! statistics*, so the states of many workers merge into the exact result a
//! single worker would have computed over all the data.
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rustyeval::distributed::SingleProcess;
//! use rustyeval::metrics::{EffectiveThroughput, Metrics, Minimum};
//!
//! // 1. Create a registry bound to a process group
//! let mut metrics = Metrics::with_group(Arc::new(SingleProcess));
//! metrics.insert_metric("wps", EffectiveThroughput::new());
//! metrics.insert_metric("loss_min", Minimum::new());
//!
//! // 2. Update metrics while evaluating
//! if let Some(wps) = metrics.metric_mut::<EffectiveThroughput>("wps") {
//!     wps.update(512).unwrap();
//! }
//!
//! // 3. Compute (merged across workers) and reset for the next epoch
//! let results = metrics.compute("valid/", true).unwrap();
//! metrics.reset(); // `loss_min` survives
//! ```

// Declare public modules that constitute the core library API.
pub mod data;
pub mod distributed;
pub mod metrics;
