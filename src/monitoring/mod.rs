//! Run Monitoring Module
//!
//! Provides timing utilities used while a run executes.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Node start/end timing for run summaries

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, NodeTiming, TimelineEvent};
