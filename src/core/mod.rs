//! Core functionality of the recording store.
//!
//! This module contains:
//! - Event tags and tag queries
//! - The recording façade over the three stores
//! - Window specifications turning tags into windows
//! - Lazy smart-tag extraction

pub mod extractor;
pub mod recording;
pub mod tag;
pub mod windowing;

// Re-export commonly used types
pub use extractor::{ExtractionReport, SegmentExtractor, SmartTag, Step};
pub use recording::{Recording, RecordingPaths, SampleRange, SaveOptions, Unit};
pub use tag::{Tag, TagQuery};
pub use windowing::{WindowDescriptor, WindowPlan, WindowSpecification, SELF_MARKER};
