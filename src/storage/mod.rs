//! Pluggable storage for the three parts of a recording.
//!
//! Each store comes in a memory variant and a file-backed variant:
//! - samples: windowed reads from disk, promoted into memory on a full read
//! - parameters: persisted values shadowed by an in-memory overlay
//! - tags: parsed once, replaced wholesale on mutation

pub mod params;
pub mod samples;
pub mod tags;

pub use params::{ParamMap, ParamValue, ParameterStore};
pub use samples::{CacheState, SampleBuffer, SampleStore};
pub use tags::TagStore;
