//! sigrec - storage and segmentation of multichannel biosignal recordings.
//!
//! A recording is three artifacts sharing a base name: an XML header with
//! the recording parameters, a raw binary block of interleaved samples, and
//! an XML file of timestamped event tags. Each part can be held in memory or
//! backed by its file, and the [`Recording`] façade hides which one is in use.
//!
//! Tags are turned into windows by a [`WindowSpecification`], and a
//! [`SegmentExtractor`] lazily cuts one derived recording (a "smart tag") per
//! window.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          sigrec                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  .obci.xml  │   │  .obci.raw  │   │  .obci.tag  │        │
//! │  │  (format)   │   │  (format)   │   │  (format)   │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         │                 │                 │               │
//! │         ▼                 ▼                 ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │ Parameters  │   │   Samples   │   │    Tags     │        │
//! │  │   (store)   │   │   (store)   │   │   (store)   │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         └─────────────────┼─────────────────┘               │
//! │                           ▼                                 │
//! │                    ┌─────────────┐   ┌─────────────┐        │
//! │                    │  Recording  │──▶│  Extractor  │        │
//! │                    └─────────────┘   │ (windowing) │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sigrec::{Recording, RecordingPaths, Step, WindowSpecification};
//!
//! let paths = RecordingPaths::from_base("data", "session_01");
//! let mut recording = Recording::open(&paths)?;
//!
//! let spec = WindowSpecification::duration("stimulus", 1.0).with_offsets(-0.2, 0.0);
//! let mut extractor = recording.smart_tags(spec)?;
//! while let Step::Item(smart_tag) = extractor.next_window()? {
//!     println!("{} samples from {}", smart_tag.sample_count(), smart_tag.start_timestamp());
//! }
//! # Ok::<(), sigrec::RecordingError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod format;
pub mod storage;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ExtractionConfig};
pub use core::{
    ExtractionReport, Recording, RecordingPaths, SampleRange, SaveOptions, SegmentExtractor,
    SmartTag, Step, Tag, TagQuery, Unit, WindowDescriptor, WindowSpecification,
};
pub use error::{RecordingError, Result};
pub use format::{ByteOrder, SampleType};
pub use storage::{ParamMap, ParamValue, ParameterStore, SampleBuffer, SampleStore, TagStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
