//! Codecs for the three persisted artifacts of a recording.

pub mod info;
pub mod raw;
pub mod tagfile;

pub use info::keys;
pub use raw::{ByteOrder, RawFormat, SampleType};
