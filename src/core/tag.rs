//! Timestamped event tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named event over a time range within a recording.
///
/// Timestamps are absolute seconds on the same clock as the recording's
/// `first_sample_timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredTag")]
pub struct Tag {
    /// Start of the event
    pub start_timestamp: f64,
    /// End of the event, never before the start
    pub end_timestamp: f64,
    /// Event name, used for filtering and window matching
    pub name: String,
    /// Channel restriction, `None` for all channels
    pub channels: Option<String>,
    /// Free-form named description fields
    pub description: BTreeMap<String, String>,
}

impl Tag {
    /// Create a tag. An end before the start is clamped to the start.
    pub fn new(name: impl Into<String>, start_timestamp: f64, end_timestamp: f64) -> Self {
        Self {
            start_timestamp,
            end_timestamp: end_timestamp.max(start_timestamp),
            name: name.into(),
            channels: None,
            description: BTreeMap::new(),
        }
    }

    /// Create a zero-length tag.
    pub fn instant(name: impl Into<String>, timestamp: f64) -> Self {
        Self::new(name, timestamp, timestamp)
    }

    /// Restrict the tag to the given channels.
    pub fn with_channels(mut self, channels: impl Into<String>) -> Self {
        self.channels = Some(channels.into());
        self
    }

    /// Add a description field.
    pub fn with_desc(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.description.insert(key.into(), value.into());
        self
    }

    /// Length of the event in seconds.
    pub fn duration(&self) -> f64 {
        self.end_timestamp - self.start_timestamp
    }
}

/// Deserialized form of a [`Tag`], clamped through [`Tag::new`].
#[derive(Deserialize)]
struct StoredTag {
    start_timestamp: f64,
    end_timestamp: f64,
    name: String,
    #[serde(default)]
    channels: Option<String>,
    #[serde(default)]
    description: BTreeMap<String, String>,
}

impl From<StoredTag> for Tag {
    fn from(stored: StoredTag) -> Self {
        let mut tag = Tag::new(stored.name, stored.start_timestamp, stored.end_timestamp);
        tag.channels = stored.channels;
        tag.description = stored.description;
        tag
    }
}

/// Optional filters for a tag lookup. All set filters must match.
#[derive(Default)]
pub struct TagQuery<'a> {
    /// Exact match on the tag name
    pub name: Option<&'a str>,
    /// Lower bound on the start timestamp
    pub from: Option<f64>,
    /// Window length after `from`; ignored without `from`
    pub duration: Option<f64>,
    /// Arbitrary filter applied after the others
    pub predicate: Option<&'a dyn Fn(&Tag) -> bool>,
}

impl<'a> TagQuery<'a> {
    /// Query matching every tag.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query matching tags with the given name.
    pub fn named(name: &'a str) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn from(mut self, from: f64) -> Self {
        self.from = Some(from);
        self
    }

    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn filter(mut self, predicate: &'a dyn Fn(&Tag) -> bool) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Check a single tag against every set filter.
    pub fn matches(&self, tag: &Tag) -> bool {
        if let Some(name) = self.name {
            if tag.name != name {
                return false;
            }
        }
        if let Some(from) = self.from {
            if tag.start_timestamp < from {
                return false;
            }
            if let Some(duration) = self.duration {
                if tag.start_timestamp > from + duration {
                    return false;
                }
            }
        }
        match self.predicate {
            Some(predicate) => predicate(tag),
            None => true,
        }
    }

    /// Apply the query to an ordered tag list, keeping the order.
    pub fn apply(&self, tags: &[Tag]) -> Vec<Tag> {
        tags.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}

/// Stable ascending sort by start timestamp.
pub fn sort_by_start(tags: &mut [Tag]) {
    tags.sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
}
