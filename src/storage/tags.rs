//! Event tag storage, kept in ascending start order.

use crate::core::tag::{sort_by_start, Tag, TagQuery};
use crate::error::Result;
use crate::format::tagfile;
use std::path::{Path, PathBuf};

/// Tags parsed once from a tags artifact.
#[derive(Debug, Clone)]
pub struct FileTags {
    path: PathBuf,
    tags: Vec<Tag>,
}

impl FileTags {
    pub fn open(path: impl AsRef<Path>, first_sample_timestamp: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut tags = tagfile::read_file(&path, first_sample_timestamp)?;
        sort_by_start(&mut tags);
        tracing::debug!("Loaded {} tags from {}", tags.len(), path.display());
        Ok(Self { path, tags })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Storage for the event tags of one recording.
#[derive(Debug, Clone)]
pub enum TagStore {
    Memory(Vec<Tag>),
    File(FileTags),
}

impl Default for TagStore {
    fn default() -> Self {
        TagStore::Memory(Vec::new())
    }
}

impl TagStore {
    /// An in-memory store; the tags are sorted by start timestamp.
    pub fn memory(mut tags: Vec<Tag>) -> Self {
        sort_by_start(&mut tags);
        TagStore::Memory(tags)
    }

    pub fn open(path: impl AsRef<Path>, first_sample_timestamp: f64) -> Result<Self> {
        Ok(TagStore::File(FileTags::open(path, first_sample_timestamp)?))
    }

    /// Every tag in ascending start order.
    pub fn all(&self) -> &[Tag] {
        match self {
            TagStore::Memory(tags) => tags,
            TagStore::File(file) => &file.tags,
        }
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.all().is_empty()
    }

    /// Tags matching every filter set in `query`, in ascending start order.
    pub fn get_tags(&self, query: &TagQuery<'_>) -> Vec<Tag> {
        query.apply(self.all())
    }

    /// Replace the whole collection. The store becomes memory-backed and no
    /// longer reflects the artifact.
    pub fn set_tags(&mut self, tags: Vec<Tag>) {
        *self = TagStore::memory(tags);
    }
}
