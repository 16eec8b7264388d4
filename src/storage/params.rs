//! Recording metadata: a flat key/value mapping with an optional persisted source.

use crate::error::{RecordingError, Result};
use crate::format::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A metadata value: either one scalar or an ordered list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Simple(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn simple(value: impl ToString) -> Self {
        ParamValue::Simple(value.to_string())
    }

    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        ParamValue::List(values.into_iter().map(|v| v.to_string()).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Simple(s) => Some(s),
            ParamValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::List(items) => Some(items),
            ParamValue::Simple(_) => None,
        }
    }
}

/// Key/value metadata of one recording.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Parameters parsed once from a parameters artifact, shadowed by local edits.
#[derive(Debug, Clone)]
pub struct FileParams {
    path: PathBuf,
    persisted: ParamMap,
    overlay: ParamMap,
}

impl FileParams {
    /// Parse a parameters artifact.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let persisted = info::read_file(&path)?;
        Ok(Self {
            path,
            persisted,
            overlay: ParamMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Values as they are stored on disk, ignoring the overlay.
    pub fn persisted(&self) -> &ParamMap {
        &self.persisted
    }
}

/// Storage for the metadata of one recording.
#[derive(Debug, Clone)]
pub enum ParameterStore {
    Memory(ParamMap),
    File(FileParams),
}

impl ParameterStore {
    pub fn memory(params: ParamMap) -> Self {
        ParameterStore::Memory(params)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(ParameterStore::File(FileParams::open(path)?))
    }

    /// Look up a key, overlay first.
    pub fn get(&self, key: &str) -> Result<&ParamValue> {
        let found = match self {
            ParameterStore::Memory(params) => params.get(key),
            ParameterStore::File(file) => file
                .overlay
                .get(key)
                .or_else(|| file.persisted.get(key)),
        };
        found.ok_or_else(|| RecordingError::MissingParameter(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    /// The effective mapping, with overlay values replacing persisted ones.
    pub fn get_all(&self) -> ParamMap {
        match self {
            ParameterStore::Memory(params) => params.clone(),
            ParameterStore::File(file) => {
                let mut all = file.persisted.clone();
                all.extend(file.overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
                all
            }
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) {
        let target = match self {
            ParameterStore::Memory(params) => params,
            ParameterStore::File(file) => &mut file.overlay,
        };
        target.insert(key.into(), value);
    }

    pub fn update(&mut self, params: ParamMap) {
        for (key, value) in params {
            self.set(key, value);
        }
    }

    /// Drop local edits. A file-backed store reverts to the persisted
    /// values; a memory store has nothing to revert to and is emptied.
    pub fn reset(&mut self) {
        match self {
            ParameterStore::Memory(params) => params.clear(),
            ParameterStore::File(file) => file.overlay.clear(),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        let value = self.get(key)?;
        value.as_str().ok_or_else(|| malformed(key, value))
    }

    pub fn get_list(&self, key: &str) -> Result<&[String]> {
        let value = self.get(key)?;
        value.as_list().ok_or_else(|| malformed(key, value))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.parse(key)
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        self.parse(key)
    }

    /// Parse every element of a list value.
    pub fn get_f64_list(&self, key: &str) -> Result<Vec<f64>> {
        self.get_list(key)?
            .iter()
            .map(|item| {
                item.trim()
                    .parse()
                    .map_err(|_| RecordingError::MalformedParameter {
                        key: key.to_string(),
                        value: item.clone(),
                    })
            })
            .collect()
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.get_str(key)?;
        raw.trim()
            .parse()
            .map_err(|_| RecordingError::MalformedParameter {
                key: key.to_string(),
                value: raw.to_string(),
            })
    }
}

fn malformed(key: &str, value: &ParamValue) -> RecordingError {
    RecordingError::MalformedParameter {
        key: key.to_string(),
        value: format!("{value:?}"),
    }
}
