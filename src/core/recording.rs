//! The recording façade over sample, parameter and tag storage.

use crate::core::tag::{Tag, TagQuery};
use crate::error::{RecordingError, Result};
use crate::format::raw::{ByteOrder, RawFormat, SampleType};
use crate::format::{info, keys, tagfile};
use crate::storage::samples::Frames;
use crate::storage::{ParamMap, ParamValue, ParameterStore, SampleBuffer, SampleStore, TagStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name suffix of the parameters artifact.
pub const INFO_EXTENSION: &str = "obci.xml";
/// File name suffix of the samples artifact.
pub const DATA_EXTENSION: &str = "obci.raw";
/// File name suffix of the tags artifact.
pub const TAGS_EXTENSION: &str = "obci.tag";

/// Locations of the three artifacts of one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPaths {
    pub info: PathBuf,
    pub data: PathBuf,
    /// Optional; a recording without tags has no tags artifact.
    pub tags: Option<PathBuf>,
}

impl RecordingPaths {
    pub fn new(info: impl Into<PathBuf>, data: impl Into<PathBuf>, tags: Option<PathBuf>) -> Self {
        Self {
            info: info.into(),
            data: data.into(),
            tags,
        }
    }

    /// `<dir>/<name>.obci.xml`, `<dir>/<name>.obci.raw`, `<dir>/<name>.obci.tag`.
    pub fn from_base(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            info: dir.join(format!("{name}.{INFO_EXTENSION}")),
            data: dir.join(format!("{name}.{DATA_EXTENSION}")),
            tags: Some(dir.join(format!("{name}.{TAGS_EXTENSION}"))),
        }
    }

    /// Derive the sibling artifacts from the path of any one of them.
    pub fn from_any(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_str()?;
        let base = [INFO_EXTENSION, DATA_EXTENSION, TAGS_EXTENSION]
            .iter()
            .find_map(|ext| file_name.strip_suffix(&format!(".{ext}")))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        Some(Self::from_base(dir, base))
    }
}

/// Unit of positions and lengths passed to [`Recording::samples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    Sample,
    Second,
}

/// Optional bounds of a sample read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleRange {
    pub from: Option<f64>,
    pub len: Option<f64>,
    pub unit: Unit,
}

impl SampleRange {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// `len` samples from sample index `from`.
    pub fn samples(from: usize, len: usize) -> Self {
        Self {
            from: Some(from as f64),
            len: Some(len as f64),
            unit: Unit::Sample,
        }
    }

    /// `len` seconds from `from` seconds after the first sample.
    pub fn seconds(from: f64, len: f64) -> Self {
        Self {
            from: Some(from),
            len: Some(len),
            unit: Unit::Second,
        }
    }
}

/// How samples are encoded by [`Recording::save_with`]. Unset fields keep the
/// recording's declared `sample_type` / `byte_order`, falling back to
/// little-endian doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    pub sample_type: Option<SampleType>,
    pub byte_order: Option<ByteOrder>,
}

/// One continuous multichannel time series with its metadata and tags.
#[derive(Debug)]
pub struct Recording {
    samples: SampleStore,
    params: ParameterStore,
    tags: TagStore,
}

impl Recording {
    /// Open a persisted recording. Samples stay on disk until requested.
    pub fn open(paths: &RecordingPaths) -> Result<Self> {
        let params = ParameterStore::open(&paths.info)?;
        let format = raw_format(&params, &paths.info)?;
        let first_sample_timestamp = match params.get(keys::FIRST_SAMPLE_TIMESTAMP) {
            Ok(_) => params.get_f64(keys::FIRST_SAMPLE_TIMESTAMP)?,
            Err(_) => 0.0,
        };

        let tags = match &paths.tags {
            Some(path) if path.exists() => TagStore::open(path, first_sample_timestamp)?,
            Some(path) => {
                tracing::debug!("No tags artifact at {}", path.display());
                TagStore::default()
            }
            None => TagStore::default(),
        };
        let samples = SampleStore::open(&paths.data, format)?;

        tracing::info!(
            "Opened recording {} ({} channels, {} tags)",
            paths.info.display(),
            format.channels,
            tags.len()
        );
        Ok(Self {
            samples,
            params,
            tags,
        })
    }

    /// Build an in-memory recording with default calibration.
    pub fn new(
        sampling_frequency: f64,
        channel_names: Vec<String>,
        buffer: SampleBuffer,
    ) -> Result<Self> {
        if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
            return Err(RecordingError::InvalidArgument(format!(
                "sampling frequency must be positive, got {sampling_frequency}"
            )));
        }
        check_shape(&buffer, &channel_names)?;

        let channels = channel_names.len();
        let mut params = ParamMap::new();
        params.insert(
            keys::SAMPLING_FREQUENCY.into(),
            ParamValue::simple(sampling_frequency),
        );
        params.insert(keys::NUMBER_OF_CHANNELS.into(), ParamValue::simple(channels));
        params.insert(
            keys::NUMBER_OF_SAMPLES.into(),
            ParamValue::simple(buffer.sample_count()),
        );
        params.insert(keys::CHANNELS_NAMES.into(), ParamValue::List(channel_names));
        params.insert(
            keys::CHANNELS_GAINS.into(),
            ParamValue::list(vec![1.0; channels]),
        );
        params.insert(
            keys::CHANNELS_OFFSETS.into(),
            ParamValue::list(vec![0.0; channels]),
        );
        params.insert(keys::FIRST_SAMPLE_TIMESTAMP.into(), ParamValue::simple(0.0));
        params.insert(
            keys::SAMPLE_TYPE.into(),
            ParamValue::simple(SampleType::Float64.as_param()),
        );

        Ok(Self::from_memory(buffer, params, Vec::new()))
    }

    /// Assemble a recording from in-memory parts.
    pub fn from_memory(buffer: SampleBuffer, params: ParamMap, tags: Vec<Tag>) -> Self {
        Self::from_stores(
            SampleStore::memory(buffer),
            ParameterStore::memory(params),
            TagStore::memory(tags),
        )
    }

    pub fn from_stores(samples: SampleStore, params: ParameterStore, tags: TagStore) -> Self {
        Self {
            samples,
            params,
            tags,
        }
    }

    pub fn sample_store(&self) -> &SampleStore {
        &self.samples
    }

    pub fn parameter_store(&self) -> &ParameterStore {
        &self.params
    }

    pub fn tag_store(&self) -> &TagStore {
        &self.tags
    }

    // --- metadata -------------------------------------------------------

    pub fn param(&self, key: &str) -> Result<&ParamValue> {
        self.params.get(key)
    }

    /// The effective parameter mapping.
    pub fn params(&self) -> ParamMap {
        self.params.get_all()
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: ParamValue) {
        self.params.set(key, value);
    }

    pub fn update_params(&mut self, params: ParamMap) {
        self.params.update(params);
    }

    /// Drop parameter edits made since opening. An in-memory recording has no
    /// persisted values and ends up with none.
    pub fn reset_params(&mut self) {
        self.params.reset();
    }

    pub fn sampling_frequency(&self) -> Result<f64> {
        let frequency = self.params.get_f64(keys::SAMPLING_FREQUENCY)?;
        if frequency.is_finite() && frequency > 0.0 {
            Ok(frequency)
        } else {
            Err(RecordingError::MalformedParameter {
                key: keys::SAMPLING_FREQUENCY.to_string(),
                value: frequency.to_string(),
            })
        }
    }

    pub fn channel_names(&self) -> Result<Vec<String>> {
        Ok(self.params.get_list(keys::CHANNELS_NAMES)?.to_vec())
    }

    pub fn number_of_channels(&self) -> Result<usize> {
        Ok(self.params.get_list(keys::CHANNELS_NAMES)?.len())
    }

    /// Samples per channel actually held by the sample store.
    pub fn number_of_samples(&self) -> Result<usize> {
        self.samples.number_of_samples()
    }

    pub fn first_sample_timestamp(&self) -> Result<f64> {
        self.params.get_f64(keys::FIRST_SAMPLE_TIMESTAMP)
    }

    /// Length of the recording in seconds.
    pub fn duration(&self) -> Result<f64> {
        Ok(self.number_of_samples()? as f64 / self.sampling_frequency()?)
    }

    /// Wall-clock time of the first sample, reading the timestamp as Unix seconds.
    pub fn start_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        let timestamp = self.first_sample_timestamp()?;
        let secs = timestamp.floor();
        let nanos = ((timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
        Ok(DateTime::from_timestamp(secs as i64, nanos))
    }

    /// Convert seconds to a sample count: `round(seconds * fs)`.
    pub fn seconds_to_samples(&self, seconds: f64) -> Result<usize> {
        let samples = (seconds * self.sampling_frequency()?).round();
        if !samples.is_finite() || samples < 0.0 {
            return Err(RecordingError::InvalidArgument(format!(
                "{seconds} s does not map to a sample index"
            )));
        }
        Ok(samples as usize)
    }

    pub fn samples_to_seconds(&self, samples: usize) -> Result<f64> {
        Ok(samples as f64 / self.sampling_frequency()?)
    }

    // --- samples --------------------------------------------------------

    fn to_index(&self, value: Option<f64>, unit: Unit) -> Result<Option<usize>> {
        let Some(value) = value else {
            return Ok(None);
        };
        match unit {
            Unit::Second => self.seconds_to_samples(value).map(Some),
            Unit::Sample if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => {
                Ok(Some(value as usize))
            }
            Unit::Sample => Err(RecordingError::InvalidArgument(format!(
                "{value} is not a sample index"
            ))),
        }
    }

    /// Read a block of samples, all channels.
    pub fn samples(&mut self, range: SampleRange) -> Result<SampleBuffer> {
        let from = self.to_index(range.from, range.unit)?;
        let len = self.to_index(range.len, range.unit)?;
        self.samples.read(from, len)
    }

    /// The whole sample buffer.
    pub fn all_samples(&mut self) -> Result<SampleBuffer> {
        self.samples.read(None, None)
    }

    fn channel_index(&self, name: &str) -> Result<usize> {
        self.params
            .get_list(keys::CHANNELS_NAMES)?
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RecordingError::UnknownChannel(name.to_string()))
    }

    /// Every sample of one channel.
    pub fn channel(&mut self, name: &str) -> Result<Vec<f64>> {
        let index = self.channel_index(name)?;
        let buffer = self.samples.read(None, None)?;
        Ok(buffer.into_rows().swap_remove(index))
    }

    /// Every sample of the named channels, in the order given.
    pub fn channels(&mut self, names: &[&str]) -> Result<SampleBuffer> {
        let indices = names
            .iter()
            .map(|name| self.channel_index(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.samples.read(None, None)?.select(&indices))
    }

    /// One channel converted with its calibration: `value * gain + offset`.
    pub fn calibrated_channel(&mut self, name: &str) -> Result<Vec<f64>> {
        let index = self.channel_index(name)?;
        let gain = calibration(&self.params, keys::CHANNELS_GAINS, index)?;
        let offset = calibration(&self.params, keys::CHANNELS_OFFSETS, index)?;
        Ok(self
            .channel(name)?
            .into_iter()
            .map(|v| v * gain + offset)
            .collect())
    }

    /// Per-sample vectors in time order.
    pub fn iter_samples(&mut self) -> Result<Frames<'_>> {
        self.samples.iterate()
    }

    /// Replace the sample buffer together with its channel names.
    ///
    /// The channel count and sample count parameters are updated with the
    /// buffer. Calibration lists that no longer fit are reset to gain 1,
    /// offset 0.
    pub fn set_samples(&mut self, buffer: SampleBuffer, channel_names: Vec<String>) -> Result<()> {
        check_shape(&buffer, &channel_names)?;

        let channels = channel_names.len();
        let mut update = ParamMap::new();
        update.insert(keys::NUMBER_OF_CHANNELS.into(), ParamValue::simple(channels));
        update.insert(
            keys::NUMBER_OF_SAMPLES.into(),
            ParamValue::simple(buffer.sample_count()),
        );
        for (key, default) in [(keys::CHANNELS_GAINS, 1.0), (keys::CHANNELS_OFFSETS, 0.0)] {
            let fits = self
                .params
                .get_list(key)
                .map(|l| l.len() == channels)
                .unwrap_or(false);
            if !fits {
                update.insert(key.into(), ParamValue::list(vec![default; channels]));
            }
        }
        update.insert(keys::CHANNELS_NAMES.into(), ParamValue::List(channel_names));

        self.samples.write(buffer);
        self.params.update(update);
        Ok(())
    }

    // --- tags -----------------------------------------------------------

    /// Tags matching `query`, in ascending start order.
    pub fn tags(&self, query: &TagQuery<'_>) -> Vec<Tag> {
        self.tags.get_tags(query)
    }

    pub fn all_tags(&self) -> &[Tag] {
        self.tags.all()
    }

    pub fn set_tags(&mut self, tags: Vec<Tag>) {
        self.tags.set_tags(tags);
    }

    // --- persistence ----------------------------------------------------

    /// Write parameters, tags and samples, in that order.
    pub fn save(&mut self, paths: &RecordingPaths) -> Result<()> {
        self.save_with(paths, SaveOptions::default())
    }

    /// Nothing is written when the tags cannot be stored.
    pub fn save_with(&mut self, paths: &RecordingPaths, options: SaveOptions) -> Result<()> {
        if paths.tags.is_some() {
            tagfile::validate(self.tags.all())?;
        }
        let buffer = self.samples.read(None, None)?;
        let declared = raw_format(&self.params, &paths.info).ok();
        let sample_type = options
            .sample_type
            .or(declared.map(|f| f.sample_type))
            .unwrap_or_default();
        let byte_order = options
            .byte_order
            .or(declared.map(|f| f.byte_order))
            .unwrap_or_default();

        let mut params = self.params.get_all();
        params.insert(
            keys::SAMPLE_TYPE.into(),
            ParamValue::simple(sample_type.as_param()),
        );
        params.insert(
            keys::BYTE_ORDER.into(),
            ParamValue::simple(byte_order.as_param()),
        );
        params.insert(
            keys::NUMBER_OF_CHANNELS.into(),
            ParamValue::simple(buffer.channel_count()),
        );
        params.insert(
            keys::NUMBER_OF_SAMPLES.into(),
            ParamValue::simple(buffer.sample_count()),
        );
        let first_sample_timestamp = match params.get(keys::FIRST_SAMPLE_TIMESTAMP) {
            Some(_) => self.first_sample_timestamp()?,
            None => 0.0,
        };

        info::write_file(&paths.info, &params)?;
        if let Some(tags_path) = &paths.tags {
            tagfile::write_file(tags_path, self.tags.all(), first_sample_timestamp)?;
        }
        let format = RawFormat::new(sample_type, byte_order, buffer.channel_count());
        let mut writer = BufWriter::new(File::create(&paths.data)?);
        format.write_to(&mut writer, &buffer)?;
        writer.flush()?;

        tracing::info!(
            "Saved recording to {} ({} samples, {} tags)",
            paths.info.display(),
            buffer.sample_count(),
            self.tags.len()
        );
        Ok(())
    }
}

fn check_shape(buffer: &SampleBuffer, channel_names: &[String]) -> Result<()> {
    if buffer.channel_count() != channel_names.len() {
        return Err(RecordingError::ShapeMismatch {
            rows: buffer.channel_count(),
            names: channel_names.len(),
        });
    }
    let mut seen = HashSet::new();
    if let Some(dup) = channel_names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(RecordingError::InvalidArgument(format!(
            "duplicate channel name {dup:?}"
        )));
    }
    Ok(())
}

fn calibration(params: &ParameterStore, key: &str, index: usize) -> Result<f64> {
    params
        .get_f64_list(key)?
        .get(index)
        .copied()
        .ok_or_else(|| RecordingError::MalformedParameter {
            key: key.to_string(),
            value: format!("no entry for channel {index}"),
        })
}

/// Layout of the samples artifact described by the parameters.
fn raw_format(params: &ParameterStore, origin: &Path) -> Result<RawFormat> {
    let channels = match params.get_list(keys::CHANNELS_NAMES) {
        Ok(names) => names.len(),
        Err(_) => params.get_usize(keys::NUMBER_OF_CHANNELS)?,
    };
    let sample_type = match params.get_str(keys::SAMPLE_TYPE) {
        Ok(value) => SampleType::from_param(value).ok_or_else(|| {
            RecordingError::malformed(origin, format!("unknown sample type {value:?}"))
        })?,
        Err(_) => SampleType::default(),
    };
    let byte_order = match params.get_str(keys::BYTE_ORDER) {
        Ok(value) => ByteOrder::from_param(value).ok_or_else(|| {
            RecordingError::malformed(origin, format!("unknown byte order {value:?}"))
        })?,
        Err(_) => ByteOrder::default(),
    };
    Ok(RawFormat::new(sample_type, byte_order, channels))
}
