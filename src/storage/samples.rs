//! Sample storage: an in-memory buffer or a file that is read on demand.

use crate::error::{RecordingError, Result};
use crate::format::raw::RawFormat;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Channel-major block of samples: one row per channel, all rows equally long.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBuffer {
    rows: Vec<Vec<f64>>,
    samples: usize,
}

impl SampleBuffer {
    /// Build a buffer from channel rows. Rows of different lengths are rejected.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let samples = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != samples) {
            return Err(RecordingError::InvalidArgument(format!(
                "channel row of {} samples, expected {samples}",
                bad.len()
            )));
        }
        Ok(Self { rows, samples })
    }

    pub(crate) fn from_rows_unchecked(rows: Vec<Vec<f64>>, samples: usize) -> Self {
        Self { rows, samples }
    }

    /// A zero-filled buffer.
    pub fn zeros(channels: usize, samples: usize) -> Self {
        Self {
            rows: vec![vec![0.0; samples]; channels],
            samples,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.rows.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// All samples of one channel.
    pub fn row(&self, channel: usize) -> Option<&[f64]> {
        self.rows.get(channel).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }

    /// Values of every channel at one sample index.
    pub fn frame(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.samples {
            return None;
        }
        Some(self.rows.iter().map(|r| r[index]).collect())
    }

    /// Copy out `len` samples starting at `from`.
    pub fn slice(&self, from: usize, len: usize) -> Result<SampleBuffer> {
        let end = window_end(from, len, self.samples)?;
        let rows = self.rows.iter().map(|r| r[from..end].to_vec()).collect();
        Ok(Self { rows, samples: len })
    }

    /// Keep only the given channel rows, in the given order.
    pub fn select(&self, channels: &[usize]) -> SampleBuffer {
        let rows = channels
            .iter()
            .filter_map(|&c| self.rows.get(c).cloned())
            .collect();
        Self {
            rows,
            samples: self.samples,
        }
    }

    /// Iterate per-sample vectors in time order.
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            buffer: self,
            index: 0,
        }
    }
}

/// Lazy per-sample iterator over a buffer.
pub struct Frames<'a> {
    buffer: &'a SampleBuffer,
    index: usize,
}

impl Iterator for Frames<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.buffer.frame(self.index)?;
        self.index += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.buffer.sample_count().saturating_sub(self.index);
        (left, Some(left))
    }
}

fn exhausted(len: usize, total: usize, from: usize) -> RecordingError {
    RecordingError::StreamExhausted {
        requested: len,
        available: total.saturating_sub(from),
    }
}

/// End index of `len` samples from `from`, if it lies within `total`.
fn window_end(from: usize, len: usize, total: usize) -> Result<usize> {
    from.checked_add(len)
        .filter(|&end| end <= total)
        .ok_or_else(|| exhausted(len, total, from))
}

/// Whether a file-backed store has been promoted into memory.
#[derive(Debug)]
pub enum CacheState {
    /// Reads go to the file.
    FileBacked,
    /// The whole file has been loaded; reads are served from memory.
    Cached(SampleBuffer),
}

/// Sample store reading an interleaved samples artifact.
#[derive(Debug)]
pub struct FileSamples {
    path: PathBuf,
    format: RawFormat,
    file: File,
    state: CacheState,
}

impl FileSamples {
    /// Open a samples artifact. Nothing is read until the first request.
    pub fn open(path: impl AsRef<Path>, format: RawFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            format,
            file,
            state: CacheState::FileBacked,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.state, CacheState::Cached(_))
    }

    pub fn number_of_samples(&self) -> Result<usize> {
        match &self.state {
            CacheState::Cached(buffer) => Ok(buffer.sample_count()),
            CacheState::FileBacked => {
                let len = self.file.metadata()?.len();
                Ok(self.format.frames_in(len))
            }
        }
    }

    /// Load the whole file into memory. Idempotent.
    fn promote(&mut self) -> Result<&SampleBuffer> {
        if let CacheState::FileBacked = self.state {
            let mut bytes = Vec::new();
            self.file.seek(SeekFrom::Start(0))?;
            self.file.read_to_end(&mut bytes)?;
            let buffer = self.format.decode(&bytes);
            tracing::debug!(
                "Promoted {} into memory ({} samples x {} channels)",
                self.path.display(),
                buffer.sample_count(),
                buffer.channel_count()
            );
            self.state = CacheState::Cached(buffer);
        }
        match &self.state {
            CacheState::Cached(buffer) => Ok(buffer),
            CacheState::FileBacked => unreachable!("promotion always caches"),
        }
    }

    fn read_window(&mut self, from: usize, len: usize) -> Result<SampleBuffer> {
        let total = self.number_of_samples()?;
        window_end(from, len, total)?;

        let frame = self.format.frame_bytes();
        let offset = (from as u64)
            .checked_mul(frame as u64)
            .ok_or_else(|| exhausted(len, total, from))?;
        let size = len
            .checked_mul(frame)
            .ok_or_else(|| exhausted(len, total, from))?;
        let mut bytes = vec![0u8; size];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut bytes).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RecordingError::StreamExhausted {
                requested: len,
                available: 0,
            },
            _ => RecordingError::Io(e),
        })?;

        let mut buffer = self.format.decode(&bytes);
        if buffer.channel_count() == 0 {
            buffer.samples = len;
        }
        Ok(buffer)
    }
}

/// Storage for the sample buffer of one recording.
#[derive(Debug)]
pub enum SampleStore {
    Memory(SampleBuffer),
    File(FileSamples),
}

impl SampleStore {
    pub fn memory(buffer: SampleBuffer) -> Self {
        SampleStore::Memory(buffer)
    }

    pub fn open(path: impl AsRef<Path>, format: RawFormat) -> Result<Self> {
        Ok(SampleStore::File(FileSamples::open(path, format)?))
    }

    pub fn number_of_samples(&self) -> Result<usize> {
        match self {
            SampleStore::Memory(buffer) => Ok(buffer.sample_count()),
            SampleStore::File(file) => file.number_of_samples(),
        }
    }

    pub fn number_of_channels(&self) -> usize {
        match self {
            SampleStore::Memory(buffer) => buffer.channel_count(),
            SampleStore::File(file) => match &file.state {
                CacheState::Cached(buffer) => buffer.channel_count(),
                CacheState::FileBacked => file.format.channels,
            },
        }
    }

    /// Read samples.
    ///
    /// With neither bound the whole buffer is returned, promoting a
    /// file-backed store into memory. A missing `from` means 0, a missing
    /// `len` means "to the end". A window past the end fails with
    /// [`RecordingError::StreamExhausted`].
    pub fn read(&mut self, from: Option<usize>, len: Option<usize>) -> Result<SampleBuffer> {
        if from.is_none() && len.is_none() {
            return match self {
                SampleStore::Memory(buffer) => Ok(buffer.clone()),
                SampleStore::File(file) => file.promote().cloned(),
            };
        }

        let from = from.unwrap_or(0);
        let total = self.number_of_samples()?;
        let len = match len {
            Some(len) => len,
            None if from <= total => total - from,
            None => {
                return Err(RecordingError::StreamExhausted {
                    requested: from - total,
                    available: 0,
                })
            }
        };

        match self {
            SampleStore::Memory(buffer) => buffer.slice(from, len),
            SampleStore::File(file) => {
                if let CacheState::Cached(buffer) = &file.state {
                    return buffer.slice(from, len);
                }
                file.read_window(from, len)
            }
        }
    }

    /// Replace the buffer. A promoted cache is updated in place; otherwise
    /// the store becomes memory-backed.
    pub fn write(&mut self, buffer: SampleBuffer) {
        if let SampleStore::File(file) = self {
            if let CacheState::Cached(cache) = &mut file.state {
                *cache = buffer;
                return;
            }
        }
        *self = SampleStore::Memory(buffer);
    }

    /// Replace the buffer with a copy of `buffer`.
    pub fn write_copy(&mut self, buffer: &SampleBuffer) {
        self.write(buffer.clone());
    }

    /// Iterate per-sample vectors. A file-backed store is promoted first.
    pub fn iterate(&mut self) -> Result<Frames<'_>> {
        match self {
            SampleStore::Memory(buffer) => Ok(buffer.frames()),
            SampleStore::File(file) => Ok(file.promote()?.frames()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::raw::{ByteOrder, SampleType};
    use std::io::Write;

    fn ramp(channels: usize, samples: usize) -> SampleBuffer {
        let rows = (0..channels)
            .map(|c| (0..samples).map(|s| (c * 1000 + s) as f64).collect())
            .collect();
        SampleBuffer::from_rows(rows).unwrap()
    }

    fn file_store(buffer: &SampleBuffer) -> (tempfile::NamedTempFile, SampleStore) {
        let format = RawFormat::new(
            SampleType::Float64,
            ByteOrder::LittleEndian,
            buffer.channel_count(),
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&format.encode(buffer)).unwrap();
        file.flush().unwrap();
        let store = SampleStore::open(file.path(), format).unwrap();
        (file, store)
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(SampleBuffer::from_rows(vec![vec![1.0, 2.0], vec![1.0]]).is_err());
    }

    #[test]
    fn test_memory_bounded_reads() {
        let mut store = SampleStore::memory(ramp(2, 1000));
        let window = store.read(Some(900), Some(100)).unwrap();
        assert_eq!(window.sample_count(), 100);
        assert_eq!(window.channel_count(), 2);
        assert_eq!(window.row(1).unwrap()[0], 1900.0);

        let err = store.read(Some(950), Some(100)).unwrap_err();
        assert!(err.is_stream_exhausted());
    }

    #[test]
    fn test_open_ended_reads() {
        let mut store = SampleStore::memory(ramp(1, 10));
        assert_eq!(store.read(Some(7), None).unwrap().sample_count(), 3);
        assert_eq!(store.read(None, Some(4)).unwrap().row(0).unwrap(), &[0.0, 1.0, 2.0, 3.0]);
        assert!(store.read(Some(11), None).unwrap_err().is_stream_exhausted());
    }

    #[test]
    fn test_file_window_read_without_promotion() {
        let buffer = ramp(3, 50);
        let (_file, mut store) = file_store(&buffer);

        let window = store.read(Some(10), Some(5)).unwrap();
        assert_eq!(window, buffer.slice(10, 5).unwrap());
        match &store {
            SampleStore::File(file) => assert!(!file.is_cached()),
            SampleStore::Memory(_) => panic!("store should stay file-backed"),
        }
        assert!(store.read(Some(48), Some(5)).unwrap_err().is_stream_exhausted());
    }

    #[test]
    fn test_full_read_promotes_once() {
        let buffer = ramp(2, 20);
        let (_file, mut store) = file_store(&buffer);

        let before = store.read(Some(3), Some(4)).unwrap();
        assert_eq!(store.read(None, None).unwrap(), buffer);
        match &store {
            SampleStore::File(file) => assert!(file.is_cached()),
            SampleStore::Memory(_) => panic!("store should stay file-backed"),
        }
        assert_eq!(store.read(Some(3), Some(4)).unwrap(), before);
        assert_eq!(store.number_of_samples().unwrap(), 20);
    }

    #[test]
    fn test_write_updates_cache_in_place() {
        let (_file, mut store) = file_store(&ramp(2, 20));
        store.read(None, None).unwrap();
        store.write(ramp(2, 5));
        assert!(matches!(store, SampleStore::File(_)));
        assert_eq!(store.number_of_samples().unwrap(), 5);
    }

    #[test]
    fn test_write_without_cache_switches_to_memory() {
        let (_file, mut store) = file_store(&ramp(2, 20));
        let replacement = ramp(1, 3);
        store.write_copy(&replacement);
        assert!(matches!(store, SampleStore::Memory(_)));
        assert_eq!(store.read(None, None).unwrap(), replacement);
    }

    #[test]
    fn test_huge_positions_are_exhausted() {
        let mut store = SampleStore::memory(ramp(2, 10));
        assert!(store.read(Some(usize::MAX), Some(1)).unwrap_err().is_stream_exhausted());
        assert!(store.read(Some(1), Some(usize::MAX)).unwrap_err().is_stream_exhausted());

        let (_file, mut store) = file_store(&ramp(2, 10));
        assert!(store.read(Some(usize::MAX), Some(1)).unwrap_err().is_stream_exhausted());
        assert!(store.read(Some(5), Some(usize::MAX)).unwrap_err().is_stream_exhausted());
    }

    #[test]
    fn test_iterate_frames() {
        let mut store = SampleStore::memory(ramp(2, 3));
        let frames: Vec<Vec<f64>> = store.iterate().unwrap().collect();
        assert_eq!(frames, vec![vec![0.0, 1000.0], vec![1.0, 1001.0], vec![2.0, 1002.0]]);
    }
}
