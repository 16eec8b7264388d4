//! Headerless binary sample codec.
//!
//! Samples are stored interleaved: every frame holds one value per channel,
//! frames follow each other in time order. The file does not describe itself;
//! channel count, value width and byte order come from the parameters artifact.

use crate::storage::samples::SampleBuffer;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Width of one stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Float32,
    #[default]
    Float64,
}

impl SampleType {
    /// Bytes per stored value.
    pub fn width(self) -> usize {
        match self {
            SampleType::Float32 => 4,
            SampleType::Float64 => 8,
        }
    }

    /// Name used in the parameters artifact.
    pub fn as_param(self) -> &'static str {
        match self {
            SampleType::Float32 => "FLOAT",
            SampleType::Float64 => "DOUBLE",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FLOAT" | "FLOAT32" => Some(SampleType::Float32),
            "DOUBLE" | "FLOAT64" => Some(SampleType::Float64),
            _ => None,
        }
    }
}

/// Byte order of stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn as_param(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "LITTLE_ENDIAN",
            ByteOrder::BigEndian => "BIG_ENDIAN",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LITTLE_ENDIAN" | "LITTLE" => Some(ByteOrder::LittleEndian),
            "BIG_ENDIAN" | "BIG" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }
}

/// Layout of a samples artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFormat {
    pub sample_type: SampleType,
    pub byte_order: ByteOrder,
    pub channels: usize,
}

impl RawFormat {
    pub fn new(sample_type: SampleType, byte_order: ByteOrder, channels: usize) -> Self {
        Self {
            sample_type,
            byte_order,
            channels,
        }
    }

    /// Bytes taken by one frame (one value per channel).
    pub fn frame_bytes(&self) -> usize {
        self.channels * self.sample_type.width()
    }

    /// Number of whole frames in `byte_len` bytes.
    pub fn frames_in(&self, byte_len: u64) -> usize {
        match self.frame_bytes() {
            0 => 0,
            frame => (byte_len / frame as u64) as usize,
        }
    }

    fn decode_value(&self, bytes: &[u8]) -> f64 {
        match (self.sample_type, self.byte_order) {
            (SampleType::Float32, ByteOrder::LittleEndian) => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            (SampleType::Float32, ByteOrder::BigEndian) => {
                f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            (SampleType::Float64, order) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                match order {
                    ByteOrder::LittleEndian => f64::from_le_bytes(raw),
                    ByteOrder::BigEndian => f64::from_be_bytes(raw),
                }
            }
        }
    }

    fn encode_value(&self, value: f64, out: &mut Vec<u8>) {
        match (self.sample_type, self.byte_order) {
            (SampleType::Float32, ByteOrder::LittleEndian) => {
                out.extend_from_slice(&(value as f32).to_le_bytes())
            }
            (SampleType::Float32, ByteOrder::BigEndian) => {
                out.extend_from_slice(&(value as f32).to_be_bytes())
            }
            (SampleType::Float64, ByteOrder::LittleEndian) => {
                out.extend_from_slice(&value.to_le_bytes())
            }
            (SampleType::Float64, ByteOrder::BigEndian) => {
                out.extend_from_slice(&value.to_be_bytes())
            }
        }
    }

    /// Decode whole frames into a channel-major buffer. A trailing partial
    /// frame is ignored.
    pub fn decode(&self, bytes: &[u8]) -> SampleBuffer {
        let width = self.sample_type.width();
        let frames = self.frames_in(bytes.len() as u64);
        let mut rows = vec![Vec::with_capacity(frames); self.channels];

        for frame in bytes.chunks_exact(self.frame_bytes().max(1)).take(frames) {
            for (channel, value) in frame.chunks_exact(width).enumerate() {
                rows[channel].push(self.decode_value(value));
            }
        }

        SampleBuffer::from_rows_unchecked(rows, frames)
    }

    /// Encode a buffer into interleaved frames.
    pub fn encode(&self, buffer: &SampleBuffer) -> Vec<u8> {
        let mut out = Vec::with_capacity(buffer.sample_count() * self.frame_bytes());
        for index in 0..buffer.sample_count() {
            for row in buffer.rows() {
                self.encode_value(row[index], &mut out);
            }
        }
        out
    }

    /// Encode a buffer straight into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W, buffer: &SampleBuffer) -> std::io::Result<()> {
        writer.write_all(&self.encode(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> SampleBuffer {
        SampleBuffer::from_rows(vec![vec![1.0, 2.0, 3.0], vec![-1.5, 0.25, 8.0]])
            .expect("rectangular rows")
    }

    #[test]
    fn test_layout_is_interleaved() {
        let format = RawFormat::new(SampleType::Float32, ByteOrder::LittleEndian, 2);
        let bytes = format.encode(&buffer());
        assert_eq!(bytes.len(), 3 * 2 * 4);
        // second value on disk is channel 1, sample 0
        assert_eq!(f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), -1.5);
    }

    #[test]
    fn test_big_endian_double() {
        let format = RawFormat::new(SampleType::Float64, ByteOrder::BigEndian, 2);
        let bytes = format.encode(&buffer());
        assert_eq!(&bytes[..8], &1.0f64.to_be_bytes());
        assert_eq!(format.decode(&bytes), buffer());
    }

    #[test]
    fn test_partial_frame_ignored() {
        let format = RawFormat::new(SampleType::Float64, ByteOrder::LittleEndian, 2);
        let mut bytes = format.encode(&buffer());
        bytes.extend_from_slice(&[0u8; 5]);
        let decoded = format.decode(&bytes);
        assert_eq!(decoded.sample_count(), 3);
    }

    #[test]
    fn test_param_names() {
        assert_eq!(SampleType::from_param("double"), Some(SampleType::Float64));
        assert_eq!(SampleType::from_param("FLOAT"), Some(SampleType::Float32));
        assert_eq!(SampleType::from_param("INT"), None);
        assert_eq!(
            ByteOrder::from_param(ByteOrder::BigEndian.as_param()),
            Some(ByteOrder::BigEndian)
        );
    }
}
