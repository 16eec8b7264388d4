//! Lazy extraction of smart tags: sub-recordings cut out of a recording
//! along windows computed from its tags.
//!
//! Windows are materialised one at a time, in ascending start order, the
//! first time they are pulled. Each materialised window owns in-memory
//! copies of the samples, tags and parameters that fall inside it.

use crate::core::recording::{Recording, SampleRange};
use crate::core::tag::{Tag, TagQuery};
use crate::core::windowing::{WindowDescriptor, WindowSpecification};
use crate::error::Result;
use crate::format::keys;
use crate::storage::{ParamMap, ParamValue};

/// A window materialised into its own recording.
#[derive(Debug)]
pub struct SmartTag {
    descriptor: WindowDescriptor,
    first_sample: usize,
    recording: Recording,
}

impl SmartTag {
    pub fn descriptor(&self) -> &WindowDescriptor {
        &self.descriptor
    }

    pub fn start_tag(&self) -> &Tag {
        &self.descriptor.start_tag
    }

    pub fn end_tag(&self) -> Option<&Tag> {
        self.descriptor.end_tag.as_ref()
    }

    pub fn start_timestamp(&self) -> f64 {
        self.descriptor.start_timestamp
    }

    pub fn end_timestamp(&self) -> f64 {
        self.descriptor.end_timestamp
    }

    /// Index of the window's first sample in the source recording.
    pub fn first_sample(&self) -> usize {
        self.first_sample
    }

    /// Samples per channel in the window.
    pub fn sample_count(&self) -> usize {
        self.recording.number_of_samples().unwrap_or(0)
    }

    /// Source sample range covered by the window, end exclusive.
    pub fn sample_range(&self) -> std::ops::Range<usize> {
        self.first_sample..self.first_sample + self.sample_count()
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn recording_mut(&mut self) -> &mut Recording {
        &mut self.recording
    }

    pub fn into_recording(self) -> Recording {
        self.recording
    }
}

/// Result of pulling the next window.
#[derive(Debug)]
pub enum Step<'a> {
    /// The next window, in ascending start order.
    Item(&'a SmartTag),
    /// Every planned window has been produced or skipped.
    Done,
    /// The sample stream ran out; this many planned windows were dropped.
    Exhausted(usize),
}

/// Counters describing one extraction session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Windows computed from the tags
    pub windows_planned: usize,
    /// Windows turned into smart tags so far
    pub windows_materialized: usize,
    /// Start tags that never met an end marker
    pub unmatched_start_tags: usize,
    /// Windows starting before the first sample
    pub dropped_before_start: usize,
    /// Windows dropped because the sample stream ran out
    pub dropped_exhausted: usize,
}

impl ExtractionReport {
    pub fn summary(&self) -> String {
        format!(
            "Extraction Statistics:\n\
             - Windows planned: {}\n\
             - Windows materialized: {}\n\
             - Unmatched start tags: {}\n\
             - Dropped (before first sample): {}\n\
             - Dropped (stream exhausted): {}",
            self.windows_planned,
            self.windows_materialized,
            self.unmatched_start_tags,
            self.dropped_before_start,
            self.dropped_exhausted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Done,
    Exhausted { dropped: usize },
}

/// Pull-based extractor over one recording and one window specification.
///
/// Single pass: once exhausted or done it stays so. Build a new extractor
/// to start over.
pub struct SegmentExtractor<'r> {
    source: &'r mut Recording,
    specification: WindowSpecification,
    descriptors: Vec<WindowDescriptor>,
    next_descriptor: usize,
    produced: Vec<SmartTag>,
    cursor: usize,
    phase: Phase,
    /// Wall-clock duration and resolved sample length of the last window
    previous: Option<(f64, usize)>,
    sampling_frequency: f64,
    first_sample_timestamp: f64,
    params: ParamMap,
    report: ExtractionReport,
}

impl<'r> SegmentExtractor<'r> {
    /// Plan the windows. No samples are read until the first pull.
    pub fn new(source: &'r mut Recording, specification: WindowSpecification) -> Result<Self> {
        let sampling_frequency = source.sampling_frequency()?;
        let first_sample_timestamp = source.first_sample_timestamp()?;
        let params = source.params();
        let plan = specification.windows(source.all_tags());

        tracing::debug!(
            "Planned {} window(s) for start tag '{}'",
            plan.windows.len(),
            specification.start_tag_name()
        );

        let report = ExtractionReport {
            windows_planned: plan.windows.len(),
            unmatched_start_tags: plan.unmatched,
            ..ExtractionReport::default()
        };

        Ok(Self {
            source,
            specification,
            descriptors: plan.windows,
            next_descriptor: 0,
            produced: Vec::new(),
            cursor: 0,
            phase: Phase::Active,
            previous: None,
            sampling_frequency,
            first_sample_timestamp,
            params,
            report,
        })
    }

    pub fn specification(&self) -> &WindowSpecification {
        &self.specification
    }

    /// Number of planned windows.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Planned windows in ascending start order.
    pub fn descriptors(&self) -> &[WindowDescriptor] {
        &self.descriptors
    }

    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }

    /// Pull the next window, materialising it if needed.
    pub fn next_window(&mut self) -> Result<Step<'_>> {
        match self.advance()? {
            Some(index) => Ok(Step::Item(&self.produced[index])),
            None => Ok(match self.phase {
                Phase::Exhausted { dropped } => Step::Exhausted(dropped),
                Phase::Active | Phase::Done => Step::Done,
            }),
        }
    }

    /// The `index`-th produced window, materialising windows up to it.
    /// Does not move the pull cursor.
    pub fn get(&mut self, index: usize) -> Result<Option<&SmartTag>> {
        while self.produced.len() <= index && self.phase == Phase::Active {
            self.step()?;
        }
        Ok(self.produced.get(index))
    }

    /// Materialise every remaining window.
    pub fn collect_all(mut self) -> Result<(Vec<SmartTag>, ExtractionReport)> {
        while self.phase == Phase::Active {
            self.step()?;
        }
        Ok((self.produced, self.report))
    }

    fn advance(&mut self) -> Result<Option<usize>> {
        loop {
            if self.cursor < self.produced.len() {
                self.cursor += 1;
                return Ok(Some(self.cursor - 1));
            }
            if self.phase != Phase::Active {
                return Ok(None);
            }
            self.step()?;
        }
    }

    /// Process the next planned window, or finish.
    fn step(&mut self) -> Result<()> {
        if self.next_descriptor >= self.descriptors.len() {
            self.phase = Phase::Done;
            return Ok(());
        }
        let index = self.next_descriptor;
        self.next_descriptor += 1;

        match self.materialize(index) {
            Ok(Some(tag)) => {
                self.produced.push(tag);
                self.report.windows_materialized += 1;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) if e.is_stream_exhausted() => {
                let dropped = self.descriptors.len() - index;
                tracing::warn!(
                    "Sample stream exhausted at window {}; dropping {} remaining window(s)",
                    index,
                    dropped
                );
                self.report.dropped_exhausted = dropped;
                self.next_descriptor = self.descriptors.len();
                self.phase = Phase::Exhausted { dropped };
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn to_samples(&self, timestamp: f64) -> f64 {
        ((timestamp - self.first_sample_timestamp) * self.sampling_frequency).round()
    }

    fn materialize(&mut self, index: usize) -> Result<Option<SmartTag>> {
        let descriptor = self.descriptors[index].clone();
        let start = descriptor.start_timestamp;
        let end = descriptor.end_timestamp;

        let samples_to_start = self.to_samples(start);
        if samples_to_start < 0.0 {
            tracing::warn!(
                "Skipping window at {:.3}s: starts before the first sample",
                start
            );
            self.report.dropped_before_start += 1;
            return Ok(None);
        }
        let first_sample = samples_to_start as usize;
        // Both ends are rounded on the sample grid anchored at the first
        // sample, so a window ending at a timestamp and one starting there
        // meet at the same index even when first_ts is off-grid.
        let naive_len = (self.to_samples(end) - samples_to_start).max(0.0) as usize;

        // Windows of (nearly) the same wall-clock length get the same number
        // of samples, whatever the rounding of their endpoints.
        let duration = end - start;
        let length = match self.previous {
            Some((previous_duration, previous_len))
                if (duration - previous_duration).abs() < 1.0 / self.sampling_frequency =>
            {
                previous_len
            }
            _ => naive_len,
        };

        let buffer = self
            .source
            .samples(SampleRange::samples(first_sample, length))?;
        self.previous = Some((duration, length));

        let in_window = |t: &Tag| t.start_timestamp >= start && t.start_timestamp < end;
        let tags = self.source.tags(&TagQuery::all().filter(&in_window));

        let mut params = self.params.clone();
        params.insert(keys::NUMBER_OF_SAMPLES.into(), ParamValue::simple(length));
        params.insert(
            keys::FIRST_SAMPLE_TIMESTAMP.into(),
            ParamValue::simple(
                self.first_sample_timestamp + first_sample as f64 / self.sampling_frequency,
            ),
        );

        tracing::debug!(
            "Materialized window {} [{:.3}s, {:.3}s): samples {}..{}",
            index,
            start,
            end,
            first_sample,
            first_sample + length
        );

        Ok(Some(SmartTag {
            descriptor,
            first_sample,
            recording: Recording::from_memory(buffer, params, tags),
        }))
    }
}

impl Recording {
    /// Start a lazy smart-tag extraction over this recording.
    pub fn smart_tags(
        &mut self,
        specification: WindowSpecification,
    ) -> Result<SegmentExtractor<'_>> {
        SegmentExtractor::new(self, specification)
    }
}
