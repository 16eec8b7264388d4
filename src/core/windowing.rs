//! Turning raw event tags into extraction windows.
//!
//! Two rules are supported: a fixed duration after every start tag, or a
//! window running from a start tag to the next qualifying end tag.

use crate::core::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// End-tag name meaning "the start tag closes its own window".
pub const SELF_MARKER: &str = "self";

/// How tags become windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSpecification {
    /// `[start + start_offset, start + duration + end_offset]` for every start tag.
    Duration {
        start_tag_name: String,
        start_offset: f64,
        end_offset: f64,
        duration: f64,
    },
    /// From a start tag to the next tag named in `end_tag_names`.
    PairedMarkers {
        start_tag_name: String,
        start_offset: f64,
        end_offset: f64,
        end_tag_names: BTreeSet<String>,
    },
}

impl WindowSpecification {
    pub fn duration(start_tag_name: impl Into<String>, duration: f64) -> Self {
        WindowSpecification::Duration {
            start_tag_name: start_tag_name.into(),
            start_offset: 0.0,
            end_offset: 0.0,
            duration,
        }
    }

    pub fn paired<I, S>(start_tag_name: impl Into<String>, end_tag_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WindowSpecification::PairedMarkers {
            start_tag_name: start_tag_name.into(),
            start_offset: 0.0,
            end_offset: 0.0,
            end_tag_names: end_tag_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Shift window starts and ends.
    pub fn with_offsets(mut self, start: f64, end: f64) -> Self {
        match &mut self {
            WindowSpecification::Duration {
                start_offset,
                end_offset,
                ..
            }
            | WindowSpecification::PairedMarkers {
                start_offset,
                end_offset,
                ..
            } => {
                *start_offset = start;
                *end_offset = end;
            }
        }
        self
    }

    pub fn start_tag_name(&self) -> &str {
        match self {
            WindowSpecification::Duration { start_tag_name, .. }
            | WindowSpecification::PairedMarkers { start_tag_name, .. } => start_tag_name,
        }
    }

    /// Build window descriptors from tags given in ascending start order.
    pub fn windows(&self, tags: &[Tag]) -> WindowPlan {
        let mut plan = match self {
            WindowSpecification::Duration {
                start_tag_name,
                start_offset,
                end_offset,
                duration,
            } => {
                let windows = tags
                    .iter()
                    .filter(|t| t.name == *start_tag_name)
                    .map(|t| WindowDescriptor {
                        start_timestamp: t.start_timestamp + start_offset,
                        end_timestamp: t.start_timestamp + duration + end_offset,
                        start_tag: t.clone(),
                        end_tag: None,
                    })
                    .collect();
                WindowPlan {
                    windows,
                    unmatched: 0,
                }
            }
            WindowSpecification::PairedMarkers {
                start_tag_name,
                start_offset,
                end_offset,
                end_tag_names,
            } => pair_markers(tags, start_tag_name, *start_offset, *end_offset, end_tag_names),
        };

        plan.windows
            .sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
        plan
    }
}

/// One window computed from the tag stream.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDescriptor {
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    /// Tag that opened the window
    pub start_tag: Tag,
    /// Tag that closed the window; `None` for duration windows
    pub end_tag: Option<Tag>,
}

impl WindowDescriptor {
    /// Wall-clock length of the window in seconds.
    pub fn duration(&self) -> f64 {
        self.end_timestamp - self.start_timestamp
    }
}

/// Windows in ascending start order plus the number of start tags that were
/// never closed.
#[derive(Debug, Clone, Default)]
pub struct WindowPlan {
    pub windows: Vec<WindowDescriptor>,
    pub unmatched: usize,
}

/// Tag that opened a window still waiting for its end marker.
struct OpenWindow<'a> {
    start_tag: &'a Tag,
}

fn pair_markers(
    tags: &[Tag],
    start_tag_name: &str,
    start_offset: f64,
    end_offset: f64,
    end_tag_names: &BTreeSet<String>,
) -> WindowPlan {
    let closes_itself = end_tag_names.contains(SELF_MARKER);
    let close = |open: &Tag, end: &Tag, end_timestamp: f64| WindowDescriptor {
        start_timestamp: open.start_timestamp + start_offset,
        end_timestamp: end_timestamp + end_offset,
        start_tag: open.clone(),
        end_tag: Some(end.clone()),
    };

    let mut pending: VecDeque<OpenWindow<'_>> = VecDeque::new();
    let mut windows = Vec::new();

    for tag in tags {
        // An end marker closes every window opened before it, oldest first.
        if end_tag_names.contains(&tag.name) {
            while let Some(open) = pending.pop_front() {
                windows.push(close(open.start_tag, tag, tag.start_timestamp));
            }
        }

        if tag.name == start_tag_name {
            if closes_itself {
                windows.push(close(tag, tag, tag.end_timestamp));
            } else {
                pending.push_back(OpenWindow { start_tag: tag });
            }
        }
    }

    if !pending.is_empty() {
        tracing::warn!(
            "Discarding {} unmatched '{}' window(s): no end marker in {:?} followed",
            pending.len(),
            start_tag_name,
            end_tag_names
        );
    }

    WindowPlan {
        windows,
        unmatched: pending.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Vec<Tag> {
        vec![
            Tag::instant("a", 1.0),
            Tag::instant("b", 1.5),
            Tag::instant("stop", 2.0),
        ]
    }

    fn bounds(plan: &WindowPlan) -> Vec<(f64, f64)> {
        plan.windows
            .iter()
            .map(|w| (w.start_timestamp, w.end_timestamp))
            .collect()
    }

    #[test]
    fn test_duration_windows() {
        let spec = WindowSpecification::duration("a", 0.5).with_offsets(-0.1, 0.2);
        let tags = vec![Tag::instant("a", 1.0), Tag::instant("x", 2.0), Tag::instant("a", 3.0)];
        let plan = spec.windows(&tags);
        assert_eq!(plan.windows.len(), 2);
        assert!((plan.windows[0].start_timestamp - 0.9).abs() < 1e-12);
        assert!((plan.windows[0].end_timestamp - 1.7).abs() < 1e-12);
        assert!(plan.windows[1].end_tag.is_none());
        assert_eq!(plan.unmatched, 0);
    }

    #[test]
    fn test_each_start_closes_on_shared_stop() {
        let plan_a = WindowSpecification::paired("a", ["stop"]).windows(&stream());
        assert_eq!(bounds(&plan_a), vec![(1.0, 2.0)]);

        let plan_b = WindowSpecification::paired("b", ["stop"]).windows(&stream());
        assert_eq!(bounds(&plan_b), vec![(1.5, 2.0)]);
        assert_eq!(plan_b.windows[0].end_tag.as_ref().unwrap().name, "stop");
    }

    #[test]
    fn test_all_pending_close_fifo() {
        let tags = vec![
            Tag::instant("go", 1.0),
            Tag::instant("go", 2.0),
            Tag::instant("go", 3.0),
            Tag::instant("end", 4.0),
            Tag::instant("go", 5.0),
            Tag::instant("end", 6.0),
        ];
        let plan = WindowSpecification::paired("go", ["end"]).windows(&tags);
        assert_eq!(
            bounds(&plan),
            vec![(1.0, 4.0), (2.0, 4.0), (3.0, 4.0), (5.0, 6.0)]
        );
    }

    #[test]
    fn test_any_listed_end_name_closes() {
        let tags = vec![
            Tag::instant("go", 1.0),
            Tag::instant("abort", 1.2),
            Tag::instant("go", 2.0),
            Tag::instant("done", 2.5),
        ];
        let plan = WindowSpecification::paired("go", ["done", "abort"]).windows(&tags);
        assert_eq!(bounds(&plan), vec![(1.0, 1.2), (2.0, 2.5)]);
    }

    #[test]
    fn test_unmatched_windows_are_counted() {
        let tags = vec![
            Tag::instant("go", 1.0),
            Tag::instant("end", 2.0),
            Tag::instant("go", 3.0),
            Tag::instant("go", 4.0),
        ];
        let plan = WindowSpecification::paired("go", ["end"]).windows(&tags);
        assert_eq!(plan.windows.len(), 1);
        assert_eq!(plan.unmatched, 2);
    }

    #[test]
    fn test_self_closing_windows() {
        let tags = vec![Tag::new("blink", 1.0, 1.25), Tag::instant("blink", 3.0)];
        let plan = WindowSpecification::paired("blink", [SELF_MARKER])
            .with_offsets(-0.5, 0.5)
            .windows(&tags);
        assert_eq!(bounds(&plan), vec![(0.5, 1.75), (2.5, 3.5)]);
        assert_eq!(plan.unmatched, 0);
    }

    #[test]
    fn test_end_marker_before_start_does_not_close_it() {
        // A tag that is both an end and a start closes the previous windows
        // before opening its own.
        let tags = vec![
            Tag::instant("trial", 1.0),
            Tag::instant("trial", 2.0),
            Tag::instant("trial", 3.0),
        ];
        let plan = WindowSpecification::paired("trial", ["trial"]).windows(&tags);
        assert_eq!(bounds(&plan), vec![(1.0, 2.0), (2.0, 3.0)]);
        assert_eq!(plan.unmatched, 1);
    }

    #[test]
    fn test_windows_sorted_by_start() {
        let tags = vec![
            Tag::instant("go", 1.0),
            Tag::instant("go", 2.0),
            Tag::instant("end", 4.0),
        ];
        let plan = WindowSpecification::paired("go", ["end"])
            .with_offsets(0.0, 0.0)
            .windows(&tags);
        let starts: Vec<f64> = plan.windows.iter().map(|w| w.start_timestamp).collect();
        assert!(starts.windows(2).all(|p| p[0] <= p[1]));
    }
}
