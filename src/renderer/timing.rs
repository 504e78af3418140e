//! Frame-time reporting: the stage readings a technique exposes, printed as
//! a header, a comma-separated row, or labelled lines.

use std::fmt::Write as _;

use super::technique::{Technique, TimedColumn};
use crate::gpu::timer::{GpuStage, TimerReading};

/// Stage readings of one frame, with the technique that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimes {
    technique: Technique,
    readings: [TimerReading; GpuStage::COUNT],
}

impl FrameTimes {
    /// Wrap raw readings for `technique`.
    #[must_use]
    pub fn new(technique: Technique, readings: [TimerReading; GpuStage::COUNT]) -> Self {
        Self {
            technique,
            readings,
        }
    }

    /// Technique the columns belong to.
    #[must_use]
    pub fn technique(&self) -> Technique {
        self.technique
    }

    fn columns(&self) -> &'static [TimedColumn] {
        self.technique.timed_columns()
    }

    /// Milliseconds per column; `None` while a stage is not ready.
    #[must_use]
    pub fn values(&self) -> Vec<Option<f32>> {
        self.columns()
            .iter()
            .map(|c| self.readings[c.stage.index()].millis())
            .collect()
    }

    /// Whether every column has a reading.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.values().iter().all(Option::is_some)
    }

    /// Column names, e.g. `forward, lighting, resolve`.
    #[must_use]
    pub fn header(&self) -> String {
        self.columns()
            .iter()
            .map(|c| c.header)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Values in header order, e.g. `1.20, 0.85, 0.31`. Stages that are
    /// not ready print as `-`.
    #[must_use]
    pub fn csv(&self) -> String {
        self.values()
            .into_iter()
            .map(|v| v.map_or_else(|| "-".to_owned(), |ms| format!("{ms:.2}")))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One `Label: value ms` line per column.
    #[must_use]
    pub fn labelled(&self) -> String {
        let mut out = String::new();
        for (column, value) in self.columns().iter().zip(self.values()) {
            let _ = match value {
                Some(ms) => writeln!(out, "{} {ms:.2} ms", column.label),
                None => writeln!(out, "{} -", column.label),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(technique: Technique) -> FrameTimes {
        FrameTimes::new(
            technique,
            [
                TimerReading::Elapsed(1.2),
                TimerReading::Disjoint,
                TimerReading::Elapsed(0.5),
            ],
        )
    }

    #[test]
    fn header_and_values_have_equal_columns() {
        for technique in Technique::ALL {
            let t = times(technique);
            assert_eq!(
                t.header().split(", ").count(),
                t.csv().split(", ").count(),
                "{technique}"
            );
            assert_eq!(t.labelled().lines().count(), t.values().len());
        }
    }

    #[test]
    fn streaming_reports_lighting_and_resolve_together() {
        let t = times(Technique::StreamingSbaa);
        assert_eq!(t.header(), "forward, lighting + resolve");
        assert_eq!(t.csv(), "1.20, 0.50");
        assert_eq!(t.labelled(), "Forward: 1.20 ms\nLighting + resolve: 0.50 ms\n");
    }

    #[test]
    fn disjoint_reads_zero_and_pending_reads_dash() {
        let t = times(Technique::DeferredNoCull);
        assert_eq!(t.header(), "forward, lighting, resolve");
        assert_eq!(t.csv(), "1.20, 0.00, 0.50");
        assert!(t.is_ready());

        let pending = FrameTimes::new(Technique::ForwardNoCull, [TimerReading::NotReady; 3]);
        assert_eq!(pending.header(), "forward, resolve");
        assert_eq!(pending.csv(), "-, -");
        assert!(!pending.is_ready());
    }
}
