//! Pipeline progress reporting.

use serde::{Deserialize, Serialize};

/// Progress of a pipeline run.
///
/// A camera stream has no total frame count, so its progress is
/// `Indeterminate` rather than a fraction. Indeterminate is deliberately
/// distinct from `Fraction(0.0)`: zero means "known total, nothing done
/// yet", indeterminate means "total unknowable".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Progress {
    /// Fraction of frames processed, in [0.0, 1.0]
    Fraction(f64),
    /// Total frame count unknown (live camera)
    Indeterminate,
}

impl Progress {
    /// The fraction if known.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Progress::Fraction(f) => Some(*f),
            Progress::Indeterminate => None,
        }
    }

    /// Whether the run is known to be finished.
    pub fn is_complete(&self) -> bool {
        matches!(self, Progress::Fraction(f) if *f >= 1.0)
    }
}

/// Tracks frames processed against an optional total.
///
/// Mutated only by the pipeline controller. The reported fraction never
/// exceeds 1.0 and never decreases within a run, even if the container's
/// advertised frame count turns out to be an underestimate.
#[derive(Debug, Clone)]
pub struct ProgressState {
    processed: u64,
    total: Option<u64>,
    last_fraction: f64,
}

impl ProgressState {
    /// Create a tracker. `total` is `None` for unbounded sources.
    pub fn new(total: Option<u64>) -> Self {
        Self {
            processed: 0,
            // A zero total would make every fraction undefined; treat it
            // as unknown.
            total: total.filter(|t| *t > 0),
            last_fraction: 0.0,
        }
    }

    /// Current progress without mutating.
    pub fn current(&self) -> Progress {
        match self.total {
            Some(_) => Progress::Fraction(self.last_fraction),
            None => Progress::Indeterminate,
        }
    }

    /// Record one processed frame and return the updated progress.
    ///
    /// Keeps the high-water mark so the fraction is monotonically
    /// non-decreasing.
    pub fn advance(&mut self) -> Progress {
        self.processed += 1;
        if let Some(total) = self.total {
            let fraction = (self.processed as f64 / total as f64).min(1.0);
            if fraction > self.last_fraction {
                self.last_fraction = fraction;
            }
            Progress::Fraction(self.last_fraction)
        } else {
            Progress::Indeterminate
        }
    }

    /// Frames processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Total frames if known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_progress() {
        let mut state = ProgressState::new(Some(4));
        assert_eq!(state.advance(), Progress::Fraction(0.25));
        assert_eq!(state.advance(), Progress::Fraction(0.5));
        assert_eq!(state.advance(), Progress::Fraction(0.75));
        let done = state.advance();
        assert_eq!(done, Progress::Fraction(1.0));
        assert!(done.is_complete());
    }

    #[test]
    fn test_progress_never_exceeds_one() {
        // Container advertised 2 frames but actually decodes 4.
        let mut state = ProgressState::new(Some(2));
        for _ in 0..4 {
            state.advance();
        }
        assert_eq!(state.current(), Progress::Fraction(1.0));
        assert_eq!(state.processed(), 4);
    }

    #[test]
    fn test_indeterminate_for_unknown_total() {
        let mut state = ProgressState::new(None);
        assert_eq!(state.advance(), Progress::Indeterminate);
        assert_eq!(state.current().fraction(), None);
        assert!(!state.current().is_complete());
    }

    #[test]
    fn test_zero_total_treated_as_unknown() {
        let state = ProgressState::new(Some(0));
        assert_eq!(state.current(), Progress::Indeterminate);
    }

    #[test]
    fn test_indeterminate_distinct_from_zero() {
        assert_ne!(Progress::Indeterminate, Progress::Fraction(0.0));
    }

    #[test]
    fn test_progress_wire_format() {
        assert_eq!(
            serde_json::to_string(&Progress::Fraction(0.5)).unwrap(),
            r#"{"kind":"fraction","value":0.5}"#
        );
        assert_eq!(
            serde_json::to_string(&Progress::Indeterminate).unwrap(),
            r#"{"kind":"indeterminate"}"#
        );
    }
}
