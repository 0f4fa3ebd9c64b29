//! Segment classification

use serde::{Deserialize, Serialize};

use crate::program::Segment;

/// How a segment is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    /// Heat along a trajectory until the target is reached
    RampingUp,
    /// Cool along a trajectory until the target is reached
    RampingDown,
    /// Hold the target for the segment duration
    Maintaining,
}

impl SegmentKind {
    /// Classify a segment whose target is compared with `reference`: the
    /// measured temperature for the first segment, the previous segment's
    /// target for every later one.
    pub fn classify(reference: f64, target: f64) -> Self {
        if target > reference {
            SegmentKind::RampingUp
        } else if target < reference {
            SegmentKind::RampingDown
        } else {
            SegmentKind::Maintaining
        }
    }

    /// Whether the segment follows a trajectory
    pub fn is_ramp(self) -> bool {
        !matches!(self, SegmentKind::Maintaining)
    }

    /// Whether a ramp is over at `measured`. Holds end on time, never here.
    pub fn target_reached(self, measured: f64, target: f64) -> bool {
        match self {
            SegmentKind::RampingUp => measured >= target,
            SegmentKind::RampingDown => measured <= target,
            SegmentKind::Maintaining => false,
        }
    }
}

/// Index to restart an interrupted run from, given the segment it was in.
///
/// A segment that climbs above its predecessor can be restarted directly.
/// Anything else (a hold or a descent) depends on the temperature reached by
/// the previous segment, so that segment is run again. The first segment is
/// compared against 0 °C.
pub fn resume_index(points: &[Segment], index: usize) -> usize {
    let previous_target = index
        .checked_sub(1)
        .and_then(|i| points.get(i))
        .map_or(0.0, |s| s.target_temperature);

    match points.get(index) {
        Some(segment) if segment.target_temperature > previous_target => index,
        _ => index.saturating_sub(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(SegmentKind::classify(25.0, 200.0), SegmentKind::RampingUp);
        assert_eq!(SegmentKind::classify(200.0, 200.0), SegmentKind::Maintaining);
        assert_eq!(SegmentKind::classify(900.0, 600.0), SegmentKind::RampingDown);
        assert!(SegmentKind::RampingDown.is_ramp());
        assert!(!SegmentKind::Maintaining.is_ramp());
    }

    #[test]
    fn test_target_reached() {
        assert!(!SegmentKind::RampingUp.target_reached(199.9, 200.0));
        assert!(SegmentKind::RampingUp.target_reached(200.0, 200.0));
        assert!(SegmentKind::RampingDown.target_reached(600.0, 600.0));
        assert!(!SegmentKind::RampingDown.target_reached(600.1, 600.0));
        assert!(!SegmentKind::Maintaining.target_reached(1e9, 0.0));
    }

    #[test]
    fn test_resume_index() {
        let points = vec![
            Segment::new("heat", 600.0, 60.0),
            Segment::new("soak", 600.0, 30.0),
            Segment::new("fire", 1000.0, 120.0),
            Segment::new("cool", 700.0, 60.0),
        ];
        assert_eq!(resume_index(&points, 0), 0);
        assert_eq!(resume_index(&points, 1), 0);
        assert_eq!(resume_index(&points, 2), 2);
        assert_eq!(resume_index(&points, 3), 2);
    }

    #[test]
    fn test_resume_index_first_segment_not_above_zero() {
        let points = vec![Segment::new("chill", -10.0, 10.0)];
        assert_eq!(resume_index(&points, 0), 0);
    }
}
