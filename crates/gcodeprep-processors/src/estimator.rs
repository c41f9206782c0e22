//! Straight-line print time estimation
//!
//! A [`MotionEstimator`] is an explicit accumulator threaded through a single
//! scan of the file: it tracks the position, feed rate and distance mode and
//! adds `distance / feedrate` minutes for every linear move. There is no
//! acceleration model, so the result is a lower bound that is only meant for
//! comparing intervals within one file.

use gcodeprep_core::gcode::patterns::{self, DistanceMode, MotionCommand};
use gcodeprep_core::gcode::SourceLine;

/// Default feed rate in mm/min used until the file sets one
pub const DEFAULT_FEEDRATE: f64 = 3000.0;

/// One straight move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveSegment {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Feed rate in distance per minute
    pub feedrate: f64,
}

impl MoveSegment {
    /// Euclidean length of the move
    pub fn distance(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy + self.dz * self.dz).sqrt()
    }

    /// Duration of the move in minutes; zero for a non-positive feed rate
    pub fn minutes(&self) -> f64 {
        if self.feedrate > 0.0 {
            self.distance() / self.feedrate
        } else {
            0.0
        }
    }
}

/// Running position/feed rate accumulator
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    position: [f64; 3],
    feedrate: f64,
    mode: DistanceMode,
    include_dwell: bool,
    elapsed: f64,
}

impl MotionEstimator {
    /// Start at the origin with the given feed rate
    pub fn new(initial_feedrate: f64) -> Self {
        Self {
            position: [0.0; 3],
            feedrate: initial_feedrate,
            mode: DistanceMode::Absolute,
            include_dwell: false,
            elapsed: 0.0,
        }
    }

    /// Count `G4` dwell time as well as motion
    pub fn with_dwell(mut self, include_dwell: bool) -> Self {
        self.include_dwell = include_dwell;
        self
    }

    /// Total estimated minutes so far
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    pub fn feedrate(&self) -> f64 {
        self.feedrate
    }

    /// Turn a motion command into a segment and move the tracked position
    pub fn apply(&mut self, command: &MotionCommand) -> MoveSegment {
        if let Some(f) = command.feedrate {
            self.feedrate = f;
        }

        let mut delta = [0.0; 3];
        for (axis, word) in [command.x, command.y, command.z].into_iter().enumerate() {
            let Some(value) = word else {
                continue;
            };
            let target = match self.mode {
                DistanceMode::Absolute => value,
                DistanceMode::Relative => self.position[axis] + value,
            };
            delta[axis] = target - self.position[axis];
            self.position[axis] = target;
        }

        MoveSegment {
            dx: delta[0],
            dy: delta[1],
            dz: delta[2],
            feedrate: self.feedrate,
        }
    }

    /// Account for one line and return the minutes it added
    pub fn advance(&mut self, line: &str) -> f64 {
        if let Some(mode) = patterns::parse_distance_mode(line) {
            self.mode = mode;
        }

        let minutes = if let Some(command) = patterns::parse_motion(line) {
            self.apply(&command).minutes()
        } else if self.include_dwell {
            patterns::parse_dwell_minutes(line).unwrap_or(0.0)
        } else {
            0.0
        };

        self.elapsed += minutes;
        minutes
    }

    /// Elapsed minutes before each line, plus the total as the last entry
    ///
    /// The returned vector has `lines.len() + 1` entries, so the time spent
    /// between the start of line `a` and the start of line `b` is
    /// `times[b] - times[a]`.
    pub fn timeline(mut self, lines: &[SourceLine]) -> Vec<f64> {
        let mut times = Vec::with_capacity(lines.len() + 1);
        times.push(self.elapsed);
        for line in lines {
            self.advance(&line.text);
            times.push(self.elapsed);
        }
        times
    }
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDRATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeprep_core::gcode::line::split_lines;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_absent_axes_keep_position() {
        let mut est = MotionEstimator::new(3000.0);
        est.advance("G1 X30 Y40 F3000");
        // 50mm at 3000mm/min
        assert!(close(est.elapsed(), 50.0 / 3000.0));

        let added = est.advance("G1 Z10");
        assert!(close(added, 10.0 / 3000.0));
        assert_eq!(est.position(), [30.0, 40.0, 10.0]);
    }

    #[test]
    fn test_feedrate_persists() {
        let mut est = MotionEstimator::new(1000.0);
        est.advance("G1 X100");
        assert!(close(est.elapsed(), 0.1));
        est.advance("G1 X200 F500");
        assert!(close(est.elapsed(), 0.1 + 0.2));
        est.advance("G0 X300");
        assert!(close(est.elapsed(), 0.1 + 0.2 + 0.2));
        assert_eq!(est.feedrate(), 500.0);
    }

    #[test]
    fn test_relative_mode() {
        let mut est = MotionEstimator::new(600.0);
        est.advance("G91");
        est.advance("G1 X10");
        est.advance("G1 X10");
        assert_eq!(est.position(), [20.0, 0.0, 0.0]);
        assert!(close(est.elapsed(), 20.0 / 600.0));
        est.advance("G90");
        est.advance("G1 X0");
        assert_eq!(est.position(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_non_motion_and_dwell() {
        let mut est = MotionEstimator::new(3000.0);
        assert_eq!(est.advance("M104 S200"), 0.0);
        assert_eq!(est.advance("G4 S60"), 0.0);

        let mut est = MotionEstimator::new(3000.0).with_dwell(true);
        assert!(close(est.advance("G4 S60"), 1.0));
        assert!(close(est.advance("G4 P30000"), 0.5));
    }

    #[test]
    fn test_zero_feedrate_adds_nothing() {
        let mut est = MotionEstimator::new(0.0);
        assert_eq!(est.advance("G1 X10"), 0.0);
        assert_eq!(est.position()[0], 10.0);
    }

    #[test]
    fn test_timeline_offsets() {
        let lines = split_lines("T0\nG1 X100 F1000\nT1\nG1 X300\n");
        let times = MotionEstimator::new(3000.0).timeline(&lines);
        assert_eq!(times.len(), 5);
        assert!(close(times[0], 0.0));
        assert!(close(times[2], 0.1));
        assert!(close(times[4], 0.3));
    }
}
