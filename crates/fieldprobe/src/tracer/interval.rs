//! Integration step sizes and the units they are expressed in.
//!
//! Step sizes and the propagation budget can be given in integration time,
//! arc length, or multiples of the current cell's diagonal. The solver
//! works in time, so every quantity is converted to time using the speed
//! and cell size at the current streamline position, and reconverted after
//! each step as both change along the line.

use serde::{Deserialize, Serialize};

/// Unit a step size or propagation budget is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StepUnit {
    /// Integration time.
    Time,
    /// Arc length travelled.
    Length,
    /// Multiples of the current cell's diagonal length.
    #[default]
    CellLength,
}

/// A magnitude tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub value: f64,
    pub unit: StepUnit,
}

impl Interval {
    #[must_use]
    pub const fn new(value: f64, unit: StepUnit) -> Self {
        Self { value, unit }
    }

    /// Converts to integration time at local `speed` and `cell_length`.
    ///
    /// A zero speed makes time-based conversion meaningless; callers stop
    /// on stagnation before converting.
    #[must_use]
    pub fn to_time(self, speed: f64, cell_length: f64) -> f64 {
        match self.unit {
            StepUnit::Time => self.value,
            StepUnit::Length => self.value / speed,
            StepUnit::CellLength => self.value * cell_length / speed,
        }
    }

    /// Converts to arc length at local `speed` and `cell_length`.
    #[must_use]
    pub fn to_length(self, speed: f64, cell_length: f64) -> f64 {
        match self.unit {
            StepUnit::Time => self.value * speed,
            StepUnit::Length => self.value,
            StepUnit::CellLength => self.value * cell_length,
        }
    }

    /// Converts to the target unit at local `speed` and `cell_length`.
    #[must_use]
    pub fn to_unit(self, unit: StepUnit, speed: f64, cell_length: f64) -> f64 {
        match unit {
            StepUnit::Time => self.to_time(speed, cell_length),
            StepUnit::Length => self.to_length(speed, cell_length),
            StepUnit::CellLength => self.to_length(speed, cell_length) / cell_length,
        }
    }
}

/// Current step bounds in integration time, signed by direction.
#[derive(Debug, Clone, Copy)]
pub struct TimeSteps {
    pub step: f64,
    pub min: f64,
    pub max: f64,
}

/// Converts the configured step intervals to signed time steps.
///
/// `sign` is +1 for forward and -1 for backward integration. A min or max
/// bound configured non-positive falls back to the step itself, which
/// disables adaptive resizing in that direction.
#[must_use]
pub fn convert_intervals(
    initial: Interval,
    min: Interval,
    max: Interval,
    sign: f64,
    speed: f64,
    cell_length: f64,
) -> TimeSteps {
    let step = sign * initial.to_time(speed, cell_length);
    let min = if min.value <= 0.0 {
        step
    } else {
        sign * min.to_time(speed, cell_length)
    };
    let max = if max.value <= 0.0 {
        step
    } else {
        sign * max.to_time(speed, cell_length)
    };
    TimeSteps { step, min, max }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_length_to_time() {
        // half a cell diagonal at cell length 2 and speed 4 takes 0.25
        let iv = Interval::new(0.5, StepUnit::CellLength);
        assert!((iv.to_time(4.0, 2.0) - 0.25).abs() < 1e-15);
    }

    #[test]
    fn test_round_trips_through_units() {
        let iv = Interval::new(3.0, StepUnit::Length);
        let t = iv.to_unit(StepUnit::Time, 2.0, 0.5);
        assert!((t - 1.5).abs() < 1e-15);
        let back = Interval::new(t, StepUnit::Time).to_unit(StepUnit::Length, 2.0, 0.5);
        assert!((back - 3.0).abs() < 1e-15);
        let cells = iv.to_unit(StepUnit::CellLength, 2.0, 0.5);
        assert!((cells - 6.0).abs() < 1e-15);
    }

    #[test]
    fn test_convert_intervals_backward_and_fallback() {
        let steps = convert_intervals(
            Interval::new(1.0, StepUnit::Time),
            Interval::new(0.0, StepUnit::Time),
            Interval::new(2.0, StepUnit::Time),
            -1.0,
            1.0,
            1.0,
        );
        assert!((steps.step + 1.0).abs() < 1e-15);
        // non-positive min falls back to the step itself
        assert!((steps.min + 1.0).abs() < 1e-15);
        assert!((steps.max + 2.0).abs() < 1e-15);
    }
}
