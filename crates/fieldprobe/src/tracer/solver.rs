//! Explicit Runge-Kutta integrators over an interpolated velocity field.

use glam::DVec3;
use thiserror::Error;

use super::velocity::InterpolatedVelocityField;

/// Why a solver could not complete a step.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SolverFailure {
    /// An intermediate evaluation point left every dataset.
    #[error("integration left the domain at ({}, {}, {})", at.x, at.y, at.z)]
    OutOfDomain {
        /// The evaluation point that failed.
        at: DVec3,
    },
}

/// A completed integration step.
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    /// Position after the step.
    pub end: DVec3,
    /// Signed time step actually taken; adaptive solvers may take less
    /// than requested.
    pub step_taken: f64,
    /// Solver's suggestion for the next step. Fixed-step solvers echo the
    /// request back.
    pub next_step: f64,
    /// Local error estimate, zero for fixed-step solvers.
    pub error: f64,
}

/// One explicit integration scheme.
///
/// `step` advances from `x` by roughly `dt` (signed). Adaptive solvers
/// resize within `[min_dt, max_dt]` (magnitudes) to keep the local error
/// under `max_error`; fixed solvers take `dt` as given.
pub trait Solver: Send + Sync {
    fn step(
        &self,
        field: &mut InterpolatedVelocityField<'_>,
        x: DVec3,
        dt: f64,
        min_dt: f64,
        max_dt: f64,
        max_error: f64,
    ) -> Result<StepResult, SolverFailure>;

    fn is_adaptive(&self) -> bool {
        false
    }
}

fn eval(
    field: &mut InterpolatedVelocityField<'_>,
    x: DVec3,
) -> Result<DVec3, SolverFailure> {
    field.evaluate(x).ok_or(SolverFailure::OutOfDomain { at: x })
}

/// Second-order Runge-Kutta (Heun's method).
#[derive(Debug, Default, Clone, Copy)]
pub struct RungeKutta2;

impl Solver for RungeKutta2 {
    fn step(
        &self,
        field: &mut InterpolatedVelocityField<'_>,
        x: DVec3,
        dt: f64,
        _min_dt: f64,
        _max_dt: f64,
        _max_error: f64,
    ) -> Result<StepResult, SolverFailure> {
        let k1 = eval(field, x)?;
        let k2 = eval(field, x + dt * k1)?;
        Ok(StepResult {
            end: x + dt * 0.5 * (k1 + k2),
            step_taken: dt,
            next_step: dt,
            error: 0.0,
        })
    }
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Default, Clone, Copy)]
pub struct RungeKutta4;

impl Solver for RungeKutta4 {
    fn step(
        &self,
        field: &mut InterpolatedVelocityField<'_>,
        x: DVec3,
        dt: f64,
        _min_dt: f64,
        _max_dt: f64,
        _max_error: f64,
    ) -> Result<StepResult, SolverFailure> {
        let k1 = eval(field, x)?;
        let k2 = eval(field, x + 0.5 * dt * k1)?;
        let k3 = eval(field, x + 0.5 * dt * k2)?;
        let k4 = eval(field, x + dt * k3)?;
        Ok(StepResult {
            end: x + dt / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4),
            step_taken: dt,
            next_step: dt,
            error: 0.0,
        })
    }
}

/// Adaptive Runge-Kutta 4(5) with Cash-Karp coefficients.
#[derive(Debug, Default, Clone, Copy)]
pub struct RungeKutta45;

// Cash-Karp tableau. Stage times are omitted; the field has no explicit
// time dependence.
const B: [[f64; 5]; 5] = [
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0, 0.0, 0.0],
    [-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0, 0.0],
    [
        1631.0 / 55296.0,
        175.0 / 512.0,
        575.0 / 13824.0,
        44275.0 / 110592.0,
        253.0 / 4096.0,
    ],
];
const C: [f64; 6] = [37.0 / 378.0, 0.0, 250.0 / 621.0, 125.0 / 594.0, 0.0, 512.0 / 1771.0];
const DC: [f64; 6] = [
    37.0 / 378.0 - 2825.0 / 27648.0,
    0.0,
    250.0 / 621.0 - 18575.0 / 48384.0,
    125.0 / 594.0 - 13525.0 / 55296.0,
    -277.0 / 14336.0,
    512.0 / 1771.0 - 1.0 / 4.0,
];

impl RungeKutta45 {
    fn trial(
        &self,
        field: &mut InterpolatedVelocityField<'_>,
        x: DVec3,
        dt: f64,
    ) -> Result<(DVec3, f64), SolverFailure> {
        let mut k = [DVec3::ZERO; 6];
        k[0] = eval(field, x)?;
        for stage in 0..5 {
            let mut xs = x;
            for (i, b) in B[stage].iter().enumerate().take(stage + 1) {
                xs += dt * *b * k[i];
            }
            k[stage + 1] = eval(field, xs)?;
        }
        let mut end = x;
        let mut err = DVec3::ZERO;
        for i in 0..6 {
            end += dt * C[i] * k[i];
            err += dt * DC[i] * k[i];
        }
        Ok((end, err.length()))
    }
}

impl Solver for RungeKutta45 {
    fn step(
        &self,
        field: &mut InterpolatedVelocityField<'_>,
        x: DVec3,
        dt: f64,
        min_dt: f64,
        max_dt: f64,
        max_error: f64,
    ) -> Result<StepResult, SolverFailure> {
        let sign = dt.signum();
        let (lo, hi) = (min_dt.abs(), max_dt.abs());
        let mut h = sign * dt.abs().clamp(lo, hi);

        loop {
            let (end, error) = self.trial(field, x, h)?;
            if error <= max_error || h.abs() <= lo {
                let grow = if error > 0.0 {
                    0.9 * (max_error / error).powf(0.2)
                } else {
                    5.0
                };
                let next = sign * (h.abs() * grow.min(5.0)).clamp(lo, hi);
                return Ok(StepResult {
                    end,
                    step_taken: h,
                    next_step: next,
                    error,
                });
            }
            // error too large: shrink and retry, no lower than min_dt
            let shrink = 0.9 * (max_error / error).powf(0.25);
            h = sign * (h.abs() * shrink).max(lo);
        }
    }

    fn is_adaptive(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldprobe_core::AttributeArray;
    use fieldprobe_mesh::{Dataset, ImageGrid};
    use glam::UVec3;

    /// Uniform flow v = (1, 0, 0) on [0,10]^3.
    fn uniform_flow() -> ImageGrid {
        let mut grid = ImageGrid::new(
            "flow",
            UVec3::splat(3),
            DVec3::ZERO,
            DVec3::splat(5.0),
        );
        let n = grid.num_points();
        let mut v = Vec::with_capacity(n * 3);
        for _ in 0..n {
            v.extend_from_slice(&[1.0, 0.0, 0.0]);
        }
        grid.point_data_mut()
            .add_array(AttributeArray::from_values("velocity", 3, v).unwrap())
            .unwrap();
        grid
    }

    #[test]
    fn test_fixed_solvers_advance_exactly_in_uniform_flow() {
        let grid = uniform_flow();
        let mut field = InterpolatedVelocityField::new(vec![&grid], "velocity").unwrap();
        for solver in [&RungeKutta2 as &dyn Solver, &RungeKutta4] {
            field.clear_cache();
            let r = solver
                .step(&mut field, DVec3::splat(1.0), 0.5, 0.0, 0.0, 1e-6)
                .unwrap();
            assert!((r.end - DVec3::new(1.5, 1.0, 1.0)).length() < 1e-12);
            assert_eq!(r.step_taken, 0.5);
        }
    }

    #[test]
    fn test_rk45_is_exact_for_uniform_flow() {
        let grid = uniform_flow();
        let mut field = InterpolatedVelocityField::new(vec![&grid], "velocity").unwrap();
        let r = RungeKutta45
            .step(&mut field, DVec3::splat(1.0), 0.5, 0.01, 2.0, 1e-6)
            .unwrap();
        assert!((r.end - DVec3::new(1.5, 1.0, 1.0)).length() < 1e-12);
        assert!(r.error <= 1e-6);
        // clean solution: the solver suggests growing the step
        assert!(r.next_step.abs() >= 0.5);
    }

    #[test]
    fn test_out_of_domain_reports_failed_position() {
        let grid = uniform_flow();
        let mut field = InterpolatedVelocityField::new(vec![&grid], "velocity").unwrap();
        let err = RungeKutta4
            .step(&mut field, DVec3::splat(9.9), 10.0, 0.0, 0.0, 1e-6)
            .unwrap_err();
        assert!(matches!(err, SolverFailure::OutOfDomain { .. }));
    }
}
