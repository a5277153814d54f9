//! Streamline integration through an interpolated velocity field.
//!
//! Seeds are advected through the velocity field of one or more source
//! datasets with an explicit Runge-Kutta solver. Each streamline carries
//! the integration time, local velocity, and the source's interpolated
//! point attributes at every vertex, plus optional vorticity, angular
//! velocity, and accumulated rotation for ribbon-style rendering.

pub mod interval;
pub mod solver;
pub mod velocity;

pub use interval::{convert_intervals, Interval, StepUnit, TimeSteps};
pub use solver::{RungeKutta2, RungeKutta4, RungeKutta45, Solver, SolverFailure, StepResult};
pub use velocity::InterpolatedVelocityField;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fieldprobe_core::{AttributeArray, AttributeSet, FieldProbeError, Result};
use fieldprobe_mesh::{Cell, Dataset, FoundCell};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Abort polling granularity, in integration steps.
const ABORT_CHECK_INTERVAL: usize = 1000;

/// Which way seeds are advected relative to the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IntegrationDirection {
    #[default]
    Forward,
    Backward,
    /// Two streamlines per seed, one each way.
    Both,
}

/// Why a streamline stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The line left every source dataset.
    OutOfDomain,
    /// The propagation budget was spent.
    OutOfTime,
    /// The step count limit was hit.
    OutOfSteps,
    /// The flow speed dropped to the terminal speed.
    Stagnation,
    /// The abort flag was raised mid-line.
    Aborted,
}

/// Configuration for streamline tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTracerOptions {
    pub direction: IntegrationDirection,

    /// Total distance budget per streamline, in any unit.
    pub max_propagation: Interval,

    /// First step attempted from each seed.
    pub initial_step: Interval,

    /// Smallest step an adaptive solver may take. Non-positive disables
    /// shrinking.
    pub min_step: Interval,

    /// Largest step an adaptive solver may take. Non-positive disables
    /// growing.
    pub max_step: Interval,

    /// Hard cap on integration steps per streamline.
    pub max_steps: usize,

    /// Speed at or below which the flow counts as stagnant.
    pub terminal_speed: f64,

    /// Local error bound handed to adaptive solvers.
    pub max_error: f64,

    /// Compute vorticity, angular velocity, and accumulated rotation
    /// along each line.
    pub compute_vorticity: bool,

    /// Scale factor applied to angular velocity.
    pub rotation_scale: f64,
}

impl Default for StreamTracerOptions {
    fn default() -> Self {
        Self {
            direction: IntegrationDirection::Forward,
            max_propagation: Interval::new(1.0, StepUnit::Length),
            initial_step: Interval::new(0.5, StepUnit::CellLength),
            min_step: Interval::new(1.0e-2, StepUnit::CellLength),
            max_step: Interval::new(1.0, StepUnit::CellLength),
            max_steps: 2000,
            terminal_speed: 1.0e-12,
            max_error: 1.0e-6,
            compute_vorticity: true,
            rotation_scale: 1.0,
        }
    }
}

/// One traced streamline.
#[derive(Debug, Clone)]
pub struct Streamline {
    /// Index of the seed this line was grown from.
    pub seed_id: usize,
    /// Direction this line was grown in (never `Both`).
    pub direction: IntegrationDirection,
    /// Line vertices, seed first.
    pub points: Vec<DVec3>,
    /// Signed integration time at each vertex, zero at the seed.
    pub time: Vec<f64>,
    /// Interpolated velocity at each vertex.
    pub velocity: Vec<DVec3>,
    /// Source point attributes interpolated at each vertex.
    pub point_data: AttributeSet,
    /// Vorticity vector at each vertex, if requested.
    pub vorticity: Option<Vec<DVec3>>,
    /// Angular velocity about the flow axis at each vertex, if requested.
    pub angular_velocity: Option<Vec<f64>>,
    /// Accumulated rotation at each vertex, if requested.
    pub rotation: Option<Vec<f64>>,
    pub termination: TerminationReason,
}

impl Streamline {
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Grows streamlines from seed points through one or more datasets.
///
/// ```no_run
/// use fieldprobe::tracer::StreamTracer;
/// # fn demo(flow: &dyn fieldprobe_mesh::Dataset) -> fieldprobe_core::Result<()> {
/// let tracer = StreamTracer::new();
/// let lines = tracer.trace(&[flow], "velocity", &[glam::DVec3::ZERO])?;
/// for line in &lines {
///     println!("{} points, stopped: {:?}", line.num_points(), line.termination);
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamTracer {
    options: StreamTracerOptions,
    solver: Box<dyn Solver>,
    abort: Option<Arc<AtomicBool>>,
}

impl Default for StreamTracer {
    fn default() -> Self {
        Self {
            options: StreamTracerOptions::default(),
            solver: Box::new(RungeKutta2),
            abort: None,
        }
    }
}

impl StreamTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: StreamTracerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn options(&self) -> &StreamTracerOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut StreamTracerOptions {
        &mut self.options
    }

    /// Replaces the integration scheme.
    pub fn set_solver(&mut self, solver: Box<dyn Solver>) {
        self.solver = solver;
    }

    /// Installs a cooperative cancellation flag, polled every
    /// [`ABORT_CHECK_INTERVAL`] steps.
    pub fn set_abort_flag(&mut self, flag: Arc<AtomicBool>) {
        self.abort = Some(flag);
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Traces one (or two, for `Both`) streamlines per seed.
    ///
    /// `vector_name` must name a 3-component point array on every source.
    /// Forward lines come first in the result, then backward ones, each in
    /// seed order.
    pub fn trace(
        &self,
        sources: &[&dyn Dataset],
        vector_name: &str,
        seeds: &[DVec3],
    ) -> Result<Vec<Streamline>> {
        if sources.is_empty() {
            return Err(FieldProbeError::EmptyDataset("sources".to_owned()));
        }
        let mut field = InterpolatedVelocityField::new(sources.to_vec(), vector_name)?;

        let directions: &[IntegrationDirection] = match self.options.direction {
            IntegrationDirection::Forward => &[IntegrationDirection::Forward],
            IntegrationDirection::Backward => &[IntegrationDirection::Backward],
            IntegrationDirection::Both => {
                &[IntegrationDirection::Forward, IntegrationDirection::Backward]
            }
        };

        let mut lines = Vec::with_capacity(directions.len() * seeds.len());
        for &direction in directions {
            for (seed_id, &seed) in seeds.iter().enumerate() {
                field.clear_cache();
                lines.push(self.integrate(&mut field, seed_id, seed, direction));
            }
        }
        let (hits, misses) = field.cache_stats();
        log::debug!("traced {} lines (cell cache {hits} hits / {misses} misses)", lines.len());
        Ok(lines)
    }

    /// Grows a single streamline from `seed`.
    #[allow(clippy::too_many_lines)]
    fn integrate(
        &self,
        field: &mut InterpolatedVelocityField<'_>,
        seed_id: usize,
        seed: DVec3,
        direction: IntegrationDirection,
    ) -> Streamline {
        let opts = &self.options;
        let sign = match direction {
            IntegrationDirection::Backward => -1.0,
            _ => 1.0,
        };
        let mut line = Streamline {
            seed_id,
            direction,
            points: Vec::new(),
            time: Vec::new(),
            velocity: Vec::new(),
            point_data: AttributeSet::new(),
            vorticity: opts.compute_vorticity.then(Vec::new),
            angular_velocity: opts.compute_vorticity.then(Vec::new),
            rotation: opts.compute_vorticity.then(Vec::new),
            termination: TerminationReason::OutOfTime,
        };

        // Seeds outside the domain produce an empty line.
        let Some(mut velocity) = field.evaluate(seed) else {
            line.termination = TerminationReason::OutOfDomain;
            return line;
        };
        let Some((mut dataset, found)) = field.last_cell() else {
            line.termination = TerminationReason::OutOfDomain;
            return line;
        };
        let mut found: FoundCell = found.clone();
        let mut cell = dataset.cell(found.cell_id);
        let mut cell_length = cell.length_squared().sqrt();
        let mut speed = velocity.length();

        line.point_data = empty_mirror(dataset.point_data());
        let mut x = seed;
        line.points.push(x);
        line.time.push(0.0);
        line.velocity.push(velocity);
        append_interpolated(&mut line.point_data, dataset, cell.vertex_ids(), &found.weights);

        let mut omega = 0.0;
        if opts.compute_vorticity {
            if let Some(array) = field.last_vector_array() {
                let vort = cell_vorticity(&cell, found.pcoords, array);
                omega = angular_velocity(vort, velocity, speed, opts.rotation_scale);
                push_vorticity(&mut line, vort, omega, 0.0);
            }
        }

        // A stagnant seed still yields its one-point line, so the caller
        // can tell "seed is outside" from "flow is dead here".
        if speed <= opts.terminal_speed {
            line.termination = TerminationReason::Stagnation;
            return line;
        }

        let mut steps = convert_intervals(
            opts.initial_step,
            opts.min_step,
            opts.max_step,
            sign,
            speed,
            cell_length,
        );
        let mut propagation = 0.0;
        let mut integration_time = 0.0;
        let mut rotation = 0.0;
        let mut num_steps = 0usize;

        while propagation < opts.max_propagation.value {
            if num_steps > opts.max_steps {
                line.termination = TerminationReason::OutOfSteps;
                break;
            }
            if num_steps % ABORT_CHECK_INTERVAL == 1 && self.aborted() {
                log::info!("streamline {seed_id} aborted after {num_steps} steps");
                line.termination = TerminationReason::Aborted;
                break;
            }

            // Shrink the final step so the line lands exactly on the
            // propagation budget instead of overshooting it.
            let step_prop = Interval::new(steps.step.abs(), StepUnit::Time)
                .to_unit(opts.max_propagation.unit, speed, cell_length);
            if propagation + step_prop > opts.max_propagation.value {
                let remaining = opts.max_propagation.value - propagation;
                steps.step = sign
                    * Interval::new(remaining, opts.max_propagation.unit)
                        .to_time(speed, cell_length);
            }

            let result = match self.solver.step(
                field,
                x,
                steps.step,
                steps.min,
                steps.max,
                opts.max_error,
            ) {
                Ok(r) => r,
                Err(SolverFailure::OutOfDomain { at }) => {
                    log::trace!("streamline {seed_id} left the domain near {at}");
                    line.termination = TerminationReason::OutOfDomain;
                    break;
                }
            };

            num_steps += 1;
            x = result.end;
            integration_time += result.step_taken;
            propagation += Interval::new(result.step_taken.abs(), StepUnit::Time)
                .to_unit(opts.max_propagation.unit, speed, cell_length);

            let Some(v2) = field.evaluate(x) else {
                line.termination = TerminationReason::OutOfDomain;
                break;
            };
            let speed2 = v2.length();
            if 0.5 * (speed + speed2) <= opts.terminal_speed {
                line.termination = TerminationReason::Stagnation;
                break;
            }

            let Some((ds, fc)) = field.last_cell() else {
                line.termination = TerminationReason::OutOfDomain;
                break;
            };
            dataset = ds;
            found = fc.clone();
            cell = dataset.cell(found.cell_id);
            cell_length = cell.length_squared().sqrt();
            velocity = v2;
            speed = speed2;

            line.points.push(x);
            line.time.push(integration_time);
            line.velocity.push(velocity);
            append_interpolated(&mut line.point_data, dataset, cell.vertex_ids(), &found.weights);

            if opts.compute_vorticity {
                if let Some(array) = field.last_vector_array() {
                    let vort = cell_vorticity(&cell, found.pcoords, array);
                    let omega2 = angular_velocity(vort, velocity, speed, opts.rotation_scale);
                    rotation += 0.5 * (omega + omega2) * result.step_taken;
                    omega = omega2;
                    push_vorticity(&mut line, vort, omega, rotation);
                }
            }

            // Step sizes track the local speed and cell size. Adaptive
            // solvers additionally carry over their own suggestion.
            let next = convert_intervals(
                opts.initial_step,
                opts.min_step,
                opts.max_step,
                sign,
                speed,
                cell_length,
            );
            steps = if self.solver.is_adaptive() {
                TimeSteps {
                    step: sign * result.next_step.abs().clamp(next.min.abs(), next.max.abs()),
                    ..next
                }
            } else {
                next
            };
        }
        line
    }
}

/// Clones an attribute set's layout with zero tuples.
fn empty_mirror(attrs: &AttributeSet) -> AttributeSet {
    let mut out = AttributeSet::new();
    for a in attrs.arrays() {
        // layout names are unique, add cannot fail
        let _ = out.add_array(AttributeArray::zeroed(a.name(), a.components(), 0));
    }
    out
}

/// Appends one interpolated tuple per line array.
///
/// Arrays absent from the current dataset (heterogeneous multi-block
/// sources) get a zero tuple so all line arrays stay the same length.
fn append_interpolated(
    line_data: &mut AttributeSet,
    dataset: &dyn Dataset,
    vertex_ids: &[u32],
    weights: &[f64],
) {
    for array in line_data.arrays_mut() {
        let mut tuple = vec![0.0; array.components()];
        if let Some(src) = dataset.point_data().array(array.name()) {
            if src.components() == array.components() {
                for (&id, &w) in vertex_ids.iter().zip(weights) {
                    for (t, &v) in tuple.iter_mut().zip(src.tuple(id as usize)) {
                        *t += w * v;
                    }
                }
            }
        }
        array.push_tuple(&tuple);
    }
}

/// Vorticity of the vector field at a point inside `cell`.
fn cell_vorticity(cell: &Cell, pcoords: DVec3, array: &AttributeArray) -> DVec3 {
    let mut values = Vec::with_capacity(cell.vertex_ids().len() * 3);
    for &id in cell.vertex_ids() {
        values.extend_from_slice(array.tuple(id as usize));
    }
    let d = cell.derivatives(pcoords, &values);
    // curl of v from the row-major derivative tensor
    DVec3::new(d[7] - d[5], d[2] - d[6], d[3] - d[1])
}

/// Projection of the vorticity onto the flow axis, scaled.
fn angular_velocity(vorticity: DVec3, velocity: DVec3, speed: f64, scale: f64) -> f64 {
    if speed > 0.0 {
        scale * vorticity.dot(velocity) / speed
    } else {
        0.0
    }
}

fn push_vorticity(line: &mut Streamline, vort: DVec3, omega: f64, rotation: f64) {
    if let Some(v) = &mut line.vorticity {
        v.push(vort);
    }
    if let Some(a) = &mut line.angular_velocity {
        a.push(omega);
    }
    if let Some(r) = &mut line.rotation {
        r.push(rotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldprobe_core::AttributeArray;
    use fieldprobe_mesh::ImageGrid;
    use glam::UVec3;

    /// Uniform flow v = (2, 0, 0) on [0,20]^3.
    fn uniform_flow() -> ImageGrid {
        let mut grid = ImageGrid::new("flow", UVec3::splat(3), DVec3::ZERO, DVec3::splat(10.0));
        let n = grid.num_points();
        let mut v = Vec::with_capacity(n * 3);
        for _ in 0..n {
            v.extend_from_slice(&[2.0, 0.0, 0.0]);
        }
        grid.point_data_mut()
            .add_array(AttributeArray::from_values("velocity", 3, v).unwrap())
            .unwrap();
        grid
    }

    #[test]
    fn test_propagation_budget_is_hit_exactly() {
        let grid = uniform_flow();
        let mut tracer = StreamTracer::new();
        tracer.options_mut().max_propagation = Interval::new(5.0, StepUnit::Length);
        tracer.options_mut().compute_vorticity = false;
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(1.0)])
            .unwrap();
        let line = &lines[0];
        assert_eq!(line.termination, TerminationReason::OutOfTime);
        let end = *line.points.last().unwrap();
        assert!((end.x - 6.0).abs() < 1e-9, "ended at {end}");
        // arc length 5 at speed 2 takes 2.5 time units
        assert!((line.time.last().unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_backward_integration_runs_upstream() {
        let grid = uniform_flow();
        let mut tracer = StreamTracer::new();
        tracer.options_mut().direction = IntegrationDirection::Backward;
        tracer.options_mut().max_propagation = Interval::new(4.0, StepUnit::Length);
        tracer.options_mut().compute_vorticity = false;
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(10.0)])
            .unwrap();
        let line = &lines[0];
        let end = *line.points.last().unwrap();
        assert!((end.x - 6.0).abs() < 1e-9);
        assert!(*line.time.last().unwrap() < 0.0);
    }

    #[test]
    fn test_both_directions_yield_two_lines_per_seed() {
        let grid = uniform_flow();
        let mut tracer = StreamTracer::new();
        tracer.options_mut().direction = IntegrationDirection::Both;
        let seeds = [DVec3::splat(10.0), DVec3::splat(5.0)];
        let lines = tracer.trace(&[&grid], "velocity", &seeds).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].direction, IntegrationDirection::Forward);
        assert_eq!(lines[3].direction, IntegrationDirection::Backward);
        assert_eq!(lines[1].seed_id, 1);
    }

    #[test]
    fn test_seed_outside_domain_gives_empty_line() {
        let grid = uniform_flow();
        let tracer = StreamTracer::new();
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(-5.0)])
            .unwrap();
        assert!(lines[0].is_empty());
        assert_eq!(lines[0].termination, TerminationReason::OutOfDomain);
    }

    #[test]
    fn test_stagnant_seed_gives_one_point_line() {
        let mut grid = ImageGrid::new("still", UVec3::splat(2), DVec3::ZERO, DVec3::ONE);
        let n = grid.num_points();
        grid.point_data_mut()
            .add_array(AttributeArray::zeroed("velocity", 3, n))
            .unwrap();
        let tracer = StreamTracer::new();
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(0.5)])
            .unwrap();
        assert_eq!(lines[0].num_points(), 1);
        assert_eq!(lines[0].termination, TerminationReason::Stagnation);
    }

    #[test]
    fn test_out_of_steps_is_reported() {
        let grid = uniform_flow();
        let mut tracer = StreamTracer::new();
        tracer.options_mut().max_steps = 3;
        tracer.options_mut().initial_step = Interval::new(1.0e-3, StepUnit::Length);
        tracer.options_mut().max_propagation = Interval::new(100.0, StepUnit::Length);
        tracer.options_mut().compute_vorticity = false;
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(1.0)])
            .unwrap();
        assert_eq!(lines[0].termination, TerminationReason::OutOfSteps);
    }

    #[test]
    fn test_line_leaving_the_domain_is_truncated() {
        let grid = uniform_flow();
        let mut tracer = StreamTracer::new();
        tracer.options_mut().max_propagation = Interval::new(1.0e6, StepUnit::Length);
        tracer.options_mut().compute_vorticity = false;
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(19.0)])
            .unwrap();
        let line = &lines[0];
        assert_eq!(line.termination, TerminationReason::OutOfDomain);
        assert!(line.points.last().unwrap().x <= 20.0 + 1e-9);
    }

    #[test]
    fn test_attributes_ride_along_the_line() {
        let mut grid = uniform_flow();
        let f: Vec<f64> = grid.node_positions().iter().map(|p| p.x).collect();
        grid.point_data_mut()
            .add_array(AttributeArray::from_values("f", 1, f).unwrap())
            .unwrap();
        let mut tracer = StreamTracer::new();
        tracer.options_mut().max_propagation = Interval::new(5.0, StepUnit::Length);
        tracer.options_mut().compute_vorticity = false;
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::splat(1.0)])
            .unwrap();
        let line = &lines[0];
        let f = line.point_data.array("f").unwrap();
        assert_eq!(f.num_tuples(), line.num_points());
        for (i, p) in line.points.iter().enumerate() {
            assert!((f.tuple(i)[0] - p.x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rigid_rotation_has_constant_angular_velocity() {
        // v = (-y, x, 0): vorticity (0, 0, 2) everywhere
        let mut grid = ImageGrid::new(
            "vortex",
            UVec3::splat(9),
            DVec3::splat(-4.0),
            DVec3::ONE,
        );
        let mut v = Vec::with_capacity(grid.num_points() * 3);
        for p in grid.node_positions() {
            v.extend_from_slice(&[-p.y, p.x, 0.0]);
        }
        grid.point_data_mut()
            .add_array(AttributeArray::from_values("velocity", 3, v).unwrap())
            .unwrap();

        let mut tracer = StreamTracer::new();
        tracer.set_solver(Box::new(RungeKutta45));
        tracer.options_mut().max_propagation = Interval::new(2.0, StepUnit::Length);
        let lines = tracer
            .trace(&[&grid], "velocity", &[DVec3::new(2.0, 0.0, 1.0)])
            .unwrap();
        let line = &lines[0];
        assert!(line.num_points() > 2);

        let vort = line.vorticity.as_ref().unwrap();
        for w in vort {
            assert!((*w - DVec3::new(0.0, 0.0, 2.0)).length() < 1e-6, "vorticity {w}");
        }
        // vorticity is perpendicular to the velocity here
        for a in line.angular_velocity.as_ref().unwrap() {
            assert!(a.abs() < 1e-6);
        }
        // the streamline stays on the radius-2 circle
        for p in &line.points {
            let r = (p.x * p.x + p.y * p.y).sqrt();
            assert!((r - 2.0).abs() < 1e-3, "radius {r}");
        }
    }
}
