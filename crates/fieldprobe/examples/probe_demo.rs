//! Probes a synthetic temperature field and traces a few streamlines
//! through its swirling velocity field.
//!
//! Run with `RUST_LOG=debug cargo run --example probe_demo` to see the
//! engine's progress logging.

use fieldprobe::probe::ProbeFilter;
use fieldprobe::tracer::{Interval, StepUnit};
use fieldprobe::{AttributeArray, ImageGrid, Result, RungeKutta45, StreamTracer};
use glam::{DVec3, UVec3};

fn build_source() -> ImageGrid {
    let mut grid = ImageGrid::new(
        "demo-source",
        UVec3::splat(21),
        DVec3::splat(-10.0),
        DVec3::ONE,
    );
    let positions = grid.node_positions();
    let temperature: Vec<f64> = positions
        .iter()
        .map(|p| 20.0 + 5.0 * (-p.length_squared() / 50.0).exp())
        .collect();
    let mut velocity = Vec::with_capacity(positions.len() * 3);
    for p in &positions {
        velocity.extend_from_slice(&[-p.y, p.x, 0.2]);
    }
    let pd = grid.point_data_mut();
    pd.add_array(AttributeArray::from_values("temperature", 1, temperature).unwrap())
        .unwrap();
    pd.add_array(AttributeArray::from_values("velocity", 3, velocity).unwrap())
        .unwrap();
    grid
}

fn main() -> Result<()> {
    env_logger::init();
    let source = build_source();

    // Sample the temperature along a diagonal through the domain.
    let samples: Vec<DVec3> = (0..11)
        .map(|i| DVec3::splat(-12.0 + 2.4 * f64::from(i)))
        .collect();
    let output = ProbeFilter::new().probe(&samples, &source)?;
    println!("probed {} samples:", output.num_points());
    let t = output.point_data().array("temperature").unwrap();
    for (i, (p, &m)) in samples.iter().zip(output.mask()).enumerate() {
        if m == 1 {
            println!("  {p:>24}  temperature {:.3}", t.tuple(i)[0]);
        } else {
            println!("  {p:>24}  outside the source");
        }
    }

    // Advect a ring of seeds through the swirl.
    let mut tracer = StreamTracer::new();
    tracer.set_solver(Box::new(RungeKutta45));
    tracer.options_mut().max_propagation = Interval::new(40.0, StepUnit::Length);
    let seeds: Vec<DVec3> = (0..4)
        .map(|i| {
            let angle = f64::from(i) * std::f64::consts::FRAC_PI_2;
            DVec3::new(4.0 * angle.cos(), 4.0 * angle.sin(), -8.0)
        })
        .collect();
    let lines = tracer.trace(&[&source], "velocity", &seeds)?;
    println!("\ntraced {} streamlines:", lines.len());
    for line in &lines {
        println!(
            "  seed {}: {} points, stopped: {:?}",
            line.seed_id,
            line.num_points(),
            line.termination
        );
    }
    Ok(())
}
