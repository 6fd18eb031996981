//! # Fluid Snapshot
//!
//! Stirs the fluid with a pair of opposing jets for a few seconds, printing
//! diagnostics along the way, then writes the dye field to `fluid.png`.
//!
//! Run with: `cargo run --example fluid_snapshot --release -- [grid size]`

use backdrop::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let size: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(128);

    let config = FluidConfig::new(size, size)
        .with_vorticity(25.0)
        .with_dissipation(0.2, 0.05)
        .with_iterations(4, 30);
    let mut fluid = FluidSolver::new(config)?;

    println!("=== backdrop fluid ===");
    println!("Grid: {}x{}", size, size);

    let dt = 1.0 / 60.0;
    let s = size as f32;
    let radius = s * 0.06;
    for frame in 0..240 {
        if frame % 4 == 0 {
            let wobble = (frame as f32 * 0.05).sin() * s * 0.1;
            fluid.push_impulse(Impulse::new(
                Vec2::new(s * 0.2, s * 0.5 + wobble),
                Vec2::new(s * 1.5, 0.0),
                Vec4::new(0.545, 0.0, 1.0, 1.0),
                radius,
            ));
            fluid.push_impulse(Impulse::new(
                Vec2::new(s * 0.8, s * 0.5 - wobble),
                Vec2::new(-s * 1.5, 0.0),
                Vec4::new(1.0, 0.843, 0.0, 1.0),
                radius,
            ));
        }
        fluid.step(dt);

        if frame % 60 == 59 {
            println!(
                "frame {:>3}  energy {:>10.2}  dye {:>10.2}  |div| {:.4}",
                frame + 1,
                fluid.kinetic_energy(),
                fluid.total_dye(),
                fluid.mean_abs_divergence()
            );
        }
    }

    fluid.save_png("fluid.png")?;
    println!("Wrote fluid.png");
    Ok(())
}
