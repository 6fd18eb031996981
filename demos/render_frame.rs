//! # Render Frame
//!
//! Ray-marches the orbital scene at a few points in time and writes each
//! frame to a PNG.
//!
//! Run with: `cargo run --example render_frame --release -- [width] [height]`

use backdrop::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let width: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(640);
    let height: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(360);

    let scene = OrbitalScene::default()
        .with_satellites(4, 0.35, 2.2)
        .with_core_displacement(0.08, 1.5);
    scene.validate()?;

    let shading = Shading::default()
        .with_ambient_occlusion(true)
        .with_soft_shadows(true);
    let marcher = RayMarcher {
        shading,
        ..Default::default()
    };
    marcher.validate()?;

    println!("=== backdrop ray marcher ===");
    println!("Resolution: {}x{}", width, height);

    for (i, time) in [0.0f32, 1.5, 3.0].into_iter().enumerate() {
        let camera = Camera::orbit(Vec3::ZERO, time * 0.3, 0.3, 7.0);
        let start = std::time::Instant::now();
        let frame = marcher.render(&scene, time, &camera, width, height)?;
        let path = format!("frame_{}.png", i);
        frame.save_png(&path)?;
        println!(
            "t={:.1}s  {:>6.1} ms  mean intensity {:.3}  -> {}",
            time,
            start.elapsed().as_secs_f64() * 1000.0,
            frame.mean_intensity(),
            path
        );
    }

    Ok(())
}
