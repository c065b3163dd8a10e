//! Render a Mandelbrot preview as ASCII and print the run report.
//!
//! Set `RUST_LOG=fractile=debug` to watch individual batches.

use fractile::prelude::*;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PALETTE: &[u8] = b" .:-=+*#%@";

fn main() -> fractile::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fractile=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::builder()
        .fragment_size(16, 4)
        .target_batch_duration(Duration::from_millis(10))
        .build()?;
    let mut scheduler = ParallelScheduler::new(config)?;

    let area = Area::new(96, 40);
    let params = FractalParams::new(2.0, 200).with_viewport(Viewport::new((-2.2, -1.2), (1.0, 1.2)));
    let mut canvas = Canvas::new(area);

    let report = scheduler.calculate(area, &params, |result| {
        canvas.blit(&result.segment, result.pixels);
    })?;

    for row in canvas.pixels().chunks(area.width) {
        let line: String = row
            .iter()
            .map(|&v| {
                // inside the set is 0.0, so the darkest glyph goes there
                let idx = ((1.0 - v) * (PALETTE.len() - 1) as f32).round() as usize;
                PALETTE[idx.min(PALETTE.len() - 1)] as char
            })
            .collect();
        println!("{}", line);
    }

    println!();
    println!(
        "{} pixels in {:?} ({:.0} px/s)",
        report.pixels,
        report.wall_time,
        report.pixels_per_second()
    );
    for device in &report.devices {
        println!(
            "  {:<40} {:>4} batches {:>6} px  busy {:?}",
            device.name, device.batches, device.pixels, device.busy
        );
    }
    if let Some(metrics) = &report.metrics {
        println!(
            "  batch latency p50 {:?}  p99 {:?}",
            Duration::from_nanos(metrics.p50_batch_ns),
            Duration::from_nanos(metrics.p99_batch_ns)
        );
    }

    Ok(())
}
