//! Helpers shared by the integration tests.

use reckon_client::DeadReckoningScheduler;
use reckon_shared::{ecs::World, event::Event};

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Feeds `ticks` fixed-step tick events starting at `start`. Returns the sim
/// time after the last tick.
pub fn run_ticks(
    scheduler: &mut DeadReckoningScheduler,
    world: &mut World,
    start: f64,
    dt: f32,
    ticks: usize,
) -> f64 {
    let mut sim_time = start;
    for _ in 0..ticks {
        sim_time += f64::from(dt);
        tracing::trace!(sim_time, "tick");
        scheduler.handle(Event::TickRemote { sim_time, dt }, world);
    }
    sim_time
}
