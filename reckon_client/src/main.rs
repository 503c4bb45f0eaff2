//! Dead reckoning demo binary.
//!
//! Usage:
//!   cargo run -p reckon_client -- [--config reckon.json] [--ticks 300] [--tick-hz 60] [--seed 7]
//!
//! Simulates a few remotely owned vehicles that publish noisy state updates
//! twice a second, dead reckons them every frame on a flat terrain, and logs
//! the drawn position against the true one once per second.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use reckon_client::{
    clamp::{BatchGroundClamper, FlatTerrain, GroundClamper},
    Algorithm, DeadReckoningScheduler, EntityMotionState,
};
use reckon_shared::prelude::*;
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    ticks: u64,
    tick_hz: Option<u32>,
    seed: u64,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        ticks: 300,
        tick_hz: None,
        seed: 7,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--ticks" if i + 1 < args.len() => {
                out.ticks = args[i + 1].parse().unwrap_or(300);
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                out.tick_hz = args[i + 1].parse().ok();
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                out.seed = args[i + 1].parse().unwrap_or(7);
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

/// Ground truth kept by the pretend remote owner.
struct RemoteVehicle {
    id: EntityId,
    position: Vec3,
    velocity: Vec3,
    turret_heading: f32,
    turret_rate: f32,
}

impl RemoteVehicle {
    fn step(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.turret_heading = wrap_two_pi(self.turret_heading + self.turret_rate * dt);
    }

    fn heading(&self) -> f32 {
        // Heading zero faces +Y.
        (-self.velocity.x).atan2(self.velocity.y)
    }

    fn publish(&self, rng: &mut StdRng) -> EntityUpdate {
        let noise = Vec3::new(rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2), 0.0);
        EntityUpdate::default()
            .with_translation(self.position + noise)
            .with_rotation(Vec3::new(self.heading(), 0.0, 0.0))
            .with_velocity(self.velocity)
            .with_articulation(
                ArticulationUpdate::new(
                    "turret",
                    Vec3::new(self.turret_heading, 0.0, 0.0),
                    Vec3::new(self.turret_rate, 0.0, 0.0),
                )
                .with_metric("Azimuth"),
            )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let mut cfg = match &args.config {
        Some(path) => ReckonConfig::load(path).context("load dead reckoning config")?,
        None => ReckonConfig::default(),
    };
    if let Some(hz) = args.tick_hz {
        cfg.tick_hz = hz;
    }
    let tick_hz = cfg.tick_hz.max(1);
    info!(tick_hz, ticks = args.ticks, seed = args.seed, "Starting dead reckoning demo");

    let mut world = World::default();
    let terrain = world.spawn_actor(Transform::IDENTITY, &[]);
    let viewer = world.spawn_actor(Transform::from_hpr(Vec3::new(0.0, -20.0, 2.0), Vec3::ZERO), &[]);

    let mut clamper =
        BatchGroundClamper::new(FlatTerrain::new(0.0)).with_high_res_clamp_range(cfg.high_res_clamp_range);
    clamper.set_terrain_actor(Some(terrain));
    clamper.set_eye_point_actor(Some(viewer));
    let mut scheduler = DeadReckoningScheduler::with_clamper(cfg.clone(), Box::new(clamper));

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut vehicles = Vec::new();
    for n in 0..3 {
        let start = Vec3::new(n as f32 * 10.0, 0.0, 0.0);
        let id = world.spawn_actor(Transform::new(start, Quat::IDENTITY), &["turret"]);

        let mut state = EntityMotionState::from_config(Algorithm::VelocityOnly, &cfg);
        state.set_model_dimensions(Some(Vec3::new(3.0, 6.0, 2.5)));
        state.set_adjust_rotation_to_ground(true);
        state.set_last_known_translation(start);
        scheduler
            .register(id, state, &mut world)
            .context("register vehicle")?;

        vehicles.push(RemoteVehicle {
            id,
            position: start,
            velocity: Vec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(1.0..5.0), 0.0),
            turret_heading: 0.0,
            turret_rate: rng.gen_range(-0.5..0.5),
        });
    }

    let dt = 1.0 / tick_hz as f32;
    let publish_every = u64::from((tick_hz / 2).max(1));
    let tick_interval = Duration::from_secs_f32(dt);
    let mut next_tick = tokio::time::Instant::now();
    let mut queue = EventQueue::default();
    let mut sim_time = 0.0_f64;

    for tick in 0..args.ticks {
        for v in &mut vehicles {
            v.step(dt);
            if tick % publish_every == 0 {
                queue.push(Event::EntityUpdated {
                    id: v.id,
                    update: v.publish(&mut rng),
                });
            }
        }
        queue.push(Event::TickRemote { sim_time, dt });
        for event in queue.drain() {
            scheduler.handle(event, &mut world);
        }

        if tick % u64::from(tick_hz) == 0 {
            for v in &vehicles {
                if let Some(drawn) = world.actor_transform(v.id) {
                    info!(
                        entity = %v.id,
                        sim_time,
                        drawn = ?drawn.translation,
                        error = drawn.translation.distance(v.position),
                        "Vehicle"
                    );
                }
            }
        }

        sim_time += f64::from(dt);
        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    scheduler.handle(Event::MapUnloadBegin, &mut world);
    info!("Demo finished");
    Ok(())
}
