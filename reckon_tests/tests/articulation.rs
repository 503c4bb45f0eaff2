use std::f32::consts::TAU;

use reckon_client::{Algorithm, DeadReckoningScheduler, EntityMotionState};
use reckon_shared::prelude::*;
use reckon_tests::{init_tracing, run_ticks};

fn turret_update(degrees: f32) -> EntityUpdate {
    EntityUpdate::default().with_articulation(
        ArticulationUpdate::new("turret", Vec3::new(degrees.to_radians(), 0.0, 0.0), Vec3::ZERO)
            .with_metric("Azimuth"),
    )
}

fn turret_heading(world: &World, id: EntityId) -> Option<f32> {
    world
        .get::<ArticulatedParts>(id)
        .and_then(|parts| parts.pose("turret"))
        .map(|pose| pose.value().x)
}

#[test]
fn turret_turns_the_short_way_through_north() -> anyhow::Result<()> {
    init_tracing();
    let cfg = ReckonConfig::from_json_str(r#"{"articulation_smooth_time": 0.5}"#)?;
    let mut world = World::default();
    let tank = world.spawn_actor(Transform::IDENTITY, &["turret"]);
    let mut scheduler = DeadReckoningScheduler::new(cfg);
    scheduler.register(tank, EntityMotionState::new(Algorithm::Static), &mut world)?;

    scheduler.handle(Event::EntityUpdated { id: tank, update: turret_update(359.0) }, &mut world);
    let sim_time = run_ticks(&mut scheduler, &mut world, 0.0, 0.25, 1);

    scheduler.handle(Event::EntityUpdated { id: tank, update: turret_update(1.0) }, &mut world);
    let sim_time = run_ticks(&mut scheduler, &mut world, sim_time, 0.25, 1);
    let h = turret_heading(&world, tank).ok_or_else(|| anyhow::anyhow!("turret not posed"))?;
    assert!(h < 1e-3 || TAU - h < 1e-3, "turret swung the long way: {h}");

    run_ticks(&mut scheduler, &mut world, sim_time, 0.25, 2);
    let h = turret_heading(&world, tank).ok_or_else(|| anyhow::anyhow!("turret not posed"))?;
    assert!((h - 1f32.to_radians()).abs() < 1e-4);
    Ok(())
}

#[test]
fn positional_parts_lerp_between_stops() -> anyhow::Result<()> {
    init_tracing();
    let mut world = World::default();
    let truck = world.spawn_actor(Transform::IDENTITY, &["boom"]);
    let mut scheduler = DeadReckoningScheduler::new(ReckonConfig::default());
    scheduler.register(truck, EntityMotionState::new(Algorithm::Static), &mut world)?;
    scheduler.set_articulation_smooth_time(1.0);

    let extend = |z: f32| {
        EntityUpdate::default().with_articulation(
            ArticulationUpdate::new("boom", Vec3::new(0.0, 0.0, z), Vec3::ZERO)
                .with_metric("Extension"),
        )
    };
    scheduler.on_entity_updated(truck, &extend(0.0));
    let sim_time = run_ticks(&mut scheduler, &mut world, 0.0, 0.5, 1);
    scheduler.on_entity_updated(truck, &extend(4.0));
    run_ticks(&mut scheduler, &mut world, sim_time, 0.5, 1);

    let pose = world
        .get::<ArticulatedParts>(truck)
        .and_then(|parts| parts.pose("boom"));
    assert_eq!(pose, Some(PartPose::Position(Vec3::new(0.0, 0.0, 2.0))));
    Ok(())
}
