mod common;

use ai_traffic::map::PointId;
use ai_traffic::AiParams;
use common::*;

#[test]
fn vehicle_at_dead_end_restarts_at_origin() {
    let params = AiParams {
        seed: Some(7),
        ..Default::default()
    };
    let (world, ids) = world(chain(40, 10.0), params, 0, 1);
    let slot = world.slot(ids[0]).unwrap();
    slot.set_overbooking(2, world.params());
    let states = slot.states();
    let (leader, follower) = (&states[0], &states[1]);
    leader
        .lock()
        .unwrap()
        .teleport(world.map(), world.params(), PointId::new(36), 0, true)
        .unwrap();
    follower
        .lock()
        .unwrap()
        .teleport(world.map(), world.params(), PointId::new(2), 0, true)
        .unwrap();
    let speed = leader.lock().unwrap().current_speed();

    for now in (50..=3_000).step_by(50) {
        world.update(now);
    }

    let leader = leader.lock().unwrap();
    let follower = follower.lock().unwrap();
    assert!(leader.is_initialized());
    assert!(follower.is_initialized());
    assert!(leader.current_point().index() < 5, "{}", leader.current_point());
    assert!(leader.position().z < follower.position().z);
    // The speed survives the restart
    assert!((leader.current_speed() - speed).abs() < 1e-9);
    drop((leader, follower));
    assert_eq!(world.ai_statuses().len(), 2);
}
