mod common;

use ai_traffic::cgmath::prelude::*;
use ai_traffic::math::{Point3d, Vector3d};
use ai_traffic::{AiBehavior, AiParams, SlotEvent, TrafficWorld};
use common::*;
use std::sync::Arc;

fn params() -> AiParams {
    AiParams {
        seed: Some(11),
        ..Default::default()
    }
}

/// Same-slot vehicles travelling the same way that are closer than `min_state_distance`.
fn unsafe_pairs(world: &TrafficWorld) -> usize {
    let min = world.params().min_state_distance;
    let mut count = 0;
    for slot in world.ai_slots() {
        let placed = slot
            .states()
            .iter()
            .filter_map(|state| {
                let state = state.lock().unwrap();
                state
                    .is_initialized()
                    .then(|| (state.position(), state.current_point()))
            })
            .collect::<Vec<_>>();
        for (i, (pos_a, point_a)) in placed.iter().enumerate() {
            for (pos_b, point_b) in &placed[i + 1..] {
                if pos_a.distance(*pos_b) < min && world.map().is_same_direction(*point_a, *point_b) {
                    count += 1;
                }
            }
        }
    }
    count
}

#[test]
fn traffic_around_players_keeps_its_distance() {
    let (world, ids) = world(ring(2000.0, 5.0), params(), 3, 2);
    let world = Arc::new(world);
    let mut behavior = AiBehavior::new(Arc::clone(&world));
    let events = behavior.event_sender();
    let players = [
        (ids[0], car(Point3d::new(0.0, 0.0, 0.0), Vector3d::new(10.0, 0.0, 0.0))),
        (ids[1], car(Point3d::new(2000.0, 0.0, 0.0), Vector3d::new(0.0, 0.0, 10.0))),
        (ids[2], car(Point3d::new(2000.0, 0.0, 2000.0), Vector3d::new(-10.0, 0.0, 0.0))),
    ];
    for (id, _) in &players {
        events.send(SlotEvent::Connected(*id)).unwrap();
    }

    let v = world.params().max_speed;
    let spread = 0.5 * world.params().max_speed_variation;
    let mut most = 0;
    for now in (0..=60_000).step_by(50) {
        world.update(now);
        if now % 100 == 0 {
            world.detect_obstacles(now);
        }
        if now % 500 == 0 {
            for (id, status) in &players {
                events
                    .send(SlotEvent::PositionUpdate {
                        slot: *id,
                        status: *status,
                        timestamp: now,
                    })
                    .unwrap();
            }
            behavior.tick(now).unwrap();
            assert_eq!(unsafe_pairs(&world), 0, "at {} ms", now);
        }

        for slot in world.ai_slots() {
            for state in slot.states() {
                let state = state.lock().unwrap();
                if !state.is_initialized() {
                    continue;
                }
                assert!(state.current_speed() >= 0.0);
                assert!(state.current_speed() <= state.initial_max_speed() + 1e-9);
                assert!(state.initial_max_speed() >= v * (1.0 - spread) - 1e-9);
                assert!(state.initial_max_speed() <= v * (1.0 + spread) + 1e-9);
            }
        }
        most = most.max(world.ai_statuses().len());
    }

    // Three players over two slots: three vehicles per slot
    assert!(world.ai_slots().all(|slot| slot.target_overbooking() == 3));
    assert!(most > 0);
    assert!(world.ai_statuses().len() <= 6);
}

#[test]
fn far_player_gets_no_traffic() {
    let (world, ids) = world(ring(2000.0, 5.0), params(), 1, 2);
    let world = Arc::new(world);
    let mut behavior = AiBehavior::new(Arc::clone(&world));
    let events = behavior.event_sender();
    events.send(SlotEvent::Connected(ids[0])).unwrap();
    events
        .send(SlotEvent::PositionUpdate {
            slot: ids[0],
            status: car(Point3d::new(1000.0, 0.0, 1000.0), Vector3d::new(10.0, 0.0, 0.0)),
            timestamp: 0,
        })
        .unwrap();

    assert_eq!(behavior.tick(0), Ok(0));
    assert!(world.ai_statuses().is_empty());
    // Overbooking still follows the connected player
    assert_eq!(
        world.ai_slots().map(|slot| slot.target_overbooking()).sum::<usize>(),
        2
    );
}

#[test]
fn recycles_vehicles_left_behind() {
    let (world, ids) = world(ring(2000.0, 5.0), params(), 1, 1);
    let world = Arc::new(world);
    let mut behavior = AiBehavior::new(Arc::clone(&world));
    let events = behavior.event_sender();
    events.send(SlotEvent::Connected(ids[0])).unwrap();
    let send = |position: Point3d, velocity: Vector3d, now| {
        events
            .send(SlotEvent::PositionUpdate {
                slot: ids[0],
                status: car(position, velocity),
                timestamp: now,
            })
            .unwrap();
    };

    send(Point3d::new(0.0, 0.0, 0.0), Vector3d::new(10.0, 0.0, 0.0), 0);
    assert_eq!(behavior.tick(0), Ok(1));
    let first = world.ai_statuses()[0].1.position;

    // The player jumps to the far side of the ring once spawn protection is over
    let later = 20_000;
    send(Point3d::new(2000.0, 0.0, 2000.0), Vector3d::new(-10.0, 0.0, 0.0), later);
    assert_eq!(behavior.tick(later), Ok(1));
    let statuses = world.ai_statuses();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].1.position.distance(first) > 1.0);
}
