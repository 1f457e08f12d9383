//! Property tests for the entity lifecycle.
//!
//! Random interleavings of adds, removals and frames must leave the body
//! index, the backend object set and the entity table describing exactly the
//! same entities.

use std::collections::BTreeSet;

use proptest::prelude::*;
use skiff_engine::prelude::*;

struct Pebble {
    at: Vec2,
}

impl GameObject for Pebble {
    fn class_name(&self) -> &str {
        "pebble"
    }

    fn create_body(&self) -> Body {
        Body::circle(1.0, 1.0).with_position(self.at)
    }
}

#[derive(Debug, Clone)]
enum Op {
    Add { x: f64, background: bool },
    /// Remove the n-th live entity (modulo the live count).
    Remove(usize),
    /// Remove an entity that was already removed.
    RemoveStale(usize),
    Frame,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (-50.0f64..50.0, any::<bool>()).prop_map(|(x, background)| Op::Add { x, background }),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::RemoveStale),
        1 => Just(Op::Frame),
    ]
}

fn game() -> Game {
    let config = EngineConfig {
        physics: BackendKind::Naive,
        ..EngineConfig::default()
    };
    GameBuilder::new(config)
        .class(ClassSpec::new("pebble").collides_with(&["pebble"]))
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn index_matches_registered_entities(ops in prop::collection::vec(op(), 1..80)) {
        let mut game = game();
        let mut live: Vec<EntityId> = Vec::new();
        let mut dead: Vec<EntityId> = Vec::new();

        for op in ops {
            match op {
                Op::Add { x, background } => {
                    let entity = game
                        .add_entity(Box::new(Pebble { at: Vec2::new(x, 0.0) }), background)
                        .unwrap();
                    prop_assert!(!live.contains(&entity));
                    live.push(entity);
                }
                Op::Remove(n) if !live.is_empty() => {
                    let entity = live.remove(n % live.len());
                    game.remove_entity(entity).unwrap();
                    dead.push(entity);
                }
                Op::RemoveStale(n) if !dead.is_empty() => {
                    let entity = dead[n % dead.len()];
                    prop_assert!(game.remove_entity(entity).is_err());
                }
                Op::Frame => {
                    let report = game.advance_frame(0.0, 1.0 / 60.0, &KeyState::new()).unwrap();
                    prop_assert_eq!(report.removed, 0);
                }
                _ => {}
            }

            prop_assert!(game.index_is_consistent());
            let registered: BTreeSet<EntityId> = game.entities().collect();
            let expected: BTreeSet<EntityId> = live.iter().copied().collect();
            prop_assert_eq!(registered, expected);
            for &entity in &live {
                let body = game.body_of(entity).unwrap();
                prop_assert_eq!(game.get_entity_from_body(body).unwrap(), entity);
            }
        }
    }
}
