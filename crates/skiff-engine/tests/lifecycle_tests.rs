//! Entity lifecycle and collision dispatch tests.
//!
//! Every scenario that does not depend on solver-specific behavior runs on
//! both backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use skiff_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A game object that is nothing but a class name and a body.
struct Thing {
    class: &'static str,
    body: Body,
}

impl Thing {
    fn boxed(class: &'static str, body: Body) -> Box<dyn GameObject> {
        Box::new(Thing { class, body })
    }
}

impl GameObject for Thing {
    fn class_name(&self) -> &str {
        self.class
    }

    fn create_body(&self) -> Body {
        self.body.clone()
    }
}

fn build(kind: BackendKind, specs: Vec<ClassSpec>) -> Game {
    let config = EngineConfig {
        physics: kind,
        gravity: 0.0,
        ..EngineConfig::default()
    };
    specs
        .into_iter()
        .fold(GameBuilder::new(config), GameBuilder::class)
        .build()
        .expect("game should build")
}

fn frame(game: &mut Game) -> FrameReport {
    game.advance_frame(0.0, 1.0 / 30.0, &KeyState::new())
        .expect("frame should advance")
}

// ---------------------------------------------------------------------------
// Removal inside a handler
// ---------------------------------------------------------------------------

static ASTEROID_HITS: AtomicUsize = AtomicUsize::new(0);

fn destroy_asteroid(arbiter: &Arbiter, ctx: &mut CollisionContext<'_>) -> bool {
    ASTEROID_HITS.fetch_add(1, Ordering::SeqCst);
    assert!(ctx.resolve(arbiter.second.body).is_ok());
    ctx.remove_entity(arbiter.second.entity);
    // A second request for the same entity is ignored.
    assert!(!ctx.remove_entity(arbiter.second.entity));
    assert!(ctx.resolve(arbiter.second.body).is_err());
    false
}

#[test]
fn handler_removal_is_deferred_and_consistent() {
    for kind in BackendKind::ALL {
        ASTEROID_HITS.store(0, Ordering::SeqCst);
        let mut game = build(
            kind,
            vec![
                ClassSpec::new("asteroid").collides_with(&["bullet"]),
                ClassSpec::new("bullet")
                    .collides_with(&["asteroid"])
                    .on("asteroid", Phase::Begin, destroy_asteroid),
            ],
        );
        let asteroid = game
            .add_entity(Thing::boxed("asteroid", Body::circle(4.0, 2.0)), false)
            .unwrap();
        let asteroid_body = game.body_of(asteroid).unwrap();
        let bullets: Vec<EntityId> = [Vec2::new(1.5, 0.0), Vec2::new(-1.5, 0.0), Vec2::new(0.0, 1.5)]
            .into_iter()
            .map(|at| {
                game.add_entity(
                    Thing::boxed("bullet", Body::circle(0.1, 0.5).with_position(at)),
                    false,
                )
                .unwrap()
            })
            .collect();

        let report = frame(&mut game);
        assert_eq!(report.removed, 1, "{kind}");
        assert_eq!(ASTEROID_HITS.load(Ordering::SeqCst), 1, "{kind}");
        assert!(!game.contains(asteroid));
        assert!(matches!(
            game.get_entity_from_body(asteroid_body),
            Err(LifecycleError::UnknownBody { .. })
        ));
        for bullet in &bullets {
            assert!(game.contains(*bullet));
        }
        assert!(game.index_is_consistent(), "{kind}");

        // Later frames keep running with the asteroid gone.
        for _ in 0..5 {
            frame(&mut game);
        }
        assert_eq!(game.entity_count(), 3);
        assert!(game.index_is_consistent());
    }
}

// ---------------------------------------------------------------------------
// One-sided declarations
// ---------------------------------------------------------------------------

static GHOST_CONTACTS: AtomicUsize = AtomicUsize::new(0);

fn count_ghost(_: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    GHOST_CONTACTS.fetch_add(1, Ordering::SeqCst);
    true
}

#[test]
fn one_sided_declaration_never_pairs() {
    for kind in BackendKind::ALL {
        let mut game = build(
            kind,
            vec![
                ClassSpec::new("wall"),
                ClassSpec::new("ghost")
                    .collides_with(&["wall"])
                    .on("wall", Phase::Begin, count_ghost)
                    .on("wall", Phase::PreSolve, count_ghost),
            ],
        );
        game.add_entity(
            Thing::boxed(
                "wall",
                Body::fixed().with_shape(Shape::segment(
                    PRIMARY_SHAPE,
                    Vec2::new(5.0, -10.0),
                    Vec2::new(5.0, 10.0),
                    0.5,
                )),
            ),
            false,
        )
        .unwrap();
        let ghost = game
            .add_entity(
                Thing::boxed(
                    "ghost",
                    Body::circle(1.0, 1.0).with_velocity(Vec2::new(10.0, 0.0)),
                ),
                false,
            )
            .unwrap();

        for _ in 0..30 {
            frame(&mut game);
        }
        assert_eq!(GHOST_CONTACTS.load(Ordering::SeqCst), 0, "{kind}");
        let x = game.body_state(ghost).unwrap().position.x;
        assert!(x > 8.0, "{kind}: ghost should pass the wall, got x={x}");
    }
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

fn reject(_: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    false
}

#[test]
fn rejected_pre_solve_lets_bodies_pass() {
    for kind in BackendKind::ALL {
        let mut game = build(
            kind,
            vec![
                ClassSpec::new("wall").collides_with(&["drop"]),
                ClassSpec::new("drop")
                    .collides_with(&["wall"])
                    .on("wall", Phase::PreSolve, reject),
            ],
        );
        game.add_entity(
            Thing::boxed(
                "wall",
                Body::fixed().with_shape(Shape::segment(
                    PRIMARY_SHAPE,
                    Vec2::new(5.0, -10.0),
                    Vec2::new(5.0, 10.0),
                    0.5,
                )),
            ),
            false,
        )
        .unwrap();
        let drop = game
            .add_entity(
                Thing::boxed(
                    "drop",
                    Body::circle(1.0, 1.0).with_velocity(Vec2::new(10.0, 0.0)),
                ),
                false,
            )
            .unwrap();
        for _ in 0..30 {
            frame(&mut game);
        }
        let x = game.body_state(drop).unwrap().position.x;
        assert!(x > 8.0, "{kind}: got x={x}");
    }
}

/// Phases seen by the ghost-wall handlers, with the ghost's x position.
static GHOST_PHASES: Mutex<Vec<(Phase, f64)>> = Mutex::new(Vec::new());

fn log_ghost(phase: Phase, arbiter: &Arbiter) {
    GHOST_PHASES
        .lock()
        .unwrap()
        .push((phase, arbiter.first.state.position.x));
}

fn ghost_begin(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    log_ghost(Phase::Begin, arbiter);
    false
}

fn ghost_pre_solve(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    log_ghost(Phase::PreSolve, arbiter);
    true
}

fn ghost_post_solve(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    log_ghost(Phase::PostSolve, arbiter);
    true
}

fn ghost_separate(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    log_ghost(Phase::Separate, arbiter);
    true
}

#[test]
fn rejected_begin_ignores_contact_until_real_separation() {
    for kind in BackendKind::ALL {
        GHOST_PHASES.lock().unwrap().clear();
        let mut game = build(
            kind,
            vec![
                ClassSpec::new("wall").collides_with(&["ghost"]),
                ClassSpec::new("ghost")
                    .collides_with(&["wall"])
                    .on("wall", Phase::Begin, ghost_begin)
                    .on("wall", Phase::PreSolve, ghost_pre_solve)
                    .on("wall", Phase::PostSolve, ghost_post_solve)
                    .on("wall", Phase::Separate, ghost_separate),
            ],
        );
        game.add_entity(
            Thing::boxed(
                "wall",
                Body::fixed().with_shape(Shape::segment(
                    PRIMARY_SHAPE,
                    Vec2::new(5.0, -10.0),
                    Vec2::new(5.0, 10.0),
                    0.5,
                )),
            ),
            false,
        )
        .unwrap();
        let ghost = game
            .add_entity(
                Thing::boxed(
                    "ghost",
                    Body::circle(1.0, 1.0).with_velocity(Vec2::new(10.0, 0.0)),
                ),
                false,
            )
            .unwrap();
        for _ in 0..30 {
            frame(&mut game);
        }

        let log = GHOST_PHASES.lock().unwrap().clone();
        let phases: Vec<Phase> = log.iter().map(|&(phase, _)| phase).collect();
        assert_eq!(phases, vec![Phase::Begin, Phase::Separate], "{kind}: {log:?}");
        // The ghost (radius 1) clears the wall (x = 5, radius 0.5) at x = 6.5.
        let (_, separated_at) = log[1];
        assert!(separated_at > 6.4, "{kind}: separated while overlapping at x={separated_at}");
        let x = game.body_state(ghost).unwrap().position.x;
        assert!(x > 8.0, "{kind}: ghost should pass the wall, got x={x}");
        let velocity = game.body_state(ghost).unwrap().velocity;
        assert!(
            (velocity.x - 10.0).abs() < 1e-4 && velocity.y.abs() < 1e-4,
            "{kind}: no response expected, got {velocity:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// Lifecycle errors
// ---------------------------------------------------------------------------

#[test]
fn removing_twice_is_an_error() {
    let mut game = build(BackendKind::Solver, vec![ClassSpec::new("rock")]);
    let rock = game
        .add_entity(Thing::boxed("rock", Body::circle(1.0, 1.0)), false)
        .unwrap();
    game.remove_entity(rock).unwrap();
    let err = game.remove_entity(rock).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Lifecycle(LifecycleError::UnknownEntity { .. })
    ));
}

#[test]
fn invalid_bodies_are_rejected_without_side_effects() {
    let mut game = build(BackendKind::Naive, vec![ClassSpec::new("rock")]);
    let err = game
        .add_entity(Thing::boxed("rock", Body::dynamic(1.0)), false)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Lifecycle(LifecycleError::Physics(PhysicsError::NoShapes { .. }))
    ));
    let err = game
        .add_entity(Thing::boxed("rock", Body::circle(-1.0, 1.0)), false)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Lifecycle(LifecycleError::Physics(PhysicsError::InvalidMass { .. }))
    ));
    assert_eq!(game.entity_count(), 0);
    assert!(game.index_is_consistent());
}

#[test]
fn recycled_ids_do_not_alias() {
    let mut game = build(BackendKind::Naive, vec![ClassSpec::new("rock")]);
    let first = game
        .add_entity(Thing::boxed("rock", Body::circle(1.0, 1.0)), false)
        .unwrap();
    game.remove_entity(first).unwrap();
    let second = game
        .add_entity(Thing::boxed("rock", Body::circle(1.0, 1.0)), false)
        .unwrap();
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert!(!game.contains(first));
    assert!(game.remove_entity(first).is_err());
}

#[test]
fn undeclared_collider_fails_the_build() {
    let err = GameBuilder::new(EngineConfig::default())
        .class(ClassSpec::new("ship").collides_with(&["asteroid"]))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Registry(CoreError::UndeclaredCollider { .. })
    ));
}

#[test]
fn invalid_config_fails_the_build() {
    let config = EngineConfig {
        fps: 0,
        ..EngineConfig::default()
    };
    let err = GameBuilder::new(config).build().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidRate { .. })
    ));

    let err = EngineConfig::from_json_str(r#"{ "physics": "box2d" }"#).unwrap_err();
    assert!(err.to_string().contains("box2d"));
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

#[test]
fn non_finite_state_is_skipped_for_the_frame() {
    let mut game = build(BackendKind::Naive, vec![ClassSpec::new("rock")]);
    let broken = game
        .add_entity(Thing::boxed("rock", Body::circle(1.0, 1.0)), false)
        .unwrap();
    let fine = game
        .add_entity(
            Thing::boxed(
                "rock",
                Body::circle(1.0, 1.0).with_velocity(Vec2::new(3.0, 0.0)),
            ),
            false,
        )
        .unwrap();
    game.update_body(broken, |s| s.position = Vec2::new(f64::NAN, 0.0))
        .unwrap();

    let report = frame(&mut game);
    assert_eq!(report.degenerate, 1);
    assert_eq!(game.drawable(broken).unwrap().position, Vec2::ZERO);
    assert!(game.drawable(fine).unwrap().position.x > 0.0);
}

#[test]
fn rotation_follows_body_angle() {
    use std::f64::consts::PI;

    let mut game = build(BackendKind::Naive, vec![ClassSpec::new("ship")]);
    let ship = game
        .add_entity(
            Thing::boxed(
                "ship",
                Body::kinematic().with_shape(Shape::circle(PRIMARY_SHAPE, 1.0)),
            ),
            false,
        )
        .unwrap();
    for (angle, expected) in [(0.0, 180.0), (PI / 2.0, 90.0), (PI, 0.0), (1.5 * PI, 270.0)] {
        game.update_body(ship, |s| s.angle = angle).unwrap();
        frame(&mut game);
        let rotation = game.drawable(ship).unwrap().rotation;
        assert!(
            (rotation - expected).abs() < 1e-9,
            "angle {angle}: expected {expected}, got {rotation}"
        );
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

static CLEANUPS: AtomicUsize = AtomicUsize::new(0);

/// Lives for a fixed number of frames, spawning a background marker on the
/// way out.
struct Fuse {
    frames_left: u32,
}

impl GameObject for Fuse {
    fn class_name(&self) -> &str {
        "fuse"
    }

    fn create_body(&self) -> Body {
        Body::circle(1.0, 0.5)
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.frames_left = self.frames_left.saturating_sub(1);
        if self.frames_left == 0 {
            ctx.remove_self();
            ctx.remove_self();
            ctx.spawn_background(Thing::boxed("fuse", Body::circle(1.0, 0.5)));
        }
    }

    fn cleanup(&mut self) {
        CLEANUPS.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn update_requests_apply_after_the_frame() {
    let mut game = build(BackendKind::Naive, vec![ClassSpec::new("fuse")]);
    let fuse = game
        .add_entity(Box::new(Fuse { frames_left: 3 }), false)
        .unwrap();
    frame(&mut game);
    frame(&mut game);
    assert!(game.contains(fuse));

    let report = frame(&mut game);
    assert_eq!(report.removed, 1);
    assert_eq!(report.spawned, 1);
    assert!(!game.contains(fuse));
    assert_eq!(CLEANUPS.load(Ordering::SeqCst), 1);
    assert_eq!(game.drawables(RenderLayer::Background).count(), 1);
    assert!(game.backend().objects().is_empty());
    assert!(game.index_is_consistent());
}

#[test]
fn nearest_point_query_finds_entities() {
    for kind in BackendKind::ALL {
        let mut game = build(
            kind,
            vec![ClassSpec::new("floor"), ClassSpec::new("drop")],
        );
        let floor = game
            .add_entity(
                Thing::boxed(
                    "floor",
                    Body::fixed().with_shape(Shape::segment(
                        PRIMARY_SHAPE,
                        Vec2::new(0.0, 0.0),
                        Vec2::new(100.0, 0.0),
                        2.0,
                    )),
                ),
                false,
            )
            .unwrap();
        game.add_entity(
            Thing::boxed(
                "drop",
                Body::circle(1.0, 1.0).with_position(Vec2::new(50.0, 4.0)),
            ),
            false,
        )
        .unwrap();

        let floors = game.categories(&["floor"]).unwrap();
        assert_eq!(
            game.point_query_nearest(Vec2::new(50.0, 4.5), 10.0, floors),
            Some(floor)
        );
        assert_eq!(
            game.point_query_nearest(Vec2::new(50.0, 40.0), 10.0, floors),
            None
        );
    }
}
