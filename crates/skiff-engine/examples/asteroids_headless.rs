//! Headless asteroids -- a scripted ship flies, turns and shoots through an
//! asteroid field.
//!
//! Run with:
//!   cargo run --example asteroids_headless -p skiff-engine [config.json]
//!
//! Bullets split asteroids inside a begin handler; the post-physics-step
//! hook wraps everything around the screen edges. Frame times are jittered
//! with a seeded RNG so the fixed-step clock has something to absorb.

use std::f64::consts::PI;

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use skiff_engine::logging;
use skiff_engine::prelude::*;

const FRAMES: u32 = 900;
const MIN_ASTEROID_RADIUS: f64 = 12.0;
const BULLET_SPEED: f64 = 420.0;
const BULLET_LIFETIME: f64 = 1.2;
const FIRE_COOLDOWN: f64 = 0.25;
const TURN_RATE: f64 = 3.0;
const THRUST: f64 = 160.0;

// ---------------------------------------------------------------------------
// Game objects
// ---------------------------------------------------------------------------

struct Ship {
    at: Vec2,
    cooldown: f64,
}

impl GameObject for Ship {
    fn class_name(&self) -> &str {
        "ship"
    }

    fn create_body(&self) -> Body {
        Body::kinematic()
            .with_shape(Shape::circle(PRIMARY_SHAPE, 14.0))
            .with_position(self.at)
            .with_angle(PI / 2.0)
    }

    fn children(&self) -> Vec<ChildSprite> {
        vec![ChildSprite::new("flame", Vec2::new(-18.0, 0.0)).hidden()]
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let dt = ctx.dt();
        let input = ctx.input();
        let turn = match (input.is_key_down(Key::Left), input.is_key_down(Key::Right)) {
            (true, false) => TURN_RATE,
            (false, true) => -TURN_RATE,
            _ => 0.0,
        };
        let thrusting = input.is_key_down(Key::Up);
        let firing = input.is_key_down(Key::Space);

        ctx.update_body(|state| {
            state.angular_velocity = turn;
            if thrusting {
                state.velocity += Vec2::from_angle(state.angle) * (THRUST * dt);
            }
        });
        ctx.set_child_visible("flame", thrusting);

        self.cooldown = (self.cooldown - dt).max(0.0);
        if firing && self.cooldown == 0.0 {
            if let Some(state) = ctx.body_state() {
                let forward = Vec2::from_angle(state.angle);
                ctx.spawn(Box::new(Bullet {
                    at: state.position + forward * 20.0,
                    velocity: state.velocity + forward * BULLET_SPEED,
                    age: 0.0,
                }));
                self.cooldown = FIRE_COOLDOWN;
            }
        }
    }
}

struct Bullet {
    at: Vec2,
    velocity: Vec2,
    age: f64,
}

impl GameObject for Bullet {
    fn class_name(&self) -> &str {
        "bullet"
    }

    fn create_body(&self) -> Body {
        Body::circle(0.1, 2.0)
            .with_position(self.at)
            .with_velocity(self.velocity)
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.age += ctx.dt();
        if self.age > BULLET_LIFETIME {
            ctx.remove_self();
        }
    }
}

struct Asteroid {
    at: Vec2,
    velocity: Vec2,
    radius: f64,
}

impl GameObject for Asteroid {
    fn class_name(&self) -> &str {
        "asteroid"
    }

    fn create_body(&self) -> Body {
        Body::circle(self.radius * self.radius * 0.01, self.radius)
            .with_position(self.at)
            .with_velocity(self.velocity)
            .with_angular_velocity(0.5)
    }

    fn cleanup(&mut self) {
        tracing::debug!(radius = self.radius, "asteroid destroyed");
    }
}

// ---------------------------------------------------------------------------
// Collision handlers
// ---------------------------------------------------------------------------

/// A bullet hit an asteroid: both go, and big asteroids split in two.
fn bullet_hits_asteroid(arbiter: &Arbiter, ctx: &mut CollisionContext<'_>) -> bool {
    let asteroid = &arbiter.second;
    ctx.remove_entity(arbiter.first.entity);
    if !ctx.remove_entity(asteroid.entity) {
        return false;
    }

    let radius = asteroid.shape.radius() / 2.0;
    if radius >= MIN_ASTEROID_RADIUS {
        let across = arbiter.normal.perp() * 40.0;
        for side in [1.0, -1.0] {
            ctx.spawn(
                Box::new(Asteroid {
                    at: asteroid.state.position + across.normalize_or_zero() * (radius * side),
                    velocity: asteroid.state.velocity + across * side,
                    radius,
                }),
                false,
            );
        }
    }
    tracing::info!(entity = %asteroid.entity, radius, "asteroid split");
    false
}

fn ship_hits_asteroid(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
    tracing::info!(speed = arbiter.approach_speed(), "ship bumped an asteroid");
    true
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Key script: (first frame, last frame, key).
const SCRIPT: &[(u32, u32, Key)] = &[
    (30, 90, Key::Up),
    (60, 140, Key::Left),
    (100, 400, Key::Space),
    (200, 260, Key::Right),
    (300, 360, Key::Up),
    (450, 800, Key::Space),
    (500, 540, Key::Left),
];

fn main() -> Result<(), anyhow::Error> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => EngineConfig::default(),
    };
    config.gravity = 0.0;
    logging::init(config.debug);

    let (width, height) = config.window_size().unwrap_or((1920, 1080));
    let (width, height) = (width as f64, height as f64);

    let mut game = GameBuilder::new(config)
        .class(
            ClassSpec::new("ship")
                .collides_with(&["asteroid"])
                .on("asteroid", Phase::Begin, ship_hits_asteroid),
        )
        .class(
            ClassSpec::new("bullet")
                .collides_with(&["asteroid"])
                .on("asteroid", Phase::Begin, bullet_hits_asteroid),
        )
        .class(ClassSpec::new("asteroid").collides_with(&["ship", "bullet", "asteroid"]))
        .post_physics_step(move |game: &mut Game| {
            let entities: Vec<EntityId> = game.entities().collect();
            for entity in entities {
                let wrapped = game.update_body(entity, |state| {
                    state.position.x = state.position.x.rem_euclid(width);
                    state.position.y = state.position.y.rem_euclid(height);
                });
                if let Err(err) = wrapped {
                    tracing::warn!(%entity, error = %err, "screen wrap failed");
                }
            }
        })
        .build()?;

    let mut rng = Pcg64::seed_from_u64(7);
    game.add_entity(
        Box::new(Ship {
            at: Vec2::new(width / 2.0, height / 2.0),
            cooldown: 0.0,
        }),
        false,
    )?;
    for _ in 0..6 {
        let at = Vec2::new(rng.gen_range(0.0..width), rng.gen_range(0.0..height / 3.0));
        let velocity = Vec2::from_angle(rng.gen_range(0.0..2.0 * PI)) * rng.gen_range(20.0..80.0);
        game.add_entity(
            Box::new(Asteroid {
                at,
                velocity,
                radius: 48.0,
            }),
            false,
        )?;
    }

    let mut input = KeyState::new();
    let mut now = 0.0;
    let mut totals = FrameReport::default();
    for frame in 0..FRAMES {
        input.clear();
        for &(first, last, key) in SCRIPT {
            if (first..=last).contains(&frame) {
                input.press(key);
            }
        }

        let elapsed = rng.gen_range(1.0 / 75.0..1.0 / 45.0);
        now += elapsed;
        let report = game.advance_frame(now, elapsed, &input)?;
        totals.steps += report.steps;
        totals.removed += report.removed;
        totals.spawned += report.spawned;
        totals.skipped_contacts += report.skipped_contacts;
        totals.degenerate += report.degenerate;
    }

    let asteroids = game
        .entities()
        .filter(|&e| game.class_of(e) == Some("asteroid"))
        .count();
    tracing::info!(
        frames = FRAMES,
        steps = totals.steps,
        sim_time = game.sim_time(),
        spawned = totals.spawned,
        removed = totals.removed,
        skipped_contacts = totals.skipped_contacts,
        asteroids,
        "asteroids run finished"
    );
    Ok(())
}
