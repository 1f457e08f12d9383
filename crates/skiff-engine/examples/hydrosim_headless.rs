//! Headless water simulation -- drops pour onto tilted floors.
//!
//! Run with:
//!   cargo run --example hydrosim_headless -p skiff-engine [config.json]
//!
//! Drops are spawned from the post-physics-step hook and deleted once they
//! leave the screen. A scripted "mouse" places new floors with the left
//! button and deletes the nearest floor with the right button; the arrow
//! keys turn gravity around.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use skiff_engine::logging;
use skiff_engine::prelude::*;

const FRAMES: u32 = 1200;
const MAX_DROPS: usize = 400;
const DROPS_PER_SECOND: f64 = 200.0;
const FLOOR_PICK_DISTANCE: f64 = 250.0;
const GRAVITY: f64 = 900.0;

// ---------------------------------------------------------------------------
// Game objects
// ---------------------------------------------------------------------------

struct Droplet {
    at: Vec2,
    screen: (f64, f64),
}

impl GameObject for Droplet {
    fn class_name(&self) -> &str {
        "drop"
    }

    fn create_body(&self) -> Body {
        Body::circle(1.0, 4.0).with_position(self.at)
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let Some(state) = ctx.body_state() else {
            return;
        };
        let (width, height) = self.screen;
        let p = state.position;
        if p.x < 0.0 || p.x > width || p.y < 0.0 || p.y > height {
            ctx.remove_self();
        }
    }

    fn cleanup(&mut self) {
        LIVE_DROPS.fetch_sub(1, Ordering::Relaxed);
    }
}

static LIVE_DROPS: AtomicUsize = AtomicUsize::new(0);

struct Floor {
    at: Vec2,
    width: f64,
    height: f64,
    tilt: f64,
}

impl Floor {
    fn new(at: Vec2, width: f64, tilt: f64) -> Self {
        Self {
            at,
            width,
            height: 40.0,
            tilt,
        }
    }
}

impl GameObject for Floor {
    fn class_name(&self) -> &str {
        "floor"
    }

    fn create_body(&self) -> Body {
        let half = self.width / 2.0;
        Body::fixed()
            .with_shape(
                Shape::segment(
                    PRIMARY_SHAPE,
                    Vec2::new(-half, 0.0),
                    Vec2::new(half, 0.0),
                    self.height / 2.0,
                )
                .with_elasticity(0.8)
                .with_friction(0.8),
            )
            .with_position(self.at)
            .with_angle(self.tilt)
    }

    fn cleanup(&mut self) {
        tracing::info!(x = self.at.x, y = self.at.y, "floor deleted");
    }
}

// ---------------------------------------------------------------------------
// Scripted input
// ---------------------------------------------------------------------------

enum Action {
    PlaceFloor(Vec2),
    DeleteFloor(Vec2),
    Gravity(Key),
}

fn script(frame: u32) -> Option<Action> {
    match frame {
        240 => Some(Action::PlaceFloor(Vec2::new(600.0, 400.0))),
        360 => Some(Action::DeleteFloor(Vec2::new(1000.0, 260.0))),
        480 => Some(Action::Gravity(Key::Left)),
        600 => Some(Action::Gravity(Key::Up)),
        720 => Some(Action::DeleteFloor(Vec2::new(610.0, 410.0))),
        840 => Some(Action::Gravity(Key::Down)),
        _ => None,
    }
}

fn gravity_for(key: Key) -> Option<Vec2> {
    match key {
        Key::Left => Some(Vec2::new(GRAVITY, 0.0)),
        Key::Right => Some(Vec2::new(-GRAVITY, 0.0)),
        Key::Up => Some(Vec2::new(0.0, -GRAVITY)),
        Key::Down => Some(Vec2::new(0.0, GRAVITY)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => EngineConfig {
            fps: 120,
            ..EngineConfig::default()
        },
    };
    config.fullscreen = true;
    logging::init(config.debug);

    let (width, height) = config.window_size().unwrap_or((1920, 1080));
    let screen = (width as f64, height as f64);
    let spawn_at = Vec2::new(1000.0, 500.0);
    let spawn_interval = 1.0 / DROPS_PER_SECOND;

    let mut game = GameBuilder::new(config)
        .class(ClassSpec::new("drop").collides_with(&["drop", "floor"]))
        .class(ClassSpec::new("floor").collides_with(&["drop"]))
        .build()?;

    // The spawner keeps its own clock in simulated time.
    let mut last_drop = 0.0f64;
    game.set_post_physics_step(move |game: &mut Game| {
        let now = game.sim_time();
        if now - last_drop <= spawn_interval || LIVE_DROPS.load(Ordering::Relaxed) >= MAX_DROPS {
            return;
        }
        last_drop = now;
        match game.add_entity(Box::new(Droplet { at: spawn_at, screen }), false) {
            Ok(_) => {
                LIVE_DROPS.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::warn!(error = %err, "drop spawn failed"),
        }
    });

    let (w, h) = screen;
    let floors = [
        Floor::new(Vec2::new(1000.0, 250.0), 250.0, 10f64.to_radians()),
        Floor::new(Vec2::new(1000.0, 250.0), 250.0, -10f64.to_radians()),
        Floor::new(Vec2::new(w / 2.0, 1.0), w, 0.0),
        Floor::new(Vec2::new(w / 2.0, h), w, 0.0),
        Floor::new(Vec2::new(w, h / 2.0), w, PI / 4.0),
        Floor::new(Vec2::new(1.0, h / 2.0), w, -PI / 4.0),
    ];
    for floor in floors {
        game.add_entity(Box::new(floor), false)?;
    }
    let floor_categories = game.categories(&["floor"])?;

    let mut rng = Pcg64::seed_from_u64(42);
    let input = KeyState::new();
    let mut now = 0.0;
    let mut totals = FrameReport::default();
    for frame in 0..FRAMES {
        match script(frame) {
            Some(Action::PlaceFloor(at)) => {
                let tilt = (30.0 * rng.gen::<f64>() - 15.0).to_radians();
                game.add_entity(Box::new(Floor::new(at, 250.0, tilt)), false)?;
            }
            Some(Action::DeleteFloor(at)) => {
                match game.point_query_nearest(at, FLOOR_PICK_DISTANCE, floor_categories) {
                    Some(floor) => game.remove_entity(floor)?,
                    None => tracing::info!(x = at.x, y = at.y, "no floor near click"),
                }
            }
            Some(Action::Gravity(key)) => {
                if let Some(gravity) = gravity_for(key) {
                    tracing::info!(x = gravity.x, y = gravity.y, "gravity changed");
                    game.set_gravity(gravity);
                }
            }
            None => {}
        }

        let elapsed = rng.gen_range(1.0 / 140.0..1.0 / 100.0);
        now += elapsed;
        let report = game.advance_frame(now, elapsed, &input)?;
        totals.steps += report.steps;
        totals.removed += report.removed;
        totals.degenerate += report.degenerate;
    }

    tracing::info!(
        frames = FRAMES,
        steps = totals.steps,
        sim_time = game.sim_time(),
        drops = LIVE_DROPS.load(Ordering::Relaxed),
        removed = totals.removed,
        degenerate = totals.degenerate,
        entities = game.entity_count(),
        "hydrosim run finished"
    );
    Ok(())
}
