use std::env;
use std::path::Path;
use std::process::ExitCode;

use engine::visual::{AnimationPlayback, SpriteHandle, VisualFactory};
use engine::{resolve_game_dir, Background, BlendMode, Formula, ResourceCache, Stage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod hooks;
mod input;
mod player;

use config::{load_config, DEFAULT_CONFIG_FILE};
use hooks::{BonusKind, GameHooks};
use input::KeyState;
use player::{Player, PlayerSpeeds, PlayerState};

const SAMPLE_INTERVAL_FRAMES: u32 = 60;
const SCRIPTED_COLLISION_FRAME: u32 = 300;
const RNG_SEED: u64 = 0x5454_4831;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "run_failed");
            ExitCode::FAILURE
        }
    }
}

/// Headless inspection run: decode the configured stage, then step its
/// background script and a scripted player for a fixed number of logical
/// frames, sampling state along the way.
fn run() -> Result<(), String> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = load_config(Path::new(&config_path))?;

    let game_dir = match resolve_game_dir().map_err(|error| error.to_string())? {
        Some(dir) => Some(dir),
        None => config.game_dir.clone(),
    };

    let mut cache = ResourceCache::new(game_dir);
    let patterns: Vec<&str> = config.archives.iter().map(String::as_str).collect();
    cache
        .register_sources(&patterns)
        .map_err(|error| format!("register archive sources: {error}"))?;

    let stage_name = format!("stage{}.std", config.stage);
    let stage = cache
        .get::<Stage>(&stage_name)
        .map_err(|error| format!("load {stage_name}: {error}"))?;
    {
        let stage = stage.borrow();
        info!(
            name = %stage.name,
            objects = stage.objects.len(),
            placements = stage.instances.len(),
            script_events = stage.script.len(),
            "stage_loaded"
        );
    }

    let mut background = Background::new(stage);
    let speeds = PlayerSpeeds {
        unfocused: config.player.unfocused_speed,
        unfocused_diagonal: config.player.unfocused_diagonal_speed,
        focused: config.player.focused_speed,
        focused_diagonal: config.player.focused_diagonal_speed,
    };
    let state = PlayerState::new(0, 0, config.player.power, config.player.lives, config.player.bombs);
    let mut player = Player::new(
        state,
        speeds,
        config.player.hitbox_size,
        config.player.graze_hitbox_size,
        Box::new(SilentVisuals),
    );
    info!(
        character = player.state.character,
        hitbox = player.hitbox_half_size() * 2.0,
        graze_hitbox = player.graze_hitbox_half_size() * 2.0,
        lives = player.state.lives,
        bombs = player.state.bombs,
        power = player.state.power,
        "player_spawned"
    );
    let mut hooks = InspectionHooks::new(RNG_SEED);

    for frame in 0..config.frames {
        background.update(frame);
        if frame == SCRIPTED_COLLISION_FRAME {
            player.collide(frame, &mut hooks);
        }
        player.update(frame, scripted_keystate(frame), &mut hooks);
        if frame % SAMPLE_INTERVAL_FRAMES == 0 {
            info!(
                frame,
                view = ?background.position_interpolator.values(),
                view2 = ?background.position2_interpolator.values(),
                fog = ?background.fog_interpolator.values(),
                player_x = player.state.x,
                player_y = player.state.y,
                dying = player.death_time() != 0,
                "frame_sample"
            );
        }
    }

    info!(
        frames = config.frames,
        shots = hooks.shots,
        bonuses = hooks.bonuses,
        bullet_cancels = hooks.bullet_cancels,
        lives = player.state.lives,
        score = player.state.score,
        graze = player.state.graze,
        points = player.state.points,
        "run_complete"
    );
    Ok(())
}

/// Exercises the whole movement table plus focus and fire over a repeating
/// eight-second loop.
fn scripted_keystate(frame: u32) -> KeyState {
    let phase = (frame / 60) % 8;
    let mask = match phase {
        0 => KeyState::RIGHT | KeyState::SHOOT,
        1 => KeyState::RIGHT | KeyState::DOWN,
        2 => KeyState::DOWN | KeyState::FOCUS,
        3 => KeyState::LEFT | KeyState::DOWN | KeyState::FOCUS,
        4 => KeyState::LEFT | KeyState::SHOOT,
        5 => KeyState::LEFT | KeyState::UP,
        6 => KeyState::UP | KeyState::SHOOT | KeyState::FOCUS,
        _ => KeyState::RIGHT | KeyState::UP,
    };
    KeyState::empty().with(mask)
}

/// No-op visual backend for headless runs.
struct SilentVisuals;

struct SilentSprite;

struct SilentPlayback;

impl VisualFactory for SilentVisuals {
    fn instantiate(
        &mut self,
        script_index: u16,
    ) -> (Box<dyn SpriteHandle>, Box<dyn AnimationPlayback>) {
        debug!(script_index, "player_animation_selected");
        (Box::new(SilentSprite), Box::new(SilentPlayback))
    }
}

impl SpriteHandle for SilentSprite {
    fn set_color(&mut self, _r: u8, _g: u8, _b: u8) {}
    fn set_alpha(&mut self, _alpha: u8) {}
    fn set_mirrored(&mut self, _mirrored: bool) {}
    fn set_blend_mode(&mut self, _mode: BlendMode) {}
    fn set_rescale(&mut self, _x: f32, _y: f32) {}
    fn fade(&mut self, _duration: u32, _alpha: u8, _formula: Formula) {}
    fn scale_in(&mut self, _duration: u32, _x: f32, _y: f32, _formula: Formula) {}
}

impl AnimationPlayback for SilentPlayback {
    fn advance_one_frame(&mut self) -> bool {
        true
    }

    fn interrupt(&mut self, _signal_id: u16) {}
}

/// Counts the player's outbound calls and owns the seeded PRNG, standing in
/// for the full game loop.
struct InspectionHooks {
    rng: StdRng,
    shots: u32,
    bonuses: u32,
    bullet_cancels: u32,
}

impl InspectionHooks {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            shots: 0,
            bonuses: 0,
            bullet_cancels: 0,
        }
    }
}

impl GameHooks for InspectionHooks {
    fn spawn_death_effect(&mut self, x: f32, y: f32) {
        info!(x, y, "player_death_effect");
    }

    fn spawn_particle(&mut self, _x: f32, _y: f32) {}

    fn modify_difficulty(&mut self, delta: i32) {
        info!(delta, "difficulty_adjusted");
    }

    fn drop_bonus(&mut self, _x: f32, _y: f32, kind: BonusKind, end_x: f32, end_y: f32) {
        self.bonuses += 1;
        debug!(?kind, end_x, end_y, "bonus_dropped");
    }

    fn cancel_bullets(&mut self) {
        self.bullet_cancels += 1;
    }

    fn fire(&mut self, _x: f32, _y: f32) {
        self.shots += 1;
    }

    fn rand_double(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
