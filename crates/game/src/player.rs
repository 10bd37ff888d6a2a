use engine::tween::identity;
use engine::visual::{AnimationPlayback, BlendMode, SpriteHandle, VisualFactory};

use crate::hooks::{BonusKind, GameHooks};
use crate::input::KeyState;

pub const PLAYER_START_X: f32 = 192.0;
pub const PLAYER_START_Y: f32 = 384.0;
pub const SPAWN_INVULNERABILITY_FRAMES: u32 = 240;

const RESPAWN_X: f32 = 192.0;
const RESPAWN_Y: f32 = 384.0;
const FIRE_BURST_FRAMES: u32 = 30;

const DEATH_DIFFICULTY_PENALTY: i32 = -1600;
const DEATH_PARTICLE_COUNT: u32 = 16;
const DEATH_POWER_LOSS: u16 = 16;
const PLAIN_BONUS_DROPS: u32 = 5;

// Frame offsets within the death sequence, relative to the collision.
const DEATH_PENALTY_FRAME: u32 = 6;
const DEATH_FADE_OUT_FRAME: u32 = 7;
const RESPAWN_WARP_FRAME: u32 = 32;
const RESPAWN_TOUCHABLE_FRAME: u32 = 61;
const CONTROL_SUSPEND_FRAMES: u32 = 60;
const BULLET_CLEAR_AFTER: u32 = 30;
const DEATH_SEQUENCE_FRAMES: u32 = 90;
const DEATH_FADE_FRAMES: u32 = 26;
const RESPAWN_FADE_FRAMES: u32 = 30;

const FLICKER_PERIOD: u32 = 8;
const FLICKER_BRIGHT_PHASE: u32 = 0;
const FLICKER_DIM_PHASE: u32 = 2;

// Dropped bonuses scatter toward x in [48, 336), y in [-64, 128).
const BONUS_SPREAD_X: f64 = 288.0;
const BONUS_BASE_X: f64 = 48.0;
const BONUS_SPREAD_Y: f64 = 192.0;
const BONUS_BASE_Y: f64 = -64.0;

// Animation script indices for the player sprite sheet.
const ANIM_IDLE: u16 = 0;
const ANIM_TURN_LEFT: u16 = 1;
const ANIM_SETTLE_FROM_LEFT: u16 = 2;
const ANIM_TURN_RIGHT: u16 = 3;
const ANIM_SETTLE_FROM_RIGHT: u16 = 4;

const UP_LEFT: u16 = KeyState::UP | KeyState::LEFT;
const UP_RIGHT: u16 = KeyState::UP | KeyState::RIGHT;
const DOWN_LEFT: u16 = KeyState::DOWN | KeyState::LEFT;
const DOWN_RIGHT: u16 = KeyState::DOWN | KeyState::RIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Facing {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSpeeds {
    pub unfocused: f32,
    pub unfocused_diagonal: f32,
    pub focused: f32,
    pub focused_diagonal: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub character: u8,
    pub score: u64,
    pub lives: i32,
    pub bombs: u8,
    pub power: u16,
    pub graze: u32,
    pub points: u32,
    pub x: f32,
    pub y: f32,
    pub invulnerable_time: u32,
    pub touchable: bool,
    pub focused: bool,
}

impl PlayerState {
    pub fn new(character: u8, score: u64, power: u16, lives: i32, bombs: u8) -> Self {
        Self {
            character,
            score,
            lives,
            bombs,
            power,
            graze: 0,
            points: 0,
            x: PLAYER_START_X,
            y: PLAYER_START_Y,
            invulnerable_time: SPAWN_INVULNERABILITY_FRAMES,
            touchable: true,
            focused: false,
        }
    }
}

/// The player entity: movement, focus, fire and the death/respawn sequence,
/// advanced one logical frame at a time. Everything visual goes through the
/// injected sprite/animation contracts; everything game-global goes through
/// `GameHooks`.
pub struct Player {
    pub state: PlayerState,
    speeds: PlayerSpeeds,
    hitbox_size: f32,
    graze_hitbox_size: f32,
    visuals: Box<dyn VisualFactory>,
    sprite: Box<dyn SpriteHandle>,
    playback: Box<dyn AnimationPlayback>,
    facing: Option<Facing>,
    fire_time: u32,
    death_time: u32,
}

impl Player {
    pub fn new(
        state: PlayerState,
        speeds: PlayerSpeeds,
        hitbox_size: f32,
        graze_hitbox_size: f32,
        mut visuals: Box<dyn VisualFactory>,
    ) -> Self {
        let (sprite, mut playback) = visuals.instantiate(ANIM_IDLE);
        let _ = playback.advance_one_frame();
        Self {
            state,
            speeds,
            hitbox_size,
            graze_hitbox_size,
            visuals,
            sprite,
            playback,
            facing: None,
            fire_time: 0,
            death_time: 0,
        }
    }

    pub fn hitbox_half_size(&self) -> f32 {
        self.hitbox_size / 2.0
    }

    pub fn graze_hitbox_half_size(&self) -> f32 {
        self.graze_hitbox_size / 2.0
    }

    /// Frame of the fatal collision; 0 while alive.
    pub fn death_time(&self) -> u32 {
        self.death_time
    }

    pub fn start_focusing(&mut self) {
        self.state.focused = true;
    }

    pub fn stop_focusing(&mut self) {
        self.state.focused = false;
    }

    /// Entry point for the external collision system. Only takes effect when
    /// the player is touchable, not invulnerable and not already dying.
    pub fn collide(&mut self, frame: u32, hooks: &mut dyn GameHooks) {
        if self.state.invulnerable_time == 0 && self.death_time == 0 && self.state.touchable {
            self.death_time = frame;
            hooks.spawn_death_effect(self.state.x, self.state.y);
            hooks.modify_difficulty(DEATH_DIFFICULTY_PENALTY);
            for _ in 0..DEATH_PARTICLE_COUNT {
                hooks.spawn_particle(self.state.x, self.state.y);
            }
        }
    }

    /// Advances one logical frame. Must be called exactly once per frame, in
    /// the game's stable entity order.
    pub fn update(&mut self, frame: u32, keystate: KeyState, hooks: &mut dyn GameHooks) {
        if self.death_time == 0 || frame - self.death_time > CONTROL_SUSPEND_FRAMES {
            self.run_controls(keystate, hooks);
        }
        if self.death_time != 0 {
            self.run_death_sequence(frame, hooks);
        }
        let _ = self.playback.advance_one_frame();
    }

    fn run_controls(&mut self, keystate: KeyState, hooks: &mut dyn GameHooks) {
        let (speed, diagonal_speed) = if self.state.focused {
            (self.speeds.focused, self.speeds.focused_diagonal)
        } else {
            (self.speeds.unfocused, self.speeds.unfocused_diagonal)
        };
        let (dx, dy) = match keystate.direction_bits() {
            KeyState::UP => (0.0, -speed),
            KeyState::DOWN => (0.0, speed),
            KeyState::LEFT => (-speed, 0.0),
            KeyState::RIGHT => (speed, 0.0),
            UP_LEFT => (-diagonal_speed, -diagonal_speed),
            UP_RIGHT => (diagonal_speed, -diagonal_speed),
            DOWN_LEFT => (-diagonal_speed, diagonal_speed),
            DOWN_RIGHT => (diagonal_speed, diagonal_speed),
            _ => (0.0, 0.0),
        };

        if dx < 0.0 && self.facing != Some(Facing::Left) {
            self.set_anim(ANIM_TURN_LEFT);
            self.facing = Some(Facing::Left);
        } else if dx > 0.0 && self.facing != Some(Facing::Right) {
            self.set_anim(ANIM_TURN_RIGHT);
            self.facing = Some(Facing::Right);
        } else if dx == 0.0 {
            if let Some(facing) = self.facing.take() {
                self.set_anim(match facing {
                    Facing::Left => ANIM_SETTLE_FROM_LEFT,
                    Facing::Right => ANIM_SETTLE_FROM_RIGHT,
                });
            }
        }

        self.state.x += dx;
        self.state.y += dy;

        if !self.state.focused && keystate.contains(KeyState::FOCUS) {
            self.start_focusing();
        } else if self.state.focused && !keystate.contains(KeyState::FOCUS) {
            self.stop_focusing();
        }

        if self.state.invulnerable_time > 0 {
            self.state.invulnerable_time -= 1;
            match self.state.invulnerable_time % FLICKER_PERIOD {
                FLICKER_BRIGHT_PHASE => self.sprite.set_color(255, 255, 255),
                FLICKER_DIM_PHASE => self.sprite.set_color(64, 64, 64),
                _ => {}
            }
        }

        if keystate.contains(KeyState::SHOOT) && self.fire_time == 0 {
            self.fire_time = FIRE_BURST_FRAMES;
        }
        if self.fire_time > 0 {
            hooks.fire(self.state.x, self.state.y);
            self.fire_time -= 1;
        }
    }

    fn run_death_sequence(&mut self, frame: u32, hooks: &mut dyn GameHooks) {
        let time = frame - self.death_time;
        if time == DEATH_PENALTY_FRAME {
            self.state.touchable = false;
            self.state.lives -= 1;
            self.state.power = self.state.power.saturating_sub(DEATH_POWER_LOSS);
            let (end_x, end_y) = bonus_target(hooks);
            hooks.drop_bonus(self.state.x, self.state.y, BonusKind::Point, end_x, end_y);
            for _ in 0..PLAIN_BONUS_DROPS {
                let (end_x, end_y) = bonus_target(hooks);
                hooks.drop_bonus(self.state.x, self.state.y, BonusKind::Power, end_x, end_y);
            }
        } else if time == DEATH_FADE_OUT_FRAME {
            self.sprite.set_mirrored(false);
            self.sprite.set_blend_mode(BlendMode::Normal);
            self.sprite.set_rescale(0.75, 1.5);
            self.sprite.fade(DEATH_FADE_FRAMES, 96, identity);
            self.sprite.scale_in(DEATH_FADE_FRAMES, 0.0, 2.5, identity);
        } else if time == RESPAWN_WARP_FRAME {
            self.state.x = RESPAWN_X;
            self.state.y = RESPAWN_Y;
            self.facing = None;
            let (sprite, playback) = self.visuals.instantiate(ANIM_IDLE);
            self.sprite = sprite;
            self.playback = playback;
            self.sprite.set_alpha(128);
            self.sprite.set_rescale(0.0, 2.5);
            self.sprite.fade(RESPAWN_FADE_FRAMES, 255, identity);
            self.sprite.set_blend_mode(BlendMode::Additive);
            self.sprite.scale_in(RESPAWN_FADE_FRAMES, 1.0, 1.0, identity);
            let _ = self.playback.advance_one_frame();
        } else if time == RESPAWN_TOUCHABLE_FRAME {
            self.state.touchable = true;
            self.state.invulnerable_time = SPAWN_INVULNERABILITY_FRAMES;
            self.sprite.set_blend_mode(BlendMode::Normal);
        }

        // Grace period: keep the field clear while the respawn plays out.
        if time > BULLET_CLEAR_AFTER {
            hooks.cancel_bullets();
        }
        if time > DEATH_SEQUENCE_FRAMES {
            self.death_time = 0;
        }
    }

    fn set_anim(&mut self, script_index: u16) {
        let (sprite, playback) = self.visuals.instantiate(script_index);
        self.sprite = sprite;
        self.playback = playback;
        let _ = self.playback.advance_one_frame();
    }
}

fn bonus_target(hooks: &mut dyn GameHooks) -> (f32, f32) {
    let end_x = (hooks.rand_double() * BONUS_SPREAD_X + BONUS_BASE_X) as f32;
    let end_y = (hooks.rand_double() * BONUS_SPREAD_Y + BONUS_BASE_Y) as f32;
    (end_x, end_y)
}
