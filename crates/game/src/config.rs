use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "game.config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Fallback game data directory; the environment override wins.
    #[serde(default)]
    pub game_dir: Option<PathBuf>,
    /// Archive source patterns, registered in order.
    #[serde(default = "default_archives")]
    pub archives: Vec<String>,
    #[serde(default = "default_stage")]
    pub stage: u32,
    /// How many logical frames the inspection run simulates.
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default)]
    pub player: PlayerSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub unfocused_speed: f32,
    pub unfocused_diagonal_speed: f32,
    pub focused_speed: f32,
    pub focused_diagonal_speed: f32,
    pub hitbox_size: f32,
    pub graze_hitbox_size: f32,
    pub lives: i32,
    pub bombs: u8,
    pub power: u16,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_dir: None,
            archives: default_archives(),
            stage: default_stage(),
            frames: default_frames(),
            player: PlayerSettings::default(),
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            unfocused_speed: 4.0,
            unfocused_diagonal_speed: 3.0,
            focused_speed: 2.0,
            focused_diagonal_speed: 1.5,
            hitbox_size: 2.5,
            graze_hitbox_size: 42.0,
            lives: 2,
            bombs: 3,
            power: 0,
        }
    }
}

fn default_archives() -> Vec<String> {
    vec!["*.DAT".to_string()]
}

fn default_stage() -> u32 {
    1
}

fn default_frames() -> u32 {
    600
}

/// Loads the config file, or the built-in defaults when it does not exist.
/// Malformed JSON reports the failing key path.
pub fn load_config(path: &Path) -> Result<GameConfig, String> {
    if !path.exists() {
        info!(path = %path.display(), "config_missing_using_defaults");
        return Ok(GameConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read config '{}': {error}", path.display()))?;
    parse_config_json(&raw)
}

fn parse_config_json(raw: &str) -> Result<GameConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, GameConfig>(&mut deserializer) {
        Ok(config) => Ok(config),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse config json: {source}"))
            } else {
                Err(format!("parse config json at {path}: {source}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = parse_config_json("{}").expect("parse");
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.archives, vec!["*.DAT".to_string()]);
        assert_eq!(config.stage, 1);
    }

    #[test]
    fn partial_player_settings_fill_in() {
        let config =
            parse_config_json(r#"{"stage": 4, "player": {"power": 64}}"#).expect("parse");
        assert_eq!(config.stage, 4);
        assert_eq!(config.player.power, 64);
        assert_eq!(config.player.lives, 2);
    }

    #[test]
    fn type_errors_name_the_failing_key() {
        let error = parse_config_json(r#"{"player": {"lives": "two"}}"#).expect_err("parse");
        assert!(error.contains("player.lives"), "{error}");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("definitely_missing.config.json")).expect("load");
        assert_eq!(config, GameConfig::default());
    }
}
