use std::env;
use std::path::PathBuf;

use thiserror::Error;

pub mod background;
pub mod formats;
pub mod resource;
pub mod tween;
pub mod visual;

pub use background::Background;
pub use formats::{
    FormatError, ObjectPlacement, Quad, Reader, SceneObject, ScriptEvent, ScriptInstruction, Stage,
};
pub use resource::{
    Archive, AssetFormat, ContainerFormat, DirectoryArchive, ResourceCache, ResourceError,
};
pub use tween::{Formula, Interpolator};
pub use visual::{AnimationPlayback, BlendMode, SpriteHandle, VisualFactory};

pub const GAME_DIR_ENV_VAR: &str = "STG_GAME_DIR";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} is set but does not point to a directory: {path}")]
    GameDirMissing { var: &'static str, path: PathBuf },
}

/// Optional game data directory override. `None` means archive patterns
/// resolve against the current working directory.
pub fn resolve_game_dir() -> Result<Option<PathBuf>, StartupError> {
    match env::var(GAME_DIR_ENV_VAR) {
        Ok(value) => {
            let path = PathBuf::from(value);
            if path.is_dir() {
                Ok(Some(path))
            } else {
                Err(StartupError::GameDirMissing {
                    var: GAME_DIR_ENV_VAR,
                    path,
                })
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar {
            var: GAME_DIR_ENV_VAR,
            source,
        }),
    }
}
