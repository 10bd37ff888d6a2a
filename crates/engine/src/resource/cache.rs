use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use crate::formats::FormatError;

use super::archive::{Archive, ContainerFormat, DirectoryArchive};

/// Decode seam between the cache and the per-kind asset decoders. The stage
/// decoder implements this in-crate; animation/script/message/character
/// decoders live with their owning subsystems and implement it there.
pub trait AssetFormat: Sized + 'static {
    fn decode(name: &str, data: &[u8]) -> Result<Self, FormatError>;
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no file matches archive pattern {pattern}")]
    NoSourceMatches { pattern: String },
    #[error("unrecognized archive container at {path}")]
    UnknownContainer { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("asset {name} is not provided by any registered archive")]
    NotRegistered { name: String },
    #[error("asset {name} is indexed but missing from archive {path}")]
    MissingFromArchive { name: String, path: PathBuf },
    #[error("failed to decode asset {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: FormatError,
    },
}

impl ResourceError {
    /// Both "never registered" and "indexed but gone" count as not-found for
    /// callers that only care whether the asset is usable.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered { .. } | Self::MissingFromArchive { .. }
        )
    }
}

struct RegisteredSource {
    label: PathBuf,
    archive: Box<dyn Archive>,
}

/// Resolves logical asset names through registered archive sources and
/// memoizes decoded assets per (kind, name). Lookups after the first return
/// the same shared cell, so every holder observes in-place mutations.
///
/// Not thread-safe: only the simulation thread may touch the cache or the
/// assets it hands out.
pub struct ResourceCache {
    game_dir: Option<PathBuf>,
    container_formats: Vec<Box<dyn ContainerFormat>>,
    sources: Vec<RegisteredSource>,
    known_files: HashMap<String, usize>,
    decoded: HashMap<(TypeId, String), Rc<dyn Any>>,
}

impl ResourceCache {
    pub fn new(game_dir: Option<PathBuf>) -> Self {
        Self {
            game_dir,
            container_formats: Vec::new(),
            sources: Vec::new(),
            known_files: HashMap::new(),
            decoded: HashMap::new(),
        }
    }

    pub fn register_container_format(&mut self, format: Box<dyn ContainerFormat>) {
        self.container_formats.push(format);
    }

    /// Registers an already-open backend. Names already claimed by an earlier
    /// source keep their first owner.
    pub fn register_archive(
        &mut self,
        label: impl Into<PathBuf>,
        archive: Box<dyn Archive>,
    ) -> Result<(), ResourceError> {
        let label = label.into();
        let names = archive.list_names().map_err(|source| ResourceError::Io {
            path: label.clone(),
            source,
        })?;
        let index = self.sources.len();
        for name in &names {
            self.known_files.entry(name.clone()).or_insert(index);
        }
        info!(
            source = %label.display(),
            name_count = names.len(),
            "archive_registered"
        );
        self.sources.push(RegisteredSource { label, archive });
        Ok(())
    }

    /// Resolves each pattern to one concrete archive and indexes its names.
    /// A pattern is a `;`-separated search list; each alternative resolves
    /// against the game dir and may hold one `*` wildcard in its final
    /// component. The first existing match wins; a pattern with no match at
    /// all is an error.
    pub fn register_sources(&mut self, patterns: &[&str]) -> Result<(), ResourceError> {
        for pattern in patterns {
            let path = self.resolve_pattern(pattern)?;
            let archive = self.open_path(&path)?;
            self.register_archive(path, archive)?;
        }
        Ok(())
    }

    fn resolve_pattern(&self, pattern: &str) -> Result<PathBuf, ResourceError> {
        for alternative in pattern.split(';') {
            let alternative = alternative.trim();
            if alternative.is_empty() {
                continue;
            }
            let base = PathBuf::from(alternative);
            let candidate = match &self.game_dir {
                Some(dir) if base.is_relative() => dir.join(&base),
                _ => base,
            };
            if let Some(found) = first_match(&candidate) {
                return Ok(found);
            }
        }
        Err(ResourceError::NoSourceMatches {
            pattern: pattern.to_string(),
        })
    }

    fn open_path(&self, path: &Path) -> Result<Box<dyn Archive>, ResourceError> {
        if path.is_dir() {
            return Ok(Box::new(DirectoryArchive::new(path)));
        }
        let mut file = File::open(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_err() {
            return Err(ResourceError::UnknownContainer {
                path: path.to_path_buf(),
            });
        }
        for format in &self.container_formats {
            if format.magic() == magic {
                return format.open(path).map_err(|source| ResourceError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        Err(ResourceError::UnknownContainer {
            path: path.to_path_buf(),
        })
    }

    /// Returns the decoded asset for `name`, decoding on first request. The
    /// same shared cell is returned for every later call; the cache entry is
    /// only written when decoding succeeds.
    pub fn get<T: AssetFormat>(&mut self, name: &str) -> Result<Rc<RefCell<T>>, ResourceError> {
        let key = (TypeId::of::<T>(), name.to_string());
        if let Some(cached) = self.decoded.get(&key) {
            let cached = Rc::clone(cached);
            return Ok(cached
                .downcast::<RefCell<T>>()
                .expect("decoded entry matches its TypeId key"));
        }

        let source_index =
            *self
                .known_files
                .get(name)
                .ok_or_else(|| ResourceError::NotRegistered {
                    name: name.to_string(),
                })?;
        let source = &self.sources[source_index];
        let bytes = source
            .archive
            .extract(name)
            .map_err(|error| match error.kind() {
                io::ErrorKind::NotFound => ResourceError::MissingFromArchive {
                    name: name.to_string(),
                    path: source.label.clone(),
                },
                _ => ResourceError::Io {
                    path: source.label.clone(),
                    source: error,
                },
            })?;
        let decoded = T::decode(name, &bytes).map_err(|source| ResourceError::Decode {
            name: name.to_string(),
            source,
        })?;
        let asset = Rc::new(RefCell::new(decoded));
        self.decoded.insert(key, asset.clone() as Rc<dyn Any>);
        debug!(name, "asset_decoded");
        Ok(asset)
    }

    /// Decodes `names` in order, stopping at and dropping the first name that
    /// is unknown or fails to decode. Used for trailing optional assets.
    pub fn get_batch_best_effort<T: AssetFormat>(&mut self, names: &[&str]) -> Vec<Rc<RefCell<T>>> {
        let mut assets = Vec::with_capacity(names.len());
        for &name in names {
            match self.get::<T>(name) {
                Ok(asset) => assets.push(asset),
                Err(error) => {
                    debug!(name, error = %error, "optional_asset_skipped");
                    break;
                }
            }
        }
        assets
    }
}

/// First filesystem entry matching `candidate`, which may hold one `*`
/// wildcard in its final component. Matches are taken in sorted name order.
fn first_match(candidate: &Path) -> Option<PathBuf> {
    let name = candidate.file_name().and_then(|name| name.to_str());
    let Some(name) = name else {
        return candidate.exists().then(|| candidate.to_path_buf());
    };
    let Some((prefix, suffix)) = name.split_once('*') else {
        return candidate.exists().then(|| candidate.to_path_buf());
    };
    let parent = candidate.parent().filter(|parent| !parent.as_os_str().is_empty());
    let parent = parent.unwrap_or_else(|| Path::new("."));
    let entries = std::fs::read_dir(parent).ok()?;
    let mut matches: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|entry_name| {
            entry_name.len() >= prefix.len() + suffix.len()
                && entry_name.starts_with(prefix)
                && entry_name.ends_with(suffix)
        })
        .collect();
    matches.sort();
    matches.first().map(|found| parent.join(found))
}
