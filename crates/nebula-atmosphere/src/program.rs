//! Compute program registry with file loading and hot-reload.
//!
//! The pipeline treats program execution as opaque: each stage names the
//! program it runs and the library answers whether it is available. Built-in
//! programs are backed by the CPU kernels in this crate; programs loaded from
//! source or file carry their text for the host renderer to compile.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use tracing::{debug, info};

use crate::error::ProgramError;

pub const PARTICLE_DENSITY: &str = "atmosphere/particle_density";
pub const LIGHT_COLOR_AMBIENT: &str = "atmosphere/light_color_ambient";
pub const LIGHT_COLOR_DIRECTIONAL: &str = "atmosphere/light_color_directional";
pub const SKYBOX_LUT: &str = "atmosphere/skybox_lut";
pub const FRUSTUM_LUT: &str = "atmosphere/frustum_lut";
pub const LIGHT_SHAFTS: &str = "atmosphere/light_shafts";
pub const BILATERAL_BLUR: &str = "atmosphere/bilateral_blur";
pub const FOG_COMPOSITE: &str = "atmosphere/fog_composite";
pub const SKYBOX: &str = "atmosphere/skybox";

/// Programs the compositor refuses to initialize without.
pub const REQUIRED_PROGRAMS: [&str; 9] = [
    PARTICLE_DENSITY,
    LIGHT_COLOR_AMBIENT,
    LIGHT_COLOR_DIRECTIONAL,
    SKYBOX_LUT,
    FRUSTUM_LUT,
    LIGHT_SHAFTS,
    BILATERAL_BLUR,
    FOG_COMPOSITE,
    SKYBOX,
];

/// Where a program came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramOrigin {
    /// CPU reference kernel compiled into this crate.
    Builtin,
    /// Source text handed in by the host.
    Source(String),
    /// Source text read from a file in the program directory.
    File { path: PathBuf, source: String },
}

/// A named, loaded program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHandle {
    pub name: String,
    pub origin: ProgramOrigin,
}

/// Central registry for programs with hot-reload support.
#[derive(Default)]
pub struct ProgramLibrary {
    programs: HashMap<String, Arc<ProgramHandle>>,
    program_dir: Option<PathBuf>,
}

impl ProgramLibrary {
    /// Create a new empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with every program in [`REQUIRED_PROGRAMS`] bound to its CPU kernel.
    pub fn with_builtin_programs() -> Self {
        let mut library = Self::new();
        for name in REQUIRED_PROGRAMS {
            library.insert(name, ProgramOrigin::Builtin);
        }
        library
    }

    /// Set the directory to load program files from.
    pub fn with_program_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.program_dir = Some(dir.into());
        self
    }

    fn insert(&mut self, name: &str, origin: ProgramOrigin) -> Arc<ProgramHandle> {
        let handle = Arc::new(ProgramHandle {
            name: name.to_string(),
            origin,
        });
        if self.programs.insert(name.to_string(), handle.clone()).is_some() {
            info!("Replaced program '{}'", name);
        } else {
            debug!("Registered program '{}'", name);
        }
        handle
    }

    /// Register a program from a source string.
    pub fn load_from_source(&mut self, name: &str, source: &str) -> Arc<ProgramHandle> {
        self.insert(name, ProgramOrigin::Source(source.to_string()))
    }

    /// Register a program from a file in the program directory.
    pub fn load_from_file(
        &mut self,
        name: &str,
        filename: &str,
    ) -> Result<Arc<ProgramHandle>, ProgramError> {
        let dir = self.program_dir.as_ref().ok_or(ProgramError::NoProgramDir)?;
        let path = dir.join(filename);
        debug!("Loading program '{}' from file: {:?}", name, path);

        if !path.exists() {
            return Err(ProgramError::FileNotFound { path });
        }
        let source = std::fs::read_to_string(&path)?;
        Ok(self.insert(name, ProgramOrigin::File { path, source }))
    }

    /// Re-read a file-backed program. Built-in and source programs are returned unchanged.
    pub fn reload(&mut self, name: &str) -> Result<Arc<ProgramHandle>, ProgramError> {
        let handle = self.require(name)?;
        match &handle.origin {
            ProgramOrigin::File { path, .. } => {
                if !path.exists() {
                    return Err(ProgramError::FileNotFound { path: path.clone() });
                }
                info!("Reloading program '{}'", name);
                let source = std::fs::read_to_string(path)?;
                let path = path.clone();
                Ok(self.insert(name, ProgramOrigin::File { path, source }))
            }
            _ => Ok(handle),
        }
    }

    /// Remove a program, returning it if it was loaded.
    pub fn unload(&mut self, name: &str) -> Option<Arc<ProgramHandle>> {
        self.programs.remove(name)
    }

    /// Get a previously loaded program by name.
    pub fn get(&self, name: &str) -> Option<Arc<ProgramHandle>> {
        self.programs.get(name).cloned()
    }

    /// Like [`get`](Self::get) but with an error for missing programs.
    pub fn require(&self, name: &str) -> Result<Arc<ProgramHandle>, ProgramError> {
        self.get(name).ok_or_else(|| ProgramError::NotLoaded {
            name: name.to_string(),
        })
    }

    /// First entry of [`REQUIRED_PROGRAMS`] that is not loaded.
    pub fn first_missing_required(&self) -> Option<&'static str> {
        REQUIRED_PROGRAMS
            .into_iter()
            .find(|name| !self.programs.contains_key(*name))
    }

    /// Number of loaded programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_starts_empty() {
        let library = ProgramLibrary::new();
        assert!(library.is_empty());
        assert_eq!(library.len(), 0);
        assert_eq!(library.first_missing_required(), Some(PARTICLE_DENSITY));
    }

    #[test]
    fn test_builtin_library_is_complete() {
        let library = ProgramLibrary::with_builtin_programs();
        assert_eq!(library.len(), REQUIRED_PROGRAMS.len());
        assert!(library.first_missing_required().is_none());
        assert_eq!(library.require(FOG_COMPOSITE).unwrap().origin, ProgramOrigin::Builtin);
    }

    #[test]
    fn test_get_returns_same_handle() {
        let library = ProgramLibrary::with_builtin_programs();
        let a = library.get(SKYBOX).unwrap();
        let b = library.get(SKYBOX).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_require_missing_program() {
        let mut library = ProgramLibrary::with_builtin_programs();
        library.unload(LIGHT_SHAFTS);
        let err = library.require(LIGHT_SHAFTS).unwrap_err();
        assert!(matches!(err, ProgramError::NotLoaded { ref name } if name == LIGHT_SHAFTS));
        assert_eq!(library.first_missing_required(), Some(LIGHT_SHAFTS));
    }

    #[test]
    fn test_load_from_source_replaces() {
        let mut library = ProgramLibrary::with_builtin_programs();
        library.load_from_source(SKYBOX, "// custom sky");
        assert_eq!(library.len(), REQUIRED_PROGRAMS.len());
        assert_eq!(
            library.get(SKYBOX).unwrap().origin,
            ProgramOrigin::Source("// custom sky".to_string())
        );
    }

    #[test]
    fn test_load_from_file_without_dir_fails() {
        let mut library = ProgramLibrary::new();
        assert!(matches!(
            library.load_from_file("x", "x.wgsl"),
            Err(ProgramError::NoProgramDir)
        ));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = ProgramLibrary::new().with_program_dir(dir.path());
        assert!(matches!(
            library.load_from_file("x", "missing.wgsl"),
            Err(ProgramError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_reload_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fog.wgsl");
        std::fs::write(&path, "v1").unwrap();

        let mut library = ProgramLibrary::new().with_program_dir(dir.path());
        library.load_from_file(FOG_COMPOSITE, "fog.wgsl").unwrap();

        std::fs::write(&path, "v2").unwrap();
        let reloaded = library.reload(FOG_COMPOSITE).unwrap();
        match &reloaded.origin {
            ProgramOrigin::File { source, .. } => assert_eq!(source, "v2"),
            other => panic!("unexpected origin {other:?}"),
        }
    }

    #[test]
    fn test_reload_builtin_is_noop() {
        let mut library = ProgramLibrary::with_builtin_programs();
        let before = library.get(SKYBOX_LUT).unwrap();
        let after = library.reload(SKYBOX_LUT).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }
}
