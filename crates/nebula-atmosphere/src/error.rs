//! Error types for the scattering pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::compositor::CompositorState;

/// Errors raised while loading or looking up compute programs.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("program '{name}' not found in library")]
    NotLoaded { name: String },

    #[error("program file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("no program directory configured for file-based loading")]
    NoProgramDir,

    #[error("failed to read program file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the frame compositor.
#[derive(Debug, Error)]
pub enum AtmosphereError {
    /// A program the pipeline cannot run without is missing. Fatal.
    #[error("required program '{name}' is missing")]
    MissingProgram { name: String },

    /// A frame hook was invoked before initialization completed.
    #[error("compositor is not ready (state: {state:?})")]
    NotReady { state: CompositorState },

    /// Color and depth targets handed to the fog pass disagree in size.
    #[error("target size mismatch: color {color:?}, depth {depth:?}")]
    TargetSizeMismatch { color: (u32, u32), depth: (u32, u32) },

    #[error(transparent)]
    Program(#[from] ProgramError),
}
