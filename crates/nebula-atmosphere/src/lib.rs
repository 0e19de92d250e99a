//! Single-scattering atmosphere: lookup tables, height fog, light shafts and
//! lighting feedback for a host renderer.
//!
//! Slow tables (particle density, light colors, skybox volumes) are rebuilt
//! on demand and published atomically. Per-frame work is driven through the
//! [`RenderStageHandler`] hooks implemented by [`FrameCompositor`].

mod buffer;
mod compositor;
mod density;
pub mod dispatch;
mod error;
mod feedback;
pub mod fog;
mod frustum;
pub mod light_shafts;
pub mod light_table;
pub mod model;
pub mod params;
mod probe;
pub mod program;
mod publish;
pub mod random;
pub mod skybox;
mod stage;
mod validation;
mod volume;

pub use buffer::{Buffer2d, ColorBuffer, DepthBuffer, Texel};
pub use compositor::{CompositorState, FrameCompositor, FrameStage, LutSet, PipelineVariant};
pub use density::ParticleDensityTable;
pub use dispatch::default_workers;
pub use error::{AtmosphereError, ProgramError};
pub use feedback::{
    AmbientLight, DirectionalLight, FeedbackLightingUpdater, FeedbackSample, LightingState,
    SceneLighting, split_color,
};
pub use fog::{CompositeSettings, FogEvaluator, FogFrame, OptimizedFog, ReferenceFog, composite};
pub use frustum::{CameraState, FrustumCorners, FrustumVolumes, pixel_uv};
pub use light_shafts::{LightShaftChain, ShadowMap, Unshadowed};
pub use light_table::{LightColorTable, LightColorTables};
pub use params::{AtmosphereParameters, ScatteringUniform};
pub use probe::{CubeFace, ReflectionProbe};
pub use program::{ProgramHandle, ProgramLibrary, ProgramOrigin};
pub use publish::Published;
pub use random::{DitherPattern, RandomDirectionTable};
pub use skybox::{SkyboxVolumes, SunDisc};
pub use stage::{
    CommandList, DrawOp, FullscreenQuad, InsertionPoint, PostOpaque, PreRender,
    RenderStageHandler,
};
pub use validation::{SceneSetup, ValidationIssue, ValidationReport};
pub use volume::Volume3;
