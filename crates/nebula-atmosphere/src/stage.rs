//! Host render-loop contract: stage hooks, command lists and the shared quad.

use std::sync::Arc;

use glam::Vec3;

use crate::buffer::{ColorBuffer, DepthBuffer};
use crate::error::AtmosphereError;
use crate::feedback::LightingState;
use crate::frustum::CameraState;
use crate::light_shafts::ShadowMap;

/// Where in the host pipeline a command list is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionPoint {
    BeforeShadowMap,
    BeforeLighting,
    BeforeForwardAlpha,
}

/// Full-screen quad at the far plane, two triangles.
#[derive(Debug, Clone, PartialEq)]
pub struct FullscreenQuad {
    pub vertices: [Vec3; 4],
    pub indices: [u16; 6],
}

impl FullscreenQuad {
    pub fn new() -> Self {
        Self {
            vertices: [
                Vec3::new(-1.0, -1.0, 1.0),
                Vec3::new(-1.0, 1.0, 1.0),
                Vec3::new(1.0, -1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
            ],
            indices: [0, 1, 2, 2, 1, 3],
        }
    }
}

impl Default for FullscreenQuad {
    fn default() -> Self {
        Self::new()
    }
}

/// One program invocation recorded for the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOp {
    /// Program name from the [`ProgramLibrary`](crate::program::ProgramLibrary).
    pub program: &'static str,
    /// Pass within the program, e.g. `"horizontal"`.
    pub pass: &'static str,
    /// Name of the render target written.
    pub target: &'static str,
    /// Target extent in pixels or cells.
    pub extent: (u32, u32),
    /// Geometry drawn, `None` for compute-style passes.
    pub mesh: Option<Arc<FullscreenQuad>>,
}

impl DrawOp {
    pub fn compute(
        program: &'static str,
        pass: &'static str,
        target: &'static str,
        extent: (u32, u32),
    ) -> Self {
        Self {
            program,
            pass,
            target,
            extent,
            mesh: None,
        }
    }

    pub fn fullscreen(
        program: &'static str,
        pass: &'static str,
        target: &'static str,
        extent: (u32, u32),
        quad: &Arc<FullscreenQuad>,
    ) -> Self {
        Self {
            program,
            pass,
            target,
            extent,
            mesh: Some(quad.clone()),
        }
    }
}

/// Ordered draw operations attached at one insertion point.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandList {
    point: InsertionPoint,
    ops: Vec<DrawOp>,
}

impl CommandList {
    pub fn new(point: InsertionPoint) -> Self {
        Self {
            point,
            ops: Vec::new(),
        }
    }

    pub fn point(&self) -> InsertionPoint {
        self.point
    }

    pub fn push(&mut self, op: DrawOp) {
        self.ops.push(op);
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// `(program, pass)` pairs in submission order.
    pub fn passes(&self) -> Vec<(&'static str, &'static str)> {
        self.ops.iter().map(|op| (op.program, op.pass)).collect()
    }
}

/// Per-frame inputs for the pre-render hook.
pub struct PreRender<'a> {
    pub camera: &'a CameraState,
    /// Screen size in pixels.
    pub screen: (u32, u32),
    /// Scene lights; read for the sun direction, written by lighting feedback.
    pub lighting: &'a mut dyn LightingState,
}

/// Targets available after opaque geometry has been drawn.
pub struct PostOpaque<'a> {
    /// Scene color, blended in place by the fog composite.
    pub color: &'a mut ColorBuffer,
    /// Linear depth fraction per pixel.
    pub depth: &'a DepthBuffer,
    /// Sun shadow visibility.
    pub shadow: &'a dyn ShadowMap,
}

/// The three points in the host frame a scattering component hooks into.
pub trait RenderStageHandler {
    /// Before opaque rendering: camera and light state for the frame are known.
    fn on_pre_render(&mut self, frame: PreRender<'_>) -> Result<(), AtmosphereError>;

    /// After opaque geometry is in the color and depth targets.
    fn on_post_opaque(&mut self, targets: PostOpaque<'_>) -> Result<(), AtmosphereError>;

    /// End of frame: release per-frame resources.
    fn on_post_frame(&mut self) -> Result<(), AtmosphereError>;
}
