//! Frame orchestration: initialization, LUT publication and the per-frame stages.
//!
//! The compositor moves `Uninitialized -> Initializing -> Ready`. Once ready,
//! each host frame runs the stages in a fixed order:
//!
//! 1. `on_pre_render`: frustum corners, parameter refresh, lighting feedback,
//!    frustum LUT.
//! 2. `on_post_opaque`: light shafts, fog composite.
//! 3. `on_post_frame`: optional reflection probe refresh, per-frame release.
//!
//! Render mode and shaft quality are resolved once per configuration change
//! into a [`PipelineVariant`] and the matching strategy objects.

use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use nebula_config::{Config, LightShaftQuality, RenderMode};
use tracing::{debug, error, info, warn};

use crate::buffer::Buffer2d;
use crate::density::ParticleDensityTable;
use crate::dispatch::default_workers;
use crate::error::AtmosphereError;
use crate::feedback::{FeedbackLightingUpdater, FeedbackSample};
use crate::fog::{CompositeSettings, FogEvaluator, FogFrame, composite, create_evaluator};
use crate::frustum::FrustumCorners;
use crate::light_shafts::{LightShaftChain, ShaftInputs, create_chain};
use crate::light_table::LightColorTables;
use crate::params::{AtmosphereParameters, ScatteringUniform};
use crate::probe::ReflectionProbe;
use crate::program::{
    FOG_COMPOSITE, LIGHT_COLOR_AMBIENT, LIGHT_COLOR_DIRECTIONAL, PARTICLE_DENSITY, ProgramLibrary,
    SKYBOX, SKYBOX_LUT,
};
use crate::publish::Published;
use crate::random::{DitherPattern, RandomDirectionTable};
use crate::skybox::{SkyboxVolumes, SunDisc};
use crate::stage::{
    CommandList, DrawOp, FullscreenQuad, InsertionPoint, PostOpaque, PreRender, RenderStageHandler,
};
use crate::validation::{SceneSetup, ValidationReport, validate};

/// Lifecycle of the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Per-frame sub-stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    ComputeFrustumCorners,
    RefreshParameters,
    RefreshFrustumLut,
    RefreshLightShafts,
    CompositeFog,
    RefreshReflectionProbe,
}

/// The pipeline topology selected by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineVariant {
    pub render_mode: RenderMode,
    /// `None` when light shafts are disabled.
    pub light_shafts: Option<LightShaftQuality>,
}

impl PipelineVariant {
    pub fn from_config(config: &Config) -> Self {
        Self {
            render_mode: config.scattering.render_mode,
            light_shafts: config
                .light_shafts
                .enabled
                .then_some(config.light_shafts.quality),
        }
    }
}

/// Slow-refresh tables, always published together.
#[derive(Debug, Clone, PartialEq)]
pub struct LutSet {
    /// Parameters the tables were built with.
    pub params: AtmosphereParameters,
    pub density: ParticleDensityTable,
    pub lights: LightColorTables,
    pub skybox: SkyboxVolumes,
}

/// Camera-derived state valid for the current frame only.
struct FrameData {
    corners: FrustumCorners,
    camera_height: f32,
    sun_direction: Vec3,
}

const INSERTION_POINTS: [InsertionPoint; 3] = [
    InsertionPoint::BeforeShadowMap,
    InsertionPoint::BeforeLighting,
    InsertionPoint::BeforeForwardAlpha,
];

/// Orchestrates LUT builds and the per-frame scattering stages.
pub struct FrameCompositor {
    state: CompositorState,
    config: Config,
    params: AtmosphereParameters,
    programs: ProgramLibrary,
    luts: Published<Option<LutSet>>,
    directions: RandomDirectionTable,
    dither: DitherPattern,
    quad: Arc<FullscreenQuad>,
    variant: PipelineVariant,
    fog: Box<dyn FogEvaluator>,
    shafts: Option<Box<dyn LightShaftChain>>,
    probe: Option<ReflectionProbe>,
    feedback: FeedbackLightingUpdater,
    commands: [CommandList; 3],
    /// LUT passes recorded between frames, flushed into the next shadow-map list.
    pending_lut_ops: Vec<DrawOp>,
    frame: Option<FrameData>,
    stages: Vec<FrameStage>,
    uniform: Option<ScatteringUniform>,
    last_feedback: Option<FeedbackSample>,
    frames_rendered: u64,
    workers: usize,
}

impl FrameCompositor {
    /// Create an uninitialized compositor. The configuration is sanitized first.
    pub fn new(config: &Config, programs: ProgramLibrary) -> Self {
        let config = config.sanitized();
        let variant = PipelineVariant::from_config(&config);
        Self {
            state: CompositorState::Uninitialized,
            params: AtmosphereParameters::from_config(&config.scattering),
            feedback: FeedbackLightingUpdater::from_config(&config.lighting),
            config,
            programs,
            luts: Published::new(None),
            directions: RandomDirectionTable::new(),
            dither: DitherPattern::new(),
            quad: Arc::new(FullscreenQuad::new()),
            variant,
            fog: create_evaluator(variant.render_mode),
            shafts: None,
            probe: None,
            commands: INSERTION_POINTS.map(CommandList::new),
            pending_lut_ops: Vec::new(),
            frame: None,
            stages: Vec::new(),
            uniform: None,
            last_feedback: None,
            frames_rendered: 0,
            workers: default_workers(),
        }
    }

    /// Limit the number of worker threads used by table builds and passes.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn state(&self) -> CompositorState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn params(&self) -> &AtmosphereParameters {
        &self.params
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    pub fn programs(&self) -> &ProgramLibrary {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramLibrary {
        &mut self.programs
    }

    /// The quad shared by every full-screen draw.
    pub fn quad(&self) -> &Arc<FullscreenQuad> {
        &self.quad
    }

    /// Currently published tables, `None` before the first build.
    pub fn luts(&self) -> Arc<Option<LutSet>> {
        self.luts.load()
    }

    /// Number of LUT sets published so far.
    pub fn lut_generation(&self) -> u64 {
        self.luts.generation()
    }

    /// Whether the configuration changed physical parameters since the last LUT build.
    pub fn luts_stale(&self) -> bool {
        match self.luts.load().as_ref() {
            Some(set) => set.params.requires_lut_rebuild(&self.params),
            None => true,
        }
    }

    pub fn command_list(&self, point: InsertionPoint) -> &CommandList {
        &self.commands[point_index(point)]
    }

    /// Stages executed so far in the current frame.
    pub fn stages(&self) -> &[FrameStage] {
        &self.stages
    }

    /// Uniform block from the last parameter refresh.
    pub fn uniform(&self) -> Option<&ScatteringUniform> {
        self.uniform.as_ref()
    }

    pub fn last_feedback(&self) -> Option<&FeedbackSample> {
        self.last_feedback.as_ref()
    }

    pub fn light_shafts(&self) -> Option<&dyn LightShaftChain> {
        self.shafts.as_deref()
    }

    pub fn reflection_probe(&self) -> Option<&ReflectionProbe> {
        self.probe.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Check programs and build every slow table.
    ///
    /// A missing required program aborts initialization and leaves the
    /// compositor uninitialized.
    pub fn initialize(&mut self) -> Result<(), AtmosphereError> {
        self.state = CompositorState::Initializing;
        info!("Initializing atmospheric scattering");

        if let Some(name) = self.programs.first_missing_required() {
            error!(program = name, "Required program is missing, cannot initialize");
            self.state = CompositorState::Uninitialized;
            return Err(AtmosphereError::MissingProgram {
                name: name.to_string(),
            });
        }

        self.rebuild_luts();
        self.apply_probe_config();
        self.state = CompositorState::Ready;
        info!(variant = ?self.variant, "Atmospheric scattering ready");
        Ok(())
    }

    /// Rebuild density, ambient, directional and skybox tables and publish them as one set.
    pub fn recompute_luts(&mut self) -> Result<(), AtmosphereError> {
        if self.state != CompositorState::Ready {
            return Err(AtmosphereError::NotReady { state: self.state });
        }
        self.rebuild_luts();
        Ok(())
    }

    fn rebuild_luts(&mut self) {
        let started = Instant::now();
        let lut = &self.config.lut;
        let params = self.params.clone();

        let density = ParticleDensityTable::build(
            &params,
            lut.particle_density_size,
            lut.density_integration_steps,
            self.workers,
        );
        let lights = LightColorTables::build(
            &params,
            &density,
            &self.directions,
            lut.light_color_size,
            self.workers,
        );
        let skybox = SkyboxVolumes::build(&params, &density, lut.skybox_size, self.workers);

        let n = lut.particle_density_size;
        let l = lut.light_color_size;
        let [sx, sy, _] = lut.skybox_size;
        self.pending_lut_ops.extend([
            DrawOp::compute(PARTICLE_DENSITY, "integrate", "particle_density", (n, n)),
            DrawOp::compute(LIGHT_COLOR_AMBIENT, "integrate", "light_color_ambient", (l, 1)),
            DrawOp::compute(
                LIGHT_COLOR_DIRECTIONAL,
                "integrate",
                "light_color_directional",
                (l, 1),
            ),
            DrawOp::compute(SKYBOX_LUT, "inscatter", "skybox_volume", (sx, sy)),
        ]);

        self.luts.publish(Some(LutSet {
            params,
            density,
            lights,
            skybox,
        }));
        info!(
            generation = self.luts.generation(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Published atmosphere lookup tables"
        );
    }

    /// Replace the configuration. Per-frame settings apply immediately;
    /// physical changes mark the LUTs stale until [`recompute_luts`](Self::recompute_luts).
    pub fn set_settings(&mut self, config: &Config) {
        self.config = config.sanitized();
        self.params = AtmosphereParameters::from_config(&self.config.scattering);
        self.feedback = FeedbackLightingUpdater::from_config(&self.config.lighting);
        if self.luts_stale() && self.state == CompositorState::Ready {
            warn!("Scattering coefficients changed; lookup tables are stale until recomputed");
        }
        self.apply_variant();
        if self.state == CompositorState::Ready {
            self.apply_probe_config();
        }
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.config.scattering.render_mode = mode;
        self.apply_variant();
    }

    pub fn set_light_shafts(&mut self, enabled: bool) {
        self.config.light_shafts.enabled = enabled;
        self.apply_variant();
    }

    pub fn set_light_shaft_quality(&mut self, quality: LightShaftQuality) {
        self.config.light_shafts.quality = quality;
        self.apply_variant();
    }

    pub fn set_atmospheric_fog(&mut self, enabled: bool) {
        self.config.scattering.render_atmospheric_fog = enabled;
    }

    pub fn set_reflection_probe(&mut self, enabled: bool) {
        self.config.reflection_probe.enabled = enabled;
        self.apply_probe_config();
    }

    /// Resize the probe in place. The resolution is snapped to a supported size.
    pub fn set_reflection_probe_resolution(&mut self, resolution: u32) {
        self.config.reflection_probe.resolution = nebula_config::snap_probe_resolution(resolution);
        self.apply_probe_config();
    }

    /// Report unmet scene preconditions. Issues are logged, never fatal.
    pub fn validate(&self, scene: &SceneSetup) -> ValidationReport {
        let report = validate(scene, &self.config);
        for issue in &report.issues {
            warn!(%issue, "Atmospheric scattering setup issue");
        }
        report
    }

    fn apply_variant(&mut self) {
        let variant = PipelineVariant::from_config(&self.config);
        if variant == self.variant {
            return;
        }
        info!(from = ?self.variant, to = ?variant, "Switching pipeline variant");
        if variant.render_mode != self.variant.render_mode {
            self.fog = create_evaluator(variant.render_mode);
        }
        if variant.light_shafts != self.variant.light_shafts {
            // Buffers are reallocated at the next frame for the current screen size.
            self.shafts = None;
        }
        self.variant = variant;
    }

    fn apply_probe_config(&mut self) {
        let probe_config = &self.config.reflection_probe;
        match (&mut self.probe, probe_config.enabled) {
            (Some(probe), true) => {
                probe.resize(probe_config.resolution);
            }
            (None, true) => {
                info!(resolution = probe_config.resolution, "Enabling reflection probe");
                self.probe = Some(ReflectionProbe::new(probe_config.resolution));
            }
            (Some(_), false) => {
                info!("Disabling reflection probe");
                self.probe = None;
            }
            (None, false) => {}
        }
    }

    fn ensure_ready(&self) -> Result<(), AtmosphereError> {
        if self.state == CompositorState::Ready {
            Ok(())
        } else {
            Err(AtmosphereError::NotReady { state: self.state })
        }
    }

    fn ensure_shaft_chain(&mut self, screen: (u32, u32)) {
        let Some(quality) = self.variant.light_shafts else {
            self.shafts = None;
            return;
        };
        let reallocate = match &self.shafts {
            Some(chain) => chain.quality() != quality || chain.screen_size() != screen,
            None => true,
        };
        if reallocate {
            self.shafts = Some(create_chain(quality, screen));
        }
    }
}

fn point_index(point: InsertionPoint) -> usize {
    match point {
        InsertionPoint::BeforeShadowMap => 0,
        InsertionPoint::BeforeLighting => 1,
        InsertionPoint::BeforeForwardAlpha => 2,
    }
}

impl RenderStageHandler for FrameCompositor {
    fn on_pre_render(&mut self, frame: PreRender<'_>) -> Result<(), AtmosphereError> {
        self.ensure_ready()?;
        self.stages.clear();
        for list in &mut self.commands {
            list.clear();
        }
        let shadow_map_list = &mut self.commands[point_index(InsertionPoint::BeforeShadowMap)];
        for op in self.pending_lut_ops.drain(..) {
            shadow_map_list.push(op);
        }

        self.stages.push(FrameStage::ComputeFrustumCorners);
        let corners = FrustumCorners::from_camera(frame.camera);

        self.stages.push(FrameStage::RefreshParameters);
        let sun_direction = (-frame.lighting.sun_forward()).normalize_or(Vec3::Y);
        let camera_height = frame.camera.height_meters(&self.params);
        self.uniform = Some(ScatteringUniform::new(
            &self.params,
            sun_direction,
            frame.camera.position,
            frame.camera.far,
            corners.as_array(),
        ));

        let luts = self.luts.load();
        let Some(set) = luts.as_ref() else {
            warn!("Lookup tables not built; skipping frame");
            return Ok(());
        };
        self.last_feedback = Some(self.feedback.apply(&set.lights, frame.lighting));

        self.stages.push(FrameStage::RefreshFrustumLut);
        let fog_frame = FogFrame {
            params: &self.params,
            sky_params: &set.params,
            density: &set.density,
            corners: &corners,
            camera_height,
            sun_direction,
            frustum_size: self.config.lut.frustum_size,
            workers: self.workers,
        };
        let list = &mut self.commands[point_index(InsertionPoint::BeforeShadowMap)];
        self.fog.prepare(&fog_frame, list);
        debug!(screen = ?frame.screen, "Pre-render stages complete");

        self.frame = Some(FrameData {
            corners,
            camera_height,
            sun_direction,
        });
        self.ensure_shaft_chain(frame.screen);
        Ok(())
    }

    fn on_post_opaque(&mut self, targets: PostOpaque<'_>) -> Result<(), AtmosphereError> {
        self.ensure_ready()?;
        let color_size = targets.color.size();
        let depth_size = targets.depth.size();
        if color_size != depth_size {
            return Err(AtmosphereError::TargetSizeMismatch {
                color: color_size,
                depth: depth_size,
            });
        }
        self.ensure_shaft_chain(color_size);

        let luts = self.luts.load();
        let (Some(frame), Some(set)) = (self.frame.as_ref(), luts.as_ref()) else {
            warn!("Post-opaque hook without a prepared frame; scene left untouched");
            return Ok(());
        };
        let list_index = point_index(InsertionPoint::BeforeForwardAlpha);

        self.stages.push(FrameStage::RefreshLightShafts);
        let shafts: Option<&Buffer2d<f32>> = match self.shafts.as_mut() {
            Some(chain) => {
                let inputs = ShaftInputs {
                    depth: targets.depth,
                    corners: &frame.corners,
                    shadow: targets.shadow,
                    dither: &self.dither,
                    sample_count: self.params.sample_count,
                    workers: self.workers,
                };
                chain.render(&inputs, &mut self.commands[list_index]);
                Some(chain.attenuation())
            }
            None => None,
        };

        self.stages.push(FrameStage::CompositeFog);
        let fog_frame = FogFrame {
            params: &self.params,
            sky_params: &set.params,
            density: &set.density,
            corners: &frame.corners,
            camera_height: frame.camera_height,
            sun_direction: frame.sun_direction,
            frustum_size: self.config.lut.frustum_size,
            workers: self.workers,
        };
        let settings = CompositeSettings {
            apply_fog: self.config.scattering.render_atmospheric_fog,
            sun_disc: SunDisc::from_config(&self.config.sun),
        };
        composite(
            targets.color,
            targets.depth,
            &fog_frame,
            self.fog.as_ref(),
            &set.skybox,
            shafts,
            settings,
        );
        let list = &mut self.commands[list_index];
        list.push(DrawOp::fullscreen(SKYBOX, "sky", "screen", color_size, &self.quad));
        list.push(DrawOp::fullscreen(FOG_COMPOSITE, "fog", "screen", color_size, &self.quad));
        Ok(())
    }

    fn on_post_frame(&mut self) -> Result<(), AtmosphereError> {
        self.ensure_ready()?;
        if let (Some(probe), Some(frame)) = (self.probe.as_mut(), self.frame.as_ref()) {
            let luts = self.luts.load();
            if let Some(set) = luts.as_ref() {
                self.stages.push(FrameStage::RefreshReflectionProbe);
                probe.refresh(
                    &set.params,
                    &set.skybox,
                    frame.camera_height,
                    frame.sun_direction,
                    SunDisc::from_config(&self.config.sun),
                    self.workers,
                );
                let n = probe.resolution();
                self.commands[point_index(InsertionPoint::BeforeLighting)].push(DrawOp::fullscreen(
                    SKYBOX,
                    "reflection_probe",
                    "reflection_probe",
                    (n, n),
                    &self.quad,
                ));
            }
        }

        self.fog.release();
        self.frame = None;
        self.frames_rendered += 1;
        Ok(())
    }
}
