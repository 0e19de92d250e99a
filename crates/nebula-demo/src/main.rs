//! Headless atmospheric scattering demo.
//!
//! Renders a small ray-traced scene through the scattering pipeline while the
//! sun climbs after dawn, then writes the last frame as PNG.
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p nebula-demo -- --frames 30 --output sky.png`.

mod day_night;
mod output;
mod scene;

use std::path::Path;

use clap::Parser;
use glam::Vec3;
use nebula_atmosphere::program::SKYBOX;
use nebula_atmosphere::{
    AtmosphereError, CameraState, ColorBuffer, FrameCompositor, FrustumCorners, PostOpaque,
    PreRender, ProgramLibrary, RenderStageHandler, SceneLighting, SceneSetup, default_workers,
};
use nebula_config::{CliArgs, Config, ConfigError, default_config_dir};
use tracing::{error, info, warn};

use crate::day_night::DayNightClock;
use crate::output::save_png;
use crate::scene::DemoScene;

/// Simulated time between frames.
const SECONDS_PER_FRAME: f64 = 1.0 / 30.0;
/// Length of one in-game day in simulated seconds.
const DAY_SECONDS: f64 = 120.0;
/// Shortly after dawn.
const START_TIME_OF_DAY: f64 = 0.26;
/// Frames between config hot-reload checks.
const RELOAD_INTERVAL: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error(transparent)]
    Atmosphere(#[from] AtmosphereError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().or_else(|| default_config_dir().ok());

    let mut config = match &config_dir {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.as_ref().map(|dir| dir.join("logs"));
    nebula_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&args, config, config_dir.as_deref()) {
        error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs, mut config: Config, config_dir: Option<&Path>) -> Result<(), DemoError> {
    let mut compositor = FrameCompositor::new(&config, ProgramLibrary::with_builtin_programs());
    compositor.initialize()?;

    let report = compositor.validate(&SceneSetup {
        sky_program: Some(SKYBOX.to_string()),
        has_sun: true,
        sun_casts_shadows: true,
    });
    info!("{report}");

    let size = (args.width.max(1), args.height.max(1));
    let mut camera = CameraState::looking_at(
        Vec3::new(0.0, 150.0, 0.0),
        Vec3::new(0.0, 250.0, -3000.0),
        std::f32::consts::FRAC_PI_3,
        1.0,
        20_000.0,
    );
    camera.set_aspect_ratio(size.0 as f32, size.1 as f32);

    let scene = DemoScene::default();
    let mut lighting = SceneLighting::default();
    let mut clock = DayNightClock::new(START_TIME_OF_DAY, DAY_SECONDS);
    let workers = default_workers();
    let mut last_frame = ColorBuffer::new(size.0, size.1);

    for frame in 0..args.frames.max(1) {
        if frame > 0
            && frame % RELOAD_INTERVAL == 0
            && let Some(dir) = config_dir
        {
            hot_reload(&mut compositor, &mut config, args, dir)?;
        }

        clock.tick(SECONDS_PER_FRAME);
        clock.apply(&mut lighting);
        last_frame = render_frame(&mut compositor, &scene, &camera, &mut lighting, size, workers)?;

        if frame % 10 == 0 {
            info!(
                frame,
                hours = clock.hours(),
                sun_color = ?lighting.sun.color,
                sun_intensity = lighting.sun.intensity,
                ambient_intensity = lighting.ambient.intensity,
                "Frame rendered"
            );
        }
    }

    if let Some(path) = &args.output {
        save_png(&last_frame, path)?;
        info!(path = %path.display(), "Wrote final frame");
    }
    Ok(())
}

/// Pick up edits to `config.ron`, rebuilding tables when physical settings changed.
fn hot_reload(
    compositor: &mut FrameCompositor,
    config: &mut Config,
    args: &CliArgs,
    dir: &Path,
) -> Result<(), DemoError> {
    match config.reload(dir) {
        Ok(Some(mut updated)) => {
            updated.apply_cli_overrides(args);
            info!("Config changed on disk, applying");
            compositor.set_settings(&updated);
            if compositor.luts_stale() {
                compositor.recompute_luts()?;
            }
            *config = updated;
        }
        Ok(None) => {}
        Err(e) => warn!("Config reload failed: {e}"),
    }
    Ok(())
}

/// Drive one host frame through the three render stage hooks.
fn render_frame(
    compositor: &mut FrameCompositor,
    scene: &DemoScene,
    camera: &CameraState,
    lighting: &mut SceneLighting,
    size: (u32, u32),
    workers: usize,
) -> Result<ColorBuffer, AtmosphereError> {
    compositor.on_pre_render(PreRender {
        camera,
        screen: size,
        lighting,
    })?;

    // Opaque pass, lit with the colors fed back during pre-render.
    let corners = FrustumCorners::from_camera(camera);
    let (mut color, depth) = scene.render(&corners, size, lighting, workers);
    let shadow = scene.shadow_map(lighting.sun.toward_sun());

    compositor.on_post_opaque(PostOpaque {
        color: &mut color,
        depth: &depth,
        shadow: &shadow,
    })?;
    compositor.on_post_frame()?;
    Ok(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_config::LightShaftQuality;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.scattering.sample_count = 8;
        config.lut.particle_density_size = 33;
        config.lut.density_integration_steps = 16;
        config.lut.light_color_size = 16;
        config.lut.skybox_size = [9, 9, 5];
        config.lut.frustum_size = [8, 8, 16];
        config
    }

    fn camera() -> CameraState {
        CameraState::looking_at(
            Vec3::new(0.0, 150.0, 0.0),
            Vec3::new(0.0, 250.0, -3000.0),
            std::f32::consts::FRAC_PI_3,
            1.0,
            20_000.0,
        )
    }

    #[test]
    fn test_frame_lights_sky_and_feeds_back_sun() {
        let mut compositor =
            FrameCompositor::new(&small_config(), ProgramLibrary::with_builtin_programs())
                .with_workers(2);
        compositor.initialize().unwrap();

        let mut lighting = SceneLighting::default();
        DayNightClock::new(0.3, DAY_SECONDS).apply(&mut lighting);
        let color = render_frame(
            &mut compositor,
            &DemoScene::default(),
            &camera(),
            &mut lighting,
            (16, 16),
            2,
        )
        .unwrap();

        let sky = color.get(8, 0);
        assert!(sky.z > 0.0, "sky pixel should be lit: {sky:?}");
        assert_ne!(lighting.sun.color, Vec3::ONE, "sun color replaced by feedback");
        assert_eq!(compositor.frames_rendered(), 1);
    }

    #[test]
    fn test_medium_quality_frame() {
        let mut config = small_config();
        config.light_shafts.quality = LightShaftQuality::Medium;
        let mut compositor =
            FrameCompositor::new(&config, ProgramLibrary::with_builtin_programs()).with_workers(2);
        compositor.initialize().unwrap();

        let mut lighting = SceneLighting::default();
        DayNightClock::new(0.27, DAY_SECONDS).apply(&mut lighting);
        let color = render_frame(
            &mut compositor,
            &DemoScene::default(),
            &camera(),
            &mut lighting,
            (15, 9),
            2,
        )
        .unwrap();
        assert_eq!(color.size(), (15, 9));
        assert!(color.data().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_hot_reload_rebuilds_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        config.save(dir.path()).unwrap();

        let mut compositor =
            FrameCompositor::new(&config, ProgramLibrary::with_builtin_programs()).with_workers(2);
        compositor.initialize().unwrap();
        assert_eq!(compositor.lut_generation(), 1);

        let mut edited = config.clone();
        edited.scattering.mie_scatter_coef = 2.0;
        edited.save(dir.path()).unwrap();

        let args = CliArgs::parse_from(["nebula-demo"]);
        hot_reload(&mut compositor, &mut config, &args, dir.path()).unwrap();
        assert_eq!(config.scattering.mie_scatter_coef, 2.0);
        assert_eq!(compositor.lut_generation(), 2);
        assert!(!compositor.luts_stale());
    }
}
