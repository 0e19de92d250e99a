//! Screen-space light shafts: shadow raymarch, bilateral blur, optional upscale.
//!
//! The output is a full-resolution attenuation buffer in `[0, 1]` that scales
//! the inscattered light in the fog composite. Each chain owns its
//! intermediate buffers; a quality or screen size change allocates a new set.

use glam::{Vec2, Vec3};
use nebula_config::LightShaftQuality;
use tracing::debug;

use crate::buffer::{Buffer2d, DepthBuffer};
use crate::frustum::{FrustumCorners, pixel_uv};
use crate::program::{BILATERAL_BLUR, LIGHT_SHAFTS};
use crate::random::DitherPattern;
use crate::stage::{CommandList, DrawOp};

/// 9-tap Gaussian weights for sigma ~ 1.5, center first.
pub const GAUSSIAN_WEIGHTS: [f32; 5] = [
    0.227_027_03,
    0.194_594_6,
    0.121_621_62,
    0.054_054_055,
    0.016_216_216,
];

/// Scales depth differences in the bilateral weight.
pub const BLUR_DEPTH_SHARPNESS: f32 = 40.0;

/// Sun visibility at a world position, supplied by the host's shadow map.
pub trait ShadowMap: Sync {
    /// `1.0` fully lit, `0.0` fully shadowed.
    fn visibility(&self, world_position: Vec3) -> f32;
}

/// Shadow map for scenes without shadow casters.
pub struct Unshadowed;

impl ShadowMap for Unshadowed {
    fn visibility(&self, _world_position: Vec3) -> f32 {
        1.0
    }
}

/// Per-frame inputs shared by both chains.
pub struct ShaftInputs<'a> {
    pub depth: &'a DepthBuffer,
    pub corners: &'a FrustumCorners,
    pub shadow: &'a dyn ShadowMap,
    pub dither: &'a DitherPattern,
    pub sample_count: u32,
    pub workers: usize,
}

/// A light shaft buffer chain of a fixed topology.
pub trait LightShaftChain: Send {
    fn quality(&self) -> LightShaftQuality;

    /// Screen size the buffers were allocated for.
    fn screen_size(&self) -> (u32, u32);

    /// Sizes of every intermediate buffer, in allocation order.
    fn buffer_sizes(&self) -> Vec<(u32, u32)>;

    /// Run the chain, recording each pass into `commands`.
    fn render(&mut self, inputs: &ShaftInputs<'_>, commands: &mut CommandList);

    /// Full-resolution attenuation from the last [`render`](Self::render).
    fn attenuation(&self) -> &Buffer2d<f32>;
}

/// Allocate the chain for `quality` at `screen` size.
pub fn create_chain(quality: LightShaftQuality, screen: (u32, u32)) -> Box<dyn LightShaftChain> {
    debug!(?quality, ?screen, "Allocating light shaft buffers");
    match quality {
        LightShaftQuality::High => Box::new(HighQualityChain::new(screen)),
        LightShaftQuality::Medium => Box::new(MediumQualityChain::new(screen)),
    }
}

/// Average shadow visibility along the view ray of every pixel of `depth`,
/// packed with the pixel's depth for the bilateral blur.
pub fn raymarch(inputs: &ShaftInputs<'_>, depth: &DepthBuffer) -> Buffer2d<Vec2> {
    let (w, h) = depth.size();
    let n = inputs.sample_count.clamp(1, 64);
    Buffer2d::from_fn(w, h, inputs.workers, |x, y| {
        let d = depth.get(x as i64, y as i64).clamp(0.0, 1.0);
        let uv = pixel_uv(x, y, w, h);
        let jitter = inputs.dither.threshold(x, y);
        let mut lit = 0.0;
        for i in 0..n {
            let t = (i as f32 + jitter) / n as f32 * d;
            lit += inputs.shadow.visibility(inputs.corners.world_position(uv.x, uv.y, t));
        }
        Vec2::new((lit / n as f32).clamp(0.0, 1.0), d)
    })
}

/// One separable bilateral blur pass over a packed `(attenuation, depth)` buffer.
pub fn bilateral_blur(
    src: &Buffer2d<Vec2>,
    direction: (i64, i64),
    workers: usize,
) -> Buffer2d<Vec2> {
    let (w, h) = src.size();
    Buffer2d::from_fn(w, h, workers, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let center = src.get(x, y);
        let mut sum = center.x * GAUSSIAN_WEIGHTS[0];
        let mut weight = GAUSSIAN_WEIGHTS[0];
        for (i, &g) in GAUSSIAN_WEIGHTS.iter().enumerate().skip(1) {
            for sign in [-1, 1] {
                let o = i as i64 * sign;
                let s = src.get(x + direction.0 * o, y + direction.1 * o);
                let dz = (s.y - center.y) * BLUR_DEPTH_SHARPNESS;
                let wgt = g * (-dz * dz).exp();
                sum += s.x * wgt;
                weight += wgt;
            }
        }
        Vec2::new(sum / weight, center.y)
    })
}

/// Full-resolution raymarch and blur: A -> B -> A.
pub struct HighQualityChain {
    screen: (u32, u32),
    a: Buffer2d<Vec2>,
    b: Buffer2d<Vec2>,
    output: Buffer2d<f32>,
}

impl HighQualityChain {
    pub fn new(screen: (u32, u32)) -> Self {
        Self {
            screen,
            a: Buffer2d::new(screen.0, screen.1),
            b: Buffer2d::new(screen.0, screen.1),
            output: Buffer2d::filled(screen.0, screen.1, 1.0),
        }
    }
}

impl LightShaftChain for HighQualityChain {
    fn quality(&self) -> LightShaftQuality {
        LightShaftQuality::High
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn buffer_sizes(&self) -> Vec<(u32, u32)> {
        vec![self.a.size(), self.b.size()]
    }

    fn render(&mut self, inputs: &ShaftInputs<'_>, commands: &mut CommandList) {
        let full = self.a.size();
        self.a = raymarch(inputs, inputs.depth);
        commands.push(DrawOp::compute(LIGHT_SHAFTS, "raymarch", "shaft_a", full));
        self.b = bilateral_blur(&self.a, (1, 0), inputs.workers);
        commands.push(DrawOp::compute(BILATERAL_BLUR, "horizontal", "shaft_b", full));
        self.a = bilateral_blur(&self.b, (0, 1), inputs.workers);
        commands.push(DrawOp::compute(BILATERAL_BLUR, "vertical", "shaft_a", full));
        self.output = self.a.map(|p| p.x);
    }

    fn attenuation(&self) -> &Buffer2d<f32> {
        &self.output
    }
}

/// Half-resolution raymarch and blur with a bilinear upscale.
pub struct MediumQualityChain {
    screen: (u32, u32),
    half_depth: DepthBuffer,
    a: Buffer2d<Vec2>,
    b: Buffer2d<Vec2>,
    output: Buffer2d<f32>,
}

impl MediumQualityChain {
    pub fn new(screen: (u32, u32)) -> Self {
        let half = (screen.0.div_ceil(2), screen.1.div_ceil(2));
        Self {
            screen,
            half_depth: DepthBuffer::new(half.0, half.1),
            a: Buffer2d::new(half.0, half.1),
            b: Buffer2d::new(half.0, half.1),
            output: Buffer2d::filled(screen.0, screen.1, 1.0),
        }
    }
}

impl LightShaftChain for MediumQualityChain {
    fn quality(&self) -> LightShaftQuality {
        LightShaftQuality::Medium
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn buffer_sizes(&self) -> Vec<(u32, u32)> {
        vec![
            self.half_depth.size(),
            self.a.size(),
            self.b.size(),
            self.output.size(),
        ]
    }

    fn render(&mut self, inputs: &ShaftInputs<'_>, commands: &mut CommandList) {
        let half = self.half_depth.size();
        let full = self.output.size();

        self.half_depth = inputs.depth.downsample_max();
        commands.push(DrawOp::compute(LIGHT_SHAFTS, "downsample_depth", "shaft_half_depth", half));
        self.a = raymarch(inputs, &self.half_depth);
        commands.push(DrawOp::compute(LIGHT_SHAFTS, "raymarch", "shaft_half_a", half));
        self.b = bilateral_blur(&self.a, (1, 0), inputs.workers);
        commands.push(DrawOp::compute(BILATERAL_BLUR, "horizontal", "shaft_half_b", half));
        self.a = bilateral_blur(&self.b, (0, 1), inputs.workers);
        commands.push(DrawOp::compute(BILATERAL_BLUR, "vertical", "shaft_half_a", half));

        let blurred = &self.a;
        self.output = Buffer2d::from_fn(full.0, full.1, inputs.workers, |x, y| {
            let uv = pixel_uv(x, y, full.0, full.1);
            blurred.sample_bilinear(uv.x, uv.y).x
        });
        commands.push(DrawOp::compute(BILATERAL_BLUR, "upsample", "shaft_full", full));
    }

    fn attenuation(&self) -> &Buffer2d<f32> {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frustum::CameraState;
    use crate::stage::InsertionPoint;
    use std::f32::consts::FRAC_PI_2;

    /// Everything with `x < 0` is in shadow.
    struct HalfPlaneShadow;

    impl ShadowMap for HalfPlaneShadow {
        fn visibility(&self, p: Vec3) -> f32 {
            if p.x < 0.0 { 0.0 } else { 1.0 }
        }
    }

    fn corners() -> FrustumCorners {
        let camera = CameraState::looking_at(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, -1.0),
            FRAC_PI_2,
            1.0,
            100.0,
        );
        FrustumCorners::from_camera(&camera)
    }

    fn run(quality: LightShaftQuality, shadow: &dyn ShadowMap) -> (Buffer2d<f32>, CommandList) {
        let depth = DepthBuffer::filled(32, 32, 0.5);
        let corners = corners();
        let dither = DitherPattern::new();
        let inputs = ShaftInputs {
            depth: &depth,
            corners: &corners,
            shadow,
            dither: &dither,
            sample_count: 16,
            workers: 2,
        };
        let mut chain = create_chain(quality, (32, 32));
        let mut commands = CommandList::new(InsertionPoint::BeforeForwardAlpha);
        chain.render(&inputs, &mut commands);
        (chain.attenuation().clone(), commands)
    }

    #[test]
    fn test_gaussian_weights_sum_to_approximately_one() {
        let sum = GAUSSIAN_WEIGHTS[0] + 2.0 * GAUSSIAN_WEIGHTS[1..].iter().sum::<f32>();
        assert!((sum - 1.0).abs() < 0.01, "sum = {sum}");
    }

    #[test]
    fn test_unshadowed_scene_is_fully_lit() {
        for quality in [LightShaftQuality::High, LightShaftQuality::Medium] {
            let (attenuation, _) = run(quality, &Unshadowed);
            assert_eq!(attenuation.size(), (32, 32));
            for &a in attenuation.data() {
                assert!((a - 1.0).abs() < 1e-5, "{quality:?}: {a}");
            }
        }
    }

    #[test]
    fn test_shadowed_half_is_dark() {
        let (attenuation, _) = run(LightShaftQuality::High, &HalfPlaneShadow);
        assert!(attenuation.get(0, 16) < 0.05, "left {}", attenuation.get(0, 16));
        assert!(attenuation.get(31, 16) > 0.95, "right {}", attenuation.get(31, 16));
    }

    #[test]
    fn test_high_chain_pass_order() {
        let (_, commands) = run(LightShaftQuality::High, &Unshadowed);
        assert_eq!(
            commands.passes(),
            vec![
                (LIGHT_SHAFTS, "raymarch"),
                (BILATERAL_BLUR, "horizontal"),
                (BILATERAL_BLUR, "vertical"),
            ]
        );
        let targets: Vec<_> = commands.ops().iter().map(|op| op.target).collect();
        assert_eq!(targets, vec!["shaft_a", "shaft_b", "shaft_a"]);
    }

    #[test]
    fn test_medium_chain_runs_at_half_resolution() {
        let (_, commands) = run(LightShaftQuality::Medium, &Unshadowed);
        assert_eq!(commands.ops().len(), 5);
        assert_eq!(commands.ops()[0].pass, "downsample_depth");
        assert_eq!(commands.ops()[1].extent, (16, 16));
        assert_eq!(commands.ops()[4].pass, "upsample");
        assert_eq!(commands.ops()[4].extent, (32, 32));

        let chain = create_chain(LightShaftQuality::Medium, (33, 17));
        assert_eq!(chain.buffer_sizes()[0], (17, 9));
    }

    #[test]
    fn test_quality_change_keeps_converged_result() {
        let (high, _) = run(LightShaftQuality::High, &HalfPlaneShadow);
        let (medium, _) = run(LightShaftQuality::Medium, &HalfPlaneShadow);

        let mean = |b: &Buffer2d<f32>| b.data().iter().sum::<f32>() / b.data().len() as f32;
        assert!((mean(&high) - mean(&medium)).abs() < 0.03);

        // Away from the shadow edge both chains converge to the same value.
        for x in [0, 1, 2, 29, 30, 31] {
            let diff = (high.get(x, 10) - medium.get(x, 10)).abs();
            assert!(diff < 0.05, "x={x}: high {} medium {}", high.get(x, 10), medium.get(x, 10));
        }
    }

    #[test]
    fn test_blur_respects_depth_edges() {
        let packed = Buffer2d::from_fn(8, 1, 1, |x, _| {
            if x < 4 { Vec2::new(0.0, 0.1) } else { Vec2::new(1.0, 0.9) }
        });
        let blurred = bilateral_blur(&packed, (1, 0), 1);
        assert!(blurred.get(3, 0).x < 1e-3, "{}", blurred.get(3, 0).x);
        assert!(blurred.get(4, 0).x > 0.999, "{}", blurred.get(4, 0).x);
    }
}
