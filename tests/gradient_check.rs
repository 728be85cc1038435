//! Gradient checking for the tile rasterizer.
//!
//! Analytical gradients from `rasterize_backward` are compared against
//! central differences of an independent f64 compositor:
//! - Numerical: (f(x+ε) - f(x-ε)) / 2ε, f = Σ w · C
//! - Analytical: backward pass implementation
//!
//! Both scenes are a single 4×4 tile. The first has no alpha threshold, no
//! active clamp and no saturation. The second has one clamped pixel and one
//! saturated pixel; every raw alpha stays well clear of the threshold and
//! clamp boundaries, so the image is still differentiable there.

use approx::assert_relative_eq;
use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use splat2d::core::{FeatureImage, Gaussian2D, RasterConfig};
use splat2d::diff::rasterize_backward;
use splat2d::render::{map_to_tiles, rasterize, Splats, TileGrid};

const SIZE: u32 = 4;
const F: usize = 3;

fn config() -> RasterConfig {
    RasterConfig {
        tile_size: SIZE,
        alpha_threshold: 0.0,
        ..RasterConfig::default()
    }
}

/// Per splat: [mx, my, a, b, c, opacity]
type Params = Vec<[f64; 6]>;

fn scene() -> (Params, Vec<f64>, Vec<f32>) {
    let points = vec![
        [1.2, 1.7, 0.55, 0.12, 0.40, 0.65],
        [2.6, 2.1, 0.35, -0.08, 0.60, 0.50],
        [1.9, 3.0, 0.45, 0.05, 0.30, 0.80],
    ];
    let features = vec![0.9, 0.2, 0.4, 0.1, 0.8, 0.3, 0.5, 0.5, 0.7];
    let depths = vec![0.3, 0.1, 0.7];
    (points, features, depths)
}

/// Front-to-back composite in f64, same ordering rule as the tile mapping and
/// same threshold, clamp and saturation rules as `config`.
fn render64(
    points: &Params,
    features: &[f64],
    depths: &[f32],
    config: &RasterConfig,
) -> Vec<f64> {
    let threshold = config.alpha_threshold as f64;
    let clamp = config.clamp_max_alpha as f64;
    let t_min = 1.0 - config.saturate_threshold as f64;

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&i, &j| depths[i].total_cmp(&depths[j]).then(i.cmp(&j)));

    let mut out = vec![0.0; (SIZE * SIZE) as usize * F];
    for y in 0..SIZE {
        for x in 0..SIZE {
            let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
            let mut t = 1.0;
            let base = (y * SIZE + x) as usize * F;
            for &i in &order {
                let [mx, my, a, b, c, o] = points[i];
                let (dx, dy) = (px - mx, py - my);
                let pdf = (-(0.5 * (a * dx * dx + c * dy * dy) + b * dx * dy)).exp();
                let raw = o * pdf;
                if raw < threshold {
                    continue;
                }
                let alpha = raw.min(clamp);
                for k in 0..F {
                    out[base + k] += features[i * F + k] * alpha * t;
                }
                t *= 1.0 - alpha;
                if t < t_min {
                    break;
                }
            }
        }
    }
    out
}

fn loss64(
    points: &Params,
    features: &[f64],
    depths: &[f32],
    weights: &[f32],
    config: &RasterConfig,
) -> f64 {
    render64(points, features, depths, config)
        .iter()
        .zip(weights)
        .map(|(c, &w)| c * w as f64)
        .sum()
}

fn to_f32(points: &Params) -> Vec<Gaussian2D> {
    points
        .iter()
        .map(|p| {
            Gaussian2D::new(
                Vector2::new(p[0] as f32, p[1] as f32),
                Vector3::new(p[2] as f32, p[3] as f32, p[4] as f32),
                p[5] as f32,
            )
        })
        .collect()
}

#[test]
fn test_forward_matches_f64_reference() {
    let (points64, features64, depths) = scene();
    let points = to_f32(&points64);
    let features: Vec<f32> = features64.iter().map(|&v| v as f32).collect();

    let config = config();
    let grid = TileGrid::new(SIZE, SIZE, SIZE).unwrap();
    let mapping = map_to_tiles(&points, &depths, grid, &config).unwrap();
    let out = rasterize(Splats::new(&points, &features, F).unwrap(), &mapping, &config).unwrap();

    let reference = render64(&points64, &features64, &depths, &config);
    for (a, b) in out.image.data().iter().zip(&reference) {
        assert_relative_eq!(*a, *b as f32, epsilon = 1e-5);
    }
}

/// Analytic gradients of `Σ w · C` next to the matching central differences,
/// per splat: (point grads, point FD), (feature grads, feature FD).
type GradPairs = Vec<(([f32; 6], [f32; 6]), (Vec<f32>, Vec<f32>))>;

fn gradients_and_differences(
    points64: &Params,
    features64: &[f64],
    depths: &[f32],
    config: &RasterConfig,
    seed: u64,
) -> GradPairs {
    let points = to_f32(points64);
    let features: Vec<f32> = features64.iter().map(|&v| v as f32).collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let weights: Vec<f32> = (0..(SIZE * SIZE) as usize * F)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    let grad_image = FeatureImage::from_vec(SIZE, SIZE, F, weights.clone()).unwrap();

    let grid = TileGrid::new(SIZE, SIZE, SIZE).unwrap();
    let mapping = map_to_tiles(&points, depths, grid, config).unwrap();
    assert_eq!(mapping.num_overlaps(), points.len());
    let splats = Splats::new(&points, &features, F).unwrap();
    let forward = rasterize(splats, &mapping, config).unwrap();
    let grads = rasterize_backward(splats, &mapping, &forward, &grad_image, config).unwrap();

    let eps = 1e-5;
    let loss = |p: &Params, f: &[f64]| loss64(p, f, depths, &weights, config);
    (0..points64.len())
        .map(|i| {
            let mut point_fd = [0.0f32; 6];
            for (k, fd) in point_fd.iter_mut().enumerate() {
                let mut plus = points64.clone();
                let mut minus = points64.clone();
                plus[i][k] += eps;
                minus[i][k] -= eps;
                *fd = ((loss(&plus, features64) - loss(&minus, features64)) / (2.0 * eps)) as f32;
            }
            let feature_fd = (0..F)
                .map(|k| {
                    let mut plus = features64.to_vec();
                    let mut minus = features64.to_vec();
                    plus[i * F + k] += eps;
                    minus[i * F + k] -= eps;
                    ((loss(points64, &plus) - loss(points64, &minus)) / (2.0 * eps)) as f32
                })
                .collect();
            let feature_grads = grads.features[i * F..(i + 1) * F].to_vec();
            ((grads.points[i].pack(), point_fd), (feature_grads, feature_fd))
        })
        .collect()
}

fn assert_pairs_match(pairs: &GradPairs) {
    for ((points, points_fd), (features, features_fd)) in pairs {
        for (a, n) in points.iter().zip(points_fd).chain(features.iter().zip(features_fd)) {
            assert_relative_eq!(*a, *n, epsilon = 1e-4, max_relative = 1e-3);
        }
    }
}

#[test]
fn test_rasterize_backward_matches_finite_differences() {
    let (points64, features64, depths) = scene();
    let pairs = gradients_and_differences(&points64, &features64, &depths, &config(), 0x2D5_91A7);
    assert_pairs_match(&pairs);
}

#[test]
fn test_gradients_with_clamped_and_saturated_pixel() {
    // Default threshold, clamp and saturation. At pixel (1, 1):
    //   splat 0 peaks there with raw alpha 1.0, clamped to 0.99
    //   splats 1 and 2 bring T to ~1.8e-5 < 1e-4, saturating the pixel
    //   splat 3 is cut off
    // Elsewhere nothing clamps or saturates, and splat 0 falls below the
    // threshold at (3, 3).
    let config = RasterConfig::default().with_tile_size(SIZE);
    let points64: Params = vec![
        [1.5, 1.5, 2.0, 0.0, 2.0, 1.0],
        [1.7, 1.4, 0.8, 0.1, 0.6, 0.9],
        [1.4, 1.6, 1.5, -0.2, 1.2, 1.0],
        [2.5, 2.5, 0.4, 0.05, 0.5, 0.7],
    ];
    let features64 = vec![0.8, 0.1, 0.4, 0.2, 0.9, 0.3, 0.6, 0.5, 0.1, 0.3, 0.3, 0.9];
    let depths = vec![0.1, 0.2, 0.3, 0.4];

    let points = to_f32(&points64);
    let features: Vec<f32> = features64.iter().map(|&v| v as f32).collect();
    let raw_at = |x: f32, y: f32| points[0].opacity * points[0].density_at(&Vector2::new(x, y));
    assert!(config.is_clamped(raw_at(1.5, 1.5)));
    assert!(config.splat_alpha(raw_at(3.5, 3.5)).is_none());

    let grid = TileGrid::new(SIZE, SIZE, SIZE).unwrap();
    let mapping = map_to_tiles(&points, &depths, grid, &config).unwrap();
    let out = rasterize(Splats::new(&points, &features, F).unwrap(), &mapping, &config).unwrap();
    assert!(config.is_saturated(out.transmittance_at(1, 1)));
    assert_eq!(out.last_valid_at(1, 1), 3);
    for (x, y) in [(0, 0), (2, 1), (1, 2), (3, 3)] {
        assert!(!config.is_saturated(out.transmittance_at(x, y)));
        assert_eq!(out.last_valid_at(x, y), 4);
    }

    let reference = render64(&points64, &features64, &depths, &config);
    for (a, b) in out.image.data().iter().zip(&reference) {
        assert_relative_eq!(*a, *b as f32, epsilon = 1e-5);
    }

    let pairs = gradients_and_differences(&points64, &features64, &depths, &config, 0xC1A3_9);
    assert_pairs_match(&pairs);

    // The clamped splat still learns mean, conic and opacity from its fringe.
    let (near_points, _) = &pairs[0].0;
    assert!(near_points.iter().all(|&g| g != 0.0));
}
