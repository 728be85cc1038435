//! render2d: Render a random 2D splat scene and optionally back-propagate
//!
//! Usage:
//!   render2d --width 256 --height 192 --count 500 --out render.png
//!   render2d --config raster.json --backward
//!
//! Log verbosity follows `RUST_LOG` (e.g. `RUST_LOG=splat2d=debug`).

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use splat2d::core::random_cloud;
use splat2d::loss::l2_loss_and_grad;
use splat2d::{render_gaussians, render_gaussians_backward, FeatureImage, RasterConfig};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

struct Args {
    width: u32,
    height: u32,
    count: usize,
    features: usize,
    seed: u64,
    tile_size: Option<u32>,
    config: Option<PathBuf>,
    out: PathBuf,
    backward: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            width: 256,
            height: 192,
            count: 500,
            features: 3,
            seed: 0,
            tile_size: None,
            config: None,
            out: PathBuf::from("render.png"),
            backward: false,
        }
    }
}

fn value<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .next()
        .with_context(|| format!("missing value for {flag}"))?;
    raw.parse()
        .with_context(|| format!("invalid value for {flag}: {raw:?}"))
}

fn parse_args() -> Result<Option<Args>> {
    let mut parsed = Args::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--width" => parsed.width = value(&mut args, "--width")?,
            "--height" => parsed.height = value(&mut args, "--height")?,
            "--count" => parsed.count = value(&mut args, "--count")?,
            "--features" => parsed.features = value(&mut args, "--features")?,
            "--seed" => parsed.seed = value(&mut args, "--seed")?,
            "--tile-size" => parsed.tile_size = Some(value(&mut args, "--tile-size")?),
            "--config" => parsed.config = Some(value(&mut args, "--config")?),
            "--out" => parsed.out = value(&mut args, "--out")?,
            "--backward" => parsed.backward = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other => {
                print_help();
                bail!("unknown argument: {other}");
            }
        }
    }

    if parsed.width == 0 || parsed.height == 0 {
        bail!("--width and --height must be positive");
    }
    Ok(Some(parsed))
}

fn load_config(args: &Args) -> Result<RasterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => RasterConfig::default(),
    };
    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };
    let config = load_config(&args)?;
    tracing::info!(version = splat2d::VERSION, ?config, "render2d");

    let mut rng = StdRng::seed_from_u64(args.seed);
    let cloud = random_cloud(&mut rng, args.count, (args.width, args.height), args.features)?;

    let start = Instant::now();
    let rendered = render_gaussians(&cloud, (args.width, args.height), &config)?;
    tracing::info!(
        splats = cloud.len(),
        overlaps = rendered.context.mapping.num_overlaps(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
        "forward"
    );

    rendered
        .image
        .to_rgb8()
        .save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    tracing::info!(path = %args.out.display(), "saved render");

    if args.backward {
        let grey = vec![0.5f32; args.features];
        let target = FeatureImage::filled(args.width, args.height, &grey);
        let (loss, grad_image) = l2_loss_and_grad(&rendered.image, &target)?;

        let start = Instant::now();
        let grads = render_gaussians_backward(&cloud, &rendered.context, &grad_image, &config)?;
        let [position, log_scaling, rotation, alpha_logit, features] = grads.norms();
        tracing::info!(
            loss,
            position,
            log_scaling,
            rotation,
            alpha_logit,
            features,
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "backward"
        );
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"render2d: Render a random 2D Gaussian splat scene

USAGE:
    render2d [OPTIONS]

OPTIONS:
    --width WIDTH            Image width [default: 256]
    --height HEIGHT          Image height [default: 192]
    --count N                Number of random splats [default: 500]
    --features F             Feature channels per splat [default: 3]
    --seed SEED              RNG seed [default: 0]
    --tile-size N            Override the tile size from the config
    --config PATH            Raster config as JSON (missing fields use defaults)
    --out PATH               Output PNG (first three channels) [default: render.png]
    --backward               Also back-propagate an L2 loss against flat grey
                             and log gradient norms
    --help, -h               Print this help message"#
    );
}
