//! Renders a title described by a JSON file to a PNG image.
//!
//! ```text
//! titlefx --spec title.json --dpr 2 -o title.png
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _};
use clap::Parser;
use glam::UVec2;
use serde::de::DeserializeOwned;

use titlefx::{
    text::{wrap::wrap_lines, DrawStyle},
    Browser, Environment, FontFace, FontGate, FontLibrary, Os, Pipeline, PlatformHint, Rasterizer,
    RunOutcome, TextSpec, Typeface, WgpuBackend,
};

#[derive(Parser, Debug)]
#[command(name = "titlefx")]
#[command(about = "Render title text through a fragment shader")]
struct Args {
    /// JSON file holding the text spec
    #[arg(long)]
    spec: PathBuf,

    /// Font file to use instead of the system fonts
    #[arg(long)]
    font: Option<PathBuf>,

    /// Font family to look up among the system fonts
    #[arg(long, default_value = "sans-serif")]
    family: String,

    /// WGSL fragment shader to use instead of the built-in effect
    #[arg(long)]
    shader: Option<PathBuf>,

    /// Device pixel ratio of the target display
    #[arg(long, default_value_t = 1.)]
    dpr: f32,

    #[arg(long, value_parser = kebab_case::<Os>, default_value = "other")]
    os: Os,

    #[arg(long, value_parser = kebab_case::<Browser>, default_value = "other")]
    browser: Browser,

    /// Let words wider than the target width overflow instead of hyphenating them
    #[arg(long)]
    no_hyphenate: bool,

    /// Line height as a multiple of the font size
    #[arg(long, default_value_t = 1.)]
    line_height: f32,

    /// Write the rasterized text without running the shader
    #[arg(long)]
    raster_only: bool,

    #[arg(short, long, default_value = "title.png")]
    output: PathBuf,
}

fn kebab_case<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_owned())).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let args = Args::parse();
    if args.line_height.is_nan() || args.line_height <= 0. {
        bail!("--line-height must be positive");
    }

    let spec: TextSpec = serde_json::from_str(
        &fs::read_to_string(&args.spec)
            .with_context(|| format!("failed to read {}", args.spec.display()))?,
    )
    .with_context(|| format!("invalid text spec in {}", args.spec.display()))?;
    let face = load_face(&args)?;
    let env = Environment::new(PlatformHint::new(args.os, args.browser), args.dpr);

    if args.raster_only {
        return write_raster(&args, &spec, &env, &face);
    }

    let backend = pollster::block_on(WgpuBackend::headless())?;
    let mut builder = Pipeline::builder(backend, FontGate::ready(face))
        .hyphenate(!args.no_hyphenate)
        .line_height_factor(args.line_height);
    if let Some(path) = &args.shader {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        builder = builder.fragment_source(source);
    }
    let pipeline = builder.build();

    let surface = match pollster::block_on(pipeline.run(&spec, &env))? {
        RunOutcome::Rendered(surface) => surface,
        RunOutcome::SurfaceUnavailable => bail!("text is too large to rasterize"),
        RunOutcome::Superseded => bail!("render was superseded"),
    };
    let pixels = pipeline
        .with_surface(|context| context.read_pixels())
        .context("no surface after rendering")??;
    save_png(&args.output, surface.device_size(), demultiply(pixels))?;

    log::info!(
        "Wrote {}x{} title ({}x{} CSS pixels) to {}",
        surface.device_pixel_width,
        surface.device_pixel_height,
        surface.css_width,
        surface.css_height,
        args.output.display()
    );
    Ok(())
}

fn load_face(args: &Args) -> anyhow::Result<FontFace> {
    if let Some(path) = &args.font {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(FontFace::from_data(data, 0)?);
    }

    let mut library = FontLibrary::new();
    library.load_system_fonts();
    if library.is_empty() {
        bail!("no system fonts found; pass one with --font");
    }
    Ok(library.face_for_family(&args.family)?)
}

fn write_raster(
    args: &Args,
    spec: &TextSpec,
    env: &Environment,
    face: &FontFace,
) -> anyhow::Result<()> {
    let style = DrawStyle::from_spec(spec, args.line_height)?;
    let shaper = face.shaper(style.font_size)?;
    let lines = wrap_lines(&spec.text, &shaper, spec.target_width, !args.no_hyphenate);
    let raster = Rasterizer::new(&shaper)
        .rasterize(&lines, &style, spec.target_width, env.device_pixel_ratio())
        .context("text is too large to rasterize")?;

    save_png(&args.output, raster.device_size(), raster.demultiplied())?;
    log::info!(
        "Wrote {} lines as a {}x{} raster to {}",
        lines.len(),
        raster.width(),
        raster.height(),
        args.output.display()
    );
    Ok(())
}

fn save_png(path: &Path, size: UVec2, pixels: Vec<u8>) -> anyhow::Result<()> {
    let image = image::RgbaImage::from_raw(size.x, size.y, pixels)
        .context("pixel buffer does not match the image size")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Converts shader output, which is premultiplied, to straight alpha for PNG.
fn demultiply(mut pixels: Vec<u8>) -> Vec<u8> {
    for pixel in pixels.chunks_exact_mut(4) {
        if let Some(color) =
            tiny_skia::PremultipliedColorU8::from_rgba(pixel[0], pixel[1], pixel[2], pixel[3])
        {
            let color = color.demultiply();
            pixel.copy_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
    }
    pixels
}
