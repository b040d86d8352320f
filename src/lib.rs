//! Renders title text through a GPU fragment shader.
//!
//! A [`Pipeline`] run wraps the text of a [`TextSpec`] to its target width,
//! hyphenating words that cannot fit, rasterizes the lines with `tiny-skia`,
//! sizes the visible surface for the host platform, and hands the raster to a
//! shader as a texture.

pub mod color;
pub mod font;
pub mod pipeline;
pub mod platform;
pub mod raster;
pub mod shader;
pub mod surface;
pub mod text;

pub use color::{Color, ColorError};
pub use font::{FontError, FontFace, FontGate, FontLibrary, FontProvider, Typeface};
pub use pipeline::{Error, Generation, Pipeline, PipelineBuilder, RunOutcome};
pub use platform::{Browser, Environment, Os, PlatformHint};
pub use raster::{RasterBuffer, Rasterizer};
pub use shader::{
    gpu::{WgpuBackend, WgpuContext},
    ContextOptions, ShaderBackend, ShaderContext, ShaderError, TextureOptions,
};
pub use surface::SurfaceDescriptor;
pub use text::{wrap::wrap_lines, DrawStyle, TextSpec};
