//! The seam between rasterized text and the shader that composites it.

use std::borrow::Cow;

use glam::{UVec2, Vec2};

use crate::raster::RasterBuffer;

pub mod gpu;

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to get GPU device: {0}")]
    RequestDevice(String),
    #[error("failed to build shader: {0}")]
    Compile(String),
    #[error("texture '{0}' was not declared when the context was created")]
    UnknownTexture(String),
    #[error("texture '{0}' must be set before rendering")]
    MissingTexture(String),
    #[error("surface of {width}x{height} exceeds the maximum texture dimension {max}")]
    SurfaceTooLarge { width: u32, height: u32, max: u32 },
    #[error("output buffer is not preserved after rendering")]
    OutputNotPreserved,
    #[error("failed to read back rendered pixels: {0}")]
    Readback(String),
}

/// Parameters for creating a [`ShaderContext`].
#[derive(Debug, Clone)]
pub struct ContextOptions<'a> {
    /// Source of the fragment shader program.
    pub fragment_source: &'a str,
    /// Size of the render target in device pixels.
    pub device_size: UVec2,
    /// Size of the render target in CSS pixels.
    pub css_size: Vec2,
    /// Keep the rendered output readable after the render pass.
    pub preserve_output_buffer: bool,
    /// Names of the textures the fragment shader samples, in binding order.
    pub textures: &'a [&'a str],
}

/// How texture data is interpreted when uploaded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureOptions {
    /// Upload color channels premultiplied by alpha.
    ///
    /// [`RasterBuffer`]s are stored premultiplied, so `false` demultiplies on upload.
    pub premultiply_alpha: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            premultiply_alpha: true,
        }
    }
}

/// A shader engine that creates rendering contexts.
pub trait ShaderBackend {
    type Context: ShaderContext;

    fn create_context(&self, options: &ContextOptions) -> Result<Self::Context, ShaderError>;
}

/// A shader program bound to a render target of fixed size.
pub trait ShaderContext {
    /// Uploads `raster` as the texture input called `name`.
    fn set_texture(
        &mut self,
        name: &str,
        raster: &RasterBuffer,
        options: TextureOptions,
    ) -> Result<(), ShaderError>;

    /// Runs one render pass.
    fn render(&mut self) -> Result<(), ShaderError>;

    /// Size of the render target in device pixels.
    fn device_size(&self) -> UVec2;

    /// Frees the GPU resources held by this context.
    fn release(self)
    where
        Self: Sized;
}

/// Bytes to upload for `raster` under `options`.
pub(crate) fn texture_bytes(raster: &RasterBuffer, options: TextureOptions) -> Cow<'_, [u8]> {
    if options.premultiply_alpha {
        raster.data().into()
    } else {
        raster.demultiplied().into()
    }
}
