use std::{
    cell::{Cell, RefCell, RefMut},
    future::Future,
};

use crate::{
    color::ColorError,
    font::{FontError, FontGate, Typeface},
    platform::Environment,
    raster::Rasterizer,
    shader::{ContextOptions, ShaderBackend, ShaderContext, ShaderError, TextureOptions},
    surface::{size_surface, SurfaceDescriptor},
    text::{wrap::wrap_lines, DrawStyle, TextSpec},
};

/// The fragment shader used when none is configured.
pub const DEFAULT_FRAGMENT_SOURCE: &str = include_str!("../shaders/title.wgsl");

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Font(#[from] FontError),
    #[error(transparent)]
    Color(#[from] ColorError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error("the live surface is borrowed and cannot be replaced")]
    SurfaceInUse,
}

/// What became of a single [`Pipeline::run`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// The title was drawn into a fresh shader context. The host should
    /// size its element to the descriptor's CSS dimensions.
    Rendered(SurfaceDescriptor),
    /// A newer run was started before this one finished; nothing was touched.
    Superseded,
    /// No pixel buffer could be allocated for the text; nothing was touched.
    SurfaceUnavailable,
}

/// Identifies one run of a [`Pipeline`]. Later runs have greater generations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder<B, T> {
    settings: Settings,
    backend: B,
    fonts: FontGate<T>,
}

impl<B, T> PipelineBuilder<B, T>
where
    B: ShaderBackend,
{
    /// Sets whether words wider than the target width are broken with hyphens.
    /// When disabled, such words overflow on a line of their own.
    ///
    /// The default is `true`.
    pub fn hyphenate(mut self, hyphenate: bool) -> Self {
        self.settings.hyphenate = hyphenate;
        self
    }

    /// Sets the distance between baselines as a multiple of the font size.
    ///
    /// The default is 1.
    pub fn line_height_factor(mut self, factor: f32) -> Self {
        assert!(factor > 0., "line height factor must be positive");
        self.settings.line_height_factor = factor;
        self
    }

    /// Sets the WGSL source of the fragment shader. It must define `fs_main`
    /// and sample the text texture at group 1, bindings 0 and 1.
    ///
    /// The default draws the text with a soft glow.
    pub fn fragment_source(mut self, source: impl Into<String>) -> Self {
        self.settings.fragment_source = source.into();
        self
    }

    /// Sets the name the rasterized text is uploaded under.
    ///
    /// The default is `"text"`.
    pub fn texture_name(mut self, name: impl Into<String>) -> Self {
        self.settings.texture_name = name.into();
        self
    }

    pub fn build(self) -> Pipeline<B, T> {
        Pipeline {
            settings: self.settings,
            backend: self.backend,
            fonts: self.fonts,
            latest: Cell::new(Generation(0)),
            context: RefCell::new(None),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Settings {
    pub(crate) hyphenate: bool,
    pub(crate) line_height_factor: f32,
    pub(crate) fragment_source: String,
    pub(crate) texture_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hyphenate: true,
            line_height_factor: 1.,
            fragment_source: DEFAULT_FRAGMENT_SOURCE.to_owned(),
            texture_name: "text".to_owned(),
        }
    }
}

/// Turns [`TextSpec`]s into shader-rendered titles.
///
/// Each run wraps, rasterizes and sizes the text from scratch and renders it
/// into a new shader context, which replaces the previous one. Runs may
/// overlap while waiting for the font; only the most recently started run
/// is allowed to replace the live context.
pub struct Pipeline<B: ShaderBackend, T> {
    settings: Settings,
    backend: B,
    fonts: FontGate<T>,
    latest: Cell<Generation>,
    context: RefCell<Option<B::Context>>,
}

impl<B, T> Pipeline<B, T>
where
    B: ShaderBackend,
    T: Typeface + Clone + Send + Sync + 'static,
{
    pub fn builder(backend: B, fonts: FontGate<T>) -> PipelineBuilder<B, T> {
        PipelineBuilder {
            settings: Settings::default(),
            backend,
            fonts,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The generation of the most recently started run.
    pub fn latest_generation(&self) -> Generation {
        self.latest.get()
    }

    /// Starts rendering `spec`.
    ///
    /// The run is registered as the latest immediately, before the returned
    /// future is first polled, so starting another run supersedes this one.
    pub fn run<'a>(
        &'a self,
        spec: &'a TextSpec,
        env: &'a Environment,
    ) -> impl Future<Output = Result<RunOutcome, Error>> + 'a {
        let generation = self.issue_generation();
        async move {
            let typeface = self.fonts.wait().await;
            if !self.is_current(generation) {
                log::debug!("Run {:?} superseded by {:?}", generation, self.latest.get());
                return Ok(RunOutcome::Superseded);
            }
            self.render(spec, env, &typeface?)
        }
    }

    /// Calls `f` with the shader context holding the latest rendered title.
    ///
    /// Returns `None` if there is no live context. Runs that finish while `f`
    /// is executing fail with [`Error::SurfaceInUse`].
    pub fn with_surface<R>(&self, f: impl FnOnce(&B::Context) -> R) -> Option<R> {
        self.context.borrow().as_ref().map(f)
    }

    /// Releases the live shader context.
    pub fn clear(&self) -> Result<(), Error> {
        let mut slot = self.surface_slot()?;
        release(&mut slot);
        Ok(())
    }

    fn issue_generation(&self) -> Generation {
        let generation = Generation(self.latest.get().0 + 1);
        self.latest.set(generation);
        generation
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.latest.get() == generation
    }

    fn render(
        &self,
        spec: &TextSpec,
        env: &Environment,
        typeface: &T,
    ) -> Result<RunOutcome, Error> {
        let style = DrawStyle::from_spec(spec, self.settings.line_height_factor)?;
        let shaper = typeface.shaper(style.font_size)?;
        let device_pixel_ratio = env.device_pixel_ratio();

        let lines = wrap_lines(&spec.text, &shaper, spec.target_width, self.settings.hyphenate);
        let raster = Rasterizer::new(&shaper).rasterize(
            &lines,
            &style,
            spec.target_width,
            device_pixel_ratio,
        );
        let Some(raster) = raster else {
            log::debug!(
                "No raster surface for {} lines at width {}; skipping render",
                lines.len(),
                spec.target_width
            );
            return Ok(RunOutcome::SurfaceUnavailable);
        };

        let surface = size_surface(
            raster.css_size(),
            style.font_size,
            lines.len(),
            &env.platform,
            device_pixel_ratio,
        );

        let mut slot = self.surface_slot()?;
        release(&mut slot);
        let mut context = self.backend.create_context(&ContextOptions {
            fragment_source: &self.settings.fragment_source,
            device_size: surface.device_size(),
            css_size: surface.css_size(),
            preserve_output_buffer: true,
            textures: &[self.settings.texture_name.as_str()],
        })?;

        let drawn = context
            .set_texture(&self.settings.texture_name, &raster, TextureOptions::default())
            .and_then(|()| context.render());
        if let Err(e) = drawn {
            context.release();
            return Err(e.into());
        }

        *slot = Some(context);
        Ok(RunOutcome::Rendered(surface))
    }

    fn surface_slot(&self) -> Result<RefMut<'_, Option<B::Context>>, Error> {
        self.context.try_borrow_mut().map_err(|_| {
            log::debug!("Live surface is borrowed; leaving it in place");
            Error::SurfaceInUse
        })
    }
}

fn release<C: ShaderContext>(slot: &mut Option<C>) {
    if let Some(context) = slot.take() {
        log::debug!("Releasing shader context");
        context.release();
    }
}

impl<B: ShaderBackend, T> Drop for Pipeline<B, T> {
    fn drop(&mut self) {
        release(self.context.get_mut());
    }
}
