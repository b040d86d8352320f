//! Font loading, readiness and shaping.
//!
//! Font queries go through `fontdb`. Shaping is handled by `rustybuzz`
//! and glyph outlines come from `ttf-parser`.

use std::{cell::RefCell, num::NonZeroUsize, path::Path, sync::Arc};

use fontdb::Family;
use futures::{
    channel::oneshot,
    future::{self, BoxFuture, Shared},
    FutureExt,
};
use lru::LruCache;
use rustybuzz::{ttf_parser, UnicodeBuffer};

use crate::text::{Measure, TextShaper};

const WIDTH_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => panic!("cache capacity must be nonzero"),
};

/// Families tried, in order, for each generic family before falling back to
/// any loaded family that looks like it fits.
const SANS_SERIF_FAMILIES: &[&str] =
    &["Arial", "Helvetica", "DejaVu Sans", "Liberation Sans", "Noto Sans"];
const SERIF_FAMILIES: &[&str] =
    &["Times New Roman", "Times", "DejaVu Serif", "Liberation Serif", "Noto Serif"];
const MONOSPACE_FAMILIES: &[&str] =
    &["Courier New", "Courier", "DejaVu Sans Mono", "Liberation Mono", "Noto Sans Mono"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FontError {
    #[error("failed to parse font as TTF/OTF font data")]
    MalformedFont,
    #[error("no font found for family '{0}'")]
    MissingFont(String),
    #[error("font provider was dropped before the font became ready")]
    Abandoned,
    #[error("failed to load font: {0}")]
    Load(String),
}

/// A typeface that can produce a shaper for a given font size.
pub trait Typeface {
    type Shaper<'a>: TextShaper
    where
        Self: 'a;

    fn shaper(&self, font_size: f32) -> Result<Self::Shaper<'_>, FontError>;
}

/// An owned font blob, validated on creation.
#[derive(Clone)]
pub struct FontFace {
    data: Arc<Vec<u8>>,
    index: u32,
}

impl FontFace {
    pub fn from_data(data: Vec<u8>, index: u32) -> Result<Self, FontError> {
        rustybuzz::Face::from_slice(&data, index).ok_or(FontError::MalformedFont)?;
        Ok(Self {
            data: Arc::new(data),
            index,
        })
    }
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("len", &self.data.len())
            .field("index", &self.index)
            .finish()
    }
}

impl Typeface for FontFace {
    type Shaper<'a> = ShapedFont<'a>;

    fn shaper(&self, font_size: f32) -> Result<ShapedFont<'_>, FontError> {
        let face = rustybuzz::Face::from_slice(&self.data, self.index)
            .ok_or(FontError::MalformedFont)?;
        Ok(ShapedFont::new(face, font_size))
    }
}

/// The fonts available for rendering titles.
pub struct FontLibrary {
    db: fontdb::Database,
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl FontLibrary {
    pub fn new() -> Self {
        Self {
            db: fontdb::Database::new(),
        }
    }

    pub fn load_system_fonts(&mut self) {
        self.db.load_system_fonts();
        log::debug!("Loaded {} system font faces", self.db.len());
        self.resolve_generic_families();
    }

    pub fn load_font_file(&mut self, path: impl AsRef<Path>) -> Result<(), FontError> {
        self.db
            .load_font_file(path.as_ref())
            .map_err(|e| FontError::Load(format!("{}: {}", path.as_ref().display(), e)))?;
        self.resolve_generic_families();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Points each generic family at a family that was actually loaded.
    fn resolve_generic_families(&mut self) {
        let mut available: Vec<String> = self
            .db
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.clone()))
            .collect();
        available.sort();
        available.dedup();
        let available: Vec<&str> = available.iter().map(String::as_str).collect();

        for generic in &[Family::SansSerif, Family::Serif, Family::Monospace] {
            let Some(name) = generic_fallback(generic, &available).map(str::to_owned) else {
                continue;
            };
            log::debug!("Using '{}' for {:?}", name, generic);
            match generic {
                Family::Serif => self.db.set_serif_family(name),
                Family::Monospace => self.db.set_monospace_family(name),
                _ => self.db.set_sans_serif_family(name),
            }
        }
    }

    /// Resolves a family name to a font face.
    ///
    /// The generic names `sans-serif`, `serif` and `monospace` resolve to a
    /// loaded family of that kind, or to any loaded family if none fits.
    pub fn face_for_family(&self, family: &str) -> Result<FontFace, FontError> {
        let families = [match family {
            "sans-serif" => Family::SansSerif,
            "serif" => Family::Serif,
            "monospace" => Family::Monospace,
            name => Family::Name(name),
        }];
        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight::NORMAL,
            stretch: fontdb::Stretch::Normal,
            style: fontdb::Style::Normal,
        };

        let id = self
            .db
            .query(&query)
            .ok_or_else(|| FontError::MissingFont(family.to_owned()))?;
        let (data, index) = self
            .db
            .with_face_data(id, |data, index| (data.to_vec(), index))
            .ok_or_else(|| FontError::MissingFont(family.to_owned()))?;

        log::info!("Resolved font family '{}'", family);
        FontFace::from_data(data, index)
    }
}

/// Picks the family a generic family should resolve to among `available`.
fn generic_fallback<'a>(generic: &Family, available: &[&'a str]) -> Option<&'a str> {
    let preferred = match generic {
        Family::Serif => SERIF_FAMILIES,
        Family::Monospace => MONOSPACE_FAMILIES,
        _ => SANS_SERIF_FAMILIES,
    };
    let fits = |name: &str| match generic {
        Family::Serif => name.contains("Serif") && !name.contains("Sans"),
        Family::Monospace => name.contains("Mono"),
        _ => name.contains("Sans") && !name.contains("Mono"),
    };

    preferred
        .iter()
        .find_map(|wanted| available.iter().copied().find(|name| name == wanted))
        .or_else(|| available.iter().copied().find(|name| fits(name)))
        .or_else(|| available.first().copied())
}

/// Resolves once the font needed for measuring text is usable.
///
/// Clones share the same underlying readiness.
pub struct FontGate<T> {
    ready: Shared<BoxFuture<'static, Result<T, FontError>>>,
}

impl<T> Clone for FontGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            ready: self.ready.clone(),
        }
    }
}

impl<T> FontGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A gate that is already open.
    pub fn ready(typeface: T) -> Self {
        Self {
            ready: future::ready(Ok(typeface)).boxed().shared(),
        }
    }

    /// A gate that opens when the returned [`FontProvider`] supplies the font.
    pub fn pending() -> (Self, FontProvider<T>) {
        let (sender, receiver) = oneshot::channel();
        let ready = receiver
            .map(|result| result.unwrap_or(Err(FontError::Abandoned)))
            .boxed()
            .shared();
        (Self { ready }, FontProvider { sender })
    }

    pub async fn wait(&self) -> Result<T, FontError> {
        self.ready.clone().await
    }

    /// Returns the font if the gate has already opened.
    pub fn peek(&self) -> Option<Result<T, FontError>> {
        self.ready.clone().now_or_never()
    }
}

/// Supplies the font to a pending [`FontGate`].
pub struct FontProvider<T> {
    sender: oneshot::Sender<Result<T, FontError>>,
}

impl<T> FontProvider<T> {
    pub fn provide(self, typeface: T) {
        // The receiver is owned by the gate's shared future, which lives as long as any gate.
        let _ = self.sender.send(Ok(typeface));
    }

    pub fn fail(self, error: FontError) {
        let _ = self.sender.send(Err(error));
    }
}

/// A font face at a fixed size.
///
/// Widths are cached for the lifetime of the shaper, which spans a single run.
pub struct ShapedFont<'a> {
    face: rustybuzz::Face<'a>,
    scale: f32,
    ascender: f32,
    widths: RefCell<LruCache<String, f32, ahash::RandomState>>,
}

impl<'a> ShapedFont<'a> {
    pub fn new(face: rustybuzz::Face<'a>, font_size: f32) -> Self {
        let scale = font_size / face.units_per_em() as f32;
        let ascender = face.ascender() as f32 * scale;
        Self {
            face,
            scale,
            ascender,
            widths: RefCell::new(LruCache::with_hasher(
                WIDTH_CACHE_CAPACITY,
                ahash::RandomState::new(),
            )),
        }
    }

    fn shape(&self, text: &str) -> rustybuzz::GlyphBuffer {
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.guess_segment_properties();
        rustybuzz::shape(&self.face, &[], buffer)
    }
}

impl Measure for ShapedFont<'_> {
    fn width(&self, text: &str) -> f32 {
        if let Some(width) = self.widths.borrow_mut().get(text) {
            return *width;
        }

        let glyphs = self.shape(text);
        let width = glyphs
            .glyph_positions()
            .iter()
            .map(|pos| pos.x_advance as f32 * self.scale)
            .sum();

        self.widths.borrow_mut().put(text.to_owned(), width);
        width
    }
}

impl TextShaper for ShapedFont<'_> {
    fn append_outline(&self, text: &str, path: &mut tiny_skia::PathBuilder) {
        let glyphs = self.shape(text);
        let mut pen_x = 0.;
        for (pos, info) in glyphs.glyph_positions().iter().zip(glyphs.glyph_infos()) {
            let mut builder = GlyphOutline {
                path: &mut *path,
                scale: self.scale,
                origin_x: pen_x + pos.x_offset as f32 * self.scale,
                baseline: self.ascender - pos.y_offset as f32 * self.scale,
            };
            let glyph = ttf_parser::GlyphId(info.glyph_id as u16);
            self.face.outline_glyph(glyph, &mut builder);
            pen_x += pos.x_advance as f32 * self.scale;
        }
    }
}

/// Converts font-unit outlines (y up) into CSS-pixel path segments (y down).
struct GlyphOutline<'a> {
    path: &'a mut tiny_skia::PathBuilder,
    scale: f32,
    origin_x: f32,
    baseline: f32,
}

impl GlyphOutline<'_> {
    fn x(&self, x: f32) -> f32 {
        self.origin_x + x * self.scale
    }

    fn y(&self, y: f32) -> f32 {
        self.baseline - y * self.scale
    }
}

impl ttf_parser::OutlineBuilder for GlyphOutline<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = (self.x(x), self.y(y));
        self.path.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = (self.x(x), self.y(y));
        self.path.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1, x, y) = (self.x(x1), self.y(y1), self.x(x), self.y(y));
        self.path.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = (self.x(x1), self.y(y1));
        let (x2, y2) = (self.x(x2), self.y(y2));
        let (x, y) = (self.x(x), self.y(y));
        self.path.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.path.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_library() -> Option<FontLibrary> {
        let mut library = FontLibrary::new();
        library.load_system_fonts();
        if library.is_empty() {
            eprintln!("skipping: no system fonts installed");
            return None;
        }
        Some(library)
    }

    fn system_face() -> Option<FontFace> {
        Some(system_library()?.face_for_family("sans-serif").unwrap())
    }

    #[test]
    fn generic_families_prefer_known_names() {
        let available = [
            "DejaVu Sans",
            "DejaVu Sans Mono",
            "DejaVu Serif",
            "Liberation Serif",
        ];
        assert_eq!(generic_fallback(&Family::SansSerif, &available), Some("DejaVu Sans"));
        assert_eq!(generic_fallback(&Family::Serif, &available), Some("DejaVu Serif"));
        assert_eq!(
            generic_fallback(&Family::Monospace, &available),
            Some("DejaVu Sans Mono")
        );
    }

    #[test]
    fn generic_families_fall_back_to_any_loaded_family() {
        let available = ["Fira Mono", "Inter Sans", "Source Serif Pro"];
        assert_eq!(generic_fallback(&Family::SansSerif, &available), Some("Inter Sans"));
        assert_eq!(generic_fallback(&Family::Serif, &available), Some("Source Serif Pro"));
        assert_eq!(generic_fallback(&Family::Monospace, &available), Some("Fira Mono"));

        let available = ["Zen Antique Soft"];
        assert_eq!(generic_fallback(&Family::Serif, &available), Some("Zen Antique Soft"));
        assert_eq!(generic_fallback(&Family::Monospace, &[]), None);
    }

    #[test]
    fn generic_families_resolve_among_system_fonts() {
        let Some(library) = system_library() else {
            return;
        };
        for family in ["sans-serif", "serif", "monospace"] {
            assert!(library.face_for_family(family).is_ok(), "{} did not resolve", family);
        }
    }

    #[test]
    fn malformed_font_is_rejected() {
        assert_eq!(
            FontFace::from_data(vec![0; 64], 0).unwrap_err(),
            FontError::MalformedFont
        );
    }

    #[test]
    fn missing_family() {
        let library = FontLibrary::new();
        assert_eq!(
            library.face_for_family("Nonexistent Sans").unwrap_err(),
            FontError::MissingFont("Nonexistent Sans".to_owned())
        );
        assert_eq!(
            library.face_for_family("sans-serif").unwrap_err(),
            FontError::MissingFont("sans-serif".to_owned())
        );
    }

    #[test]
    fn ready_gate_resolves_immediately() {
        let gate = FontGate::ready(5u32);
        assert_eq!(gate.peek(), Some(Ok(5)));
        assert_eq!(pollster::block_on(gate.wait()), Ok(5));
    }

    #[test]
    fn pending_gate_opens_for_every_clone() {
        let (gate, provider) = FontGate::<u32>::pending();
        let other = gate.clone();
        assert!(gate.peek().is_none());

        provider.provide(7);
        assert_eq!(other.peek(), Some(Ok(7)));
        assert_eq!(pollster::block_on(gate.wait()), Ok(7));
        assert_eq!(pollster::block_on(other.wait()), Ok(7));
    }

    #[test]
    fn dropped_provider_abandons_gate() {
        let (gate, provider) = FontGate::<u32>::pending();
        drop(provider);
        assert_eq!(pollster::block_on(gate.wait()), Err(FontError::Abandoned));

        let (gate, provider) = FontGate::<u32>::pending();
        provider.fail(FontError::Load("offline".to_owned()));
        assert_eq!(
            pollster::block_on(gate.wait()),
            Err(FontError::Load("offline".to_owned()))
        );
    }

    #[test]
    fn shaped_widths_scale_with_size() {
        let Some(face) = system_face() else {
            return;
        };
        let small = face.shaper(10.).unwrap();
        let large = face.shaper(20.).unwrap();

        let w = small.width("Hello");
        assert!(w > 0.);
        assert!((large.width("Hello") - 2. * w).abs() < 0.01);
        assert!(small.width("Hello world") > w);
        assert_eq!(small.width(""), 0.);
        // cached value matches
        assert_eq!(small.width("Hello"), w);
    }

    #[test]
    fn outline_starts_below_em_top() {
        let Some(face) = system_face() else {
            return;
        };
        let shaper = face.shaper(32.).unwrap();
        let mut builder = tiny_skia::PathBuilder::new();
        shaper.append_outline("H", &mut builder);
        let path = builder.finish().expect("glyph has an outline");
        let bounds = path.bounds();
        assert!(bounds.top() >= -0.5);
        assert!(bounds.bottom() <= 32. * 1.5);
        assert!(bounds.right() <= shaper.width("H") + 1.);
    }
}
