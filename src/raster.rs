//! Card composition and rasterization.
//!
//! The card is laid out on a 360x480 (3:4) canvas: a top block with the
//! greeting and recipient, the wish in the middle and the label at the bottom,
//! spread like CSS `justify-content: space-between`. Exports multiply every
//! measurement by the pixel ratio.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rusttype::{Font, Scale, point};
use tracing::{debug, info, instrument, warn};

use crate::card::{CardRequest, GeneratedImage};
use crate::constants::{CARD_GREETING, CARD_LABEL, FALLBACK_FONT_PATHS};
use crate::error::{ConfigError, ExportError};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const ROSE_200: Rgba<u8> = Rgba([254, 205, 211, 255]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 110]);

/// Everything the card shows. Deterministic given its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardComposition {
    /// Background image, cropped to fill
    pub background: GeneratedImage,
    /// Line above the recipient
    pub greeting: &'static str,
    /// Recipient name, may be blank
    pub recipient_name: String,
    /// Wish text, line breaks preserved
    pub wish: String,
    /// Fixed label at the bottom
    pub label: &'static str,
}

impl CardComposition {
    /// Composes the current request over `background`.
    pub fn new(background: GeneratedImage, request: &CardRequest) -> Self {
        Self {
            background,
            greeting: CARD_GREETING,
            recipient_name: request.recipient_name().to_string(),
            wish: request.wish().to_string(),
            label: CARD_LABEL,
        }
    }
}

/// Turns a composition into PNG bytes.
#[async_trait]
pub trait CardRasterizer: Send + Sync {
    /// Renders `card` at `pixel_ratio` times the base layout size.
    async fn rasterize(&self, card: &CardComposition, pixel_ratio: u32)
    -> Result<Vec<u8>, ExportError>;
}

/// Largest pixel ratio a card can be rasterized at.
pub const MAX_PIXEL_RATIO: u32 = 4;

/// Measurements of the card, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CardLayout {
    /// Canvas width
    pub width: u32,
    /// Canvas height
    pub height: u32,
    /// Inner padding on every side
    pub padding: f32,
    /// Greeting font size
    pub greeting_px: f32,
    /// Recipient font size
    pub name_px: f32,
    /// Space between greeting and recipient
    pub name_gap: f32,
    /// Wish font size
    pub wish_px: f32,
    /// Wish line height, as a multiple of its font size
    pub wish_line_height: f32,
    /// Label font size
    pub label_px: f32,
    /// Opacity of the black overlay over the background
    pub overlay_opacity: f32,
    /// Drop shadow offset
    pub shadow_offset: f32,
}

/// The layout the HTML preview uses.
pub const BASE_LAYOUT: CardLayout = CardLayout {
    width: 360,
    height: 480,
    padding: 24.0,
    greeting_px: 28.0,
    name_px: 34.0,
    name_gap: 8.0,
    wish_px: 17.0,
    wish_line_height: 1.5,
    label_px: 44.0,
    overlay_opacity: 0.3,
    shadow_offset: 1.0,
};

impl CardLayout {
    /// Scales every measurement by `ratio`, clamped to `1..=MAX_PIXEL_RATIO`.
    pub fn at_pixel_ratio(&self, ratio: u32) -> Self {
        let ratio = ratio.clamp(1, MAX_PIXEL_RATIO);
        let r = ratio as f32;
        Self {
            width: self.width * ratio,
            height: self.height * ratio,
            padding: self.padding * r,
            greeting_px: self.greeting_px * r,
            name_px: self.name_px * r,
            name_gap: self.name_gap * r,
            wish_px: self.wish_px * r,
            wish_line_height: self.wish_line_height,
            label_px: self.label_px * r,
            overlay_opacity: self.overlay_opacity,
            shadow_offset: self.shadow_offset * r,
        }
    }

    fn content_width(&self) -> f32 {
        self.width as f32 - self.padding * 2.0
    }
}

/// Fonts used to draw the card text.
pub struct FontSet {
    body: Font<'static>,
    display: Option<Font<'static>>,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("display", &self.display.is_some())
            .finish()
    }
}

impl FontSet {
    /// Loads the body font and, optionally, a decorative display font.
    pub fn load(body: &Path, display: Option<&Path>) -> Result<Self, ConfigError> {
        let body = load_font(body)?;
        let display = display.map(load_font).transpose()?;
        Ok(Self { body, display })
    }

    fn display(&self) -> &Font<'static> {
        self.display.as_ref().unwrap_or(&self.body)
    }
}

fn load_font(path: &Path) -> Result<Font<'static>, ConfigError> {
    let bytes = std::fs::read(path).map_err(|err| ConfigError::FontUnreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Font::try_from_vec(bytes).ok_or_else(|| ConfigError::FontUnreadable {
        path: path.to_path_buf(),
        reason: "not a TrueType/OpenType font".to_string(),
    })
}

/// First well-known system font that exists on this machine.
pub fn discover_body_font() -> Option<PathBuf> {
    FALLBACK_FONT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Production rasterizer: `image` for pixels, `rusttype` for glyphs.
#[derive(Clone, Debug, Default)]
pub struct FontRasterizer {
    fonts: Option<Arc<FontSet>>,
}

impl FontRasterizer {
    /// Builds a rasterizer; without fonts every export fails.
    pub fn new(fonts: Option<FontSet>) -> Self {
        if fonts.is_none() {
            warn!("No font loaded, card downloads will fail");
        }
        Self {
            fonts: fonts.map(Arc::new),
        }
    }
}

#[async_trait]
impl CardRasterizer for FontRasterizer {
    #[instrument(skip_all, fields(pixel_ratio = pixel_ratio))]
    async fn rasterize(
        &self,
        card: &CardComposition,
        pixel_ratio: u32,
    ) -> Result<Vec<u8>, ExportError> {
        if !(1..=MAX_PIXEL_RATIO).contains(&pixel_ratio) {
            return Err(ExportError::PixelRatio(pixel_ratio));
        }
        let card = card.clone();
        let fonts = self.fonts.clone();
        tokio::task::spawn_blocking(move || render_card(&card, fonts.as_deref(), pixel_ratio))
            .await
            .map_err(|err| ExportError::Task(err.to_string()))?
    }
}

fn render_card(
    card: &CardComposition,
    fonts: Option<&FontSet>,
    pixel_ratio: u32,
) -> Result<Vec<u8>, ExportError> {
    let layout = BASE_LAYOUT.at_pixel_ratio(pixel_ratio);
    let background = image::load_from_memory(card.background.bytes())
        .map_err(|err| ExportError::Decode(err.to_string()))?;
    let fonts = fonts.ok_or(ExportError::FontUnavailable)?;

    let mut canvas = compose_background(&background, &layout);
    let blocks = card_blocks(card, fonts, &layout);
    for line in place_blocks(&blocks, &layout) {
        draw_line(&mut canvas, &line, &layout);
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|err| ExportError::Encode(err.to_string()))?;
    debug!("Encoded {}x{} card, {} bytes", layout.width, layout.height, out.len());
    info!("Rasterized card at {pixel_ratio}x");
    Ok(out)
}

/// Scales and centre-crops the background to fill the canvas, then darkens it.
pub fn compose_background(background: &DynamicImage, layout: &CardLayout) -> RgbaImage {
    let mut canvas = background
        .resize_to_fill(layout.width, layout.height, FilterType::Triangle)
        .to_rgba8();
    let keep = 1.0 - layout.overlay_opacity.clamp(0.0, 1.0);
    for pixel in canvas.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = (*channel as f32 * keep).round() as u8;
        }
        pixel.0[3] = 255;
    }
    canvas
}

#[derive(Clone)]
struct TextLine<'f> {
    text: String,
    font: &'f Font<'static>,
    px: f32,
    line_height: f32,
    gap_before: f32,
    color: Rgba<u8>,
}

struct PlacedLine<'f> {
    line: TextLine<'f>,
    top: f32,
}

fn card_blocks<'f>(
    card: &CardComposition,
    fonts: &'f FontSet,
    layout: &CardLayout,
) -> [Vec<TextLine<'f>>; 3] {
    let max_width = layout.content_width();
    let display = fonts.display();

    let mut top = vec![TextLine {
        text: card.greeting.to_string(),
        font: display,
        px: layout.greeting_px,
        line_height: layout.greeting_px * 1.25,
        gap_before: 0.0,
        color: WHITE,
    }];
    let name_lines = wrap_text(&card.recipient_name, max_width, |text| {
        text_width(display, layout.name_px, text)
    });
    for (index, text) in name_lines.into_iter().enumerate() {
        top.push(TextLine {
            text,
            font: display,
            px: layout.name_px,
            line_height: layout.name_px * 1.25,
            gap_before: if index == 0 { layout.name_gap } else { 0.0 },
            color: WHITE,
        });
    }

    let middle = wrap_text(&card.wish, max_width, |text| {
        text_width(&fonts.body, layout.wish_px, text)
    })
    .into_iter()
    .map(|text| TextLine {
        text,
        font: &fonts.body,
        px: layout.wish_px,
        line_height: layout.wish_px * layout.wish_line_height,
        gap_before: 0.0,
        color: WHITE,
    })
    .collect();

    let bottom = vec![TextLine {
        text: card.label.to_string(),
        font: display,
        px: layout.label_px,
        line_height: layout.label_px * 1.2,
        gap_before: 0.0,
        color: ROSE_200,
    }];

    [top, middle, bottom]
}

fn block_height(block: &[TextLine<'_>]) -> f32 {
    block
        .iter()
        .map(|line| line.gap_before + line.line_height)
        .sum()
}

/// Vertical offsets of the three blocks, spread with equal gaps between them.
pub fn block_tops(heights: [f32; 3], layout: &CardLayout) -> [f32; 3] {
    let inner = layout.height as f32 - layout.padding * 2.0;
    let gap = ((inner - heights.iter().sum::<f32>()) / 2.0).max(0.0);
    let first = layout.padding;
    let second = first + heights[0] + gap;
    let third = second + heights[1] + gap;
    [first, second, third]
}

fn place_blocks<'f>(blocks: &[Vec<TextLine<'f>>; 3], layout: &CardLayout) -> Vec<PlacedLine<'f>> {
    let heights = [
        block_height(&blocks[0]),
        block_height(&blocks[1]),
        block_height(&blocks[2]),
    ];
    let tops = block_tops(heights, layout);
    let mut placed = Vec::new();
    for (block, top) in blocks.iter().zip(tops) {
        let mut y = top;
        for line in block {
            y += line.gap_before;
            placed.push(PlacedLine {
                line: line.clone(),
                top: y,
            });
            y += line.line_height;
        }
    }
    placed
}

/// Greedy word wrap. Explicit line breaks are kept, blank lines included.
pub fn wrap_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if current.is_empty() || measure(&candidate) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    lines
}

fn text_width(font: &Font<'static>, px: f32, text: &str) -> f32 {
    let scale = Scale::uniform(px);
    text.chars()
        .map(|ch| font.glyph(ch).scaled(scale).h_metrics().advance_width)
        .sum()
}

fn draw_line(canvas: &mut RgbaImage, placed: &PlacedLine<'_>, layout: &CardLayout) {
    let line = &placed.line;
    if line.text.is_empty() {
        return;
    }
    let width = text_width(line.font, line.px, &line.text);
    let x = (layout.width as f32 - width) / 2.0;
    let v_metrics = line.font.v_metrics(Scale::uniform(line.px));
    let glyph_height = v_metrics.ascent - v_metrics.descent;
    let baseline = placed.top + (line.line_height - glyph_height) / 2.0 + v_metrics.ascent;

    let offset = layout.shadow_offset;
    draw_text(canvas, line, x + offset, baseline + offset, SHADOW);
    draw_text(canvas, line, x, baseline, line.color);
}

fn draw_text(canvas: &mut RgbaImage, line: &TextLine<'_>, x: f32, baseline: f32, color: Rgba<u8>) {
    let scale = Scale::uniform(line.px);
    let opacity = color.0[3] as f32 / 255.0;
    let mut caret = x;
    for ch in line.text.chars() {
        let glyph = line
            .font
            .glyph(ch)
            .scaled(scale)
            .positioned(point(caret, baseline));
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 {
                    return;
                }
                let (px, py) = (px as u32, py as u32);
                if px >= canvas.width() || py >= canvas.height() {
                    return;
                }
                let alpha = coverage * opacity;
                if alpha <= 0.0 {
                    return;
                }
                let dst = canvas.get_pixel_mut(px, py);
                let inv = 1.0 - alpha;
                for (dst, src) in dst.0.iter_mut().zip(color.0).take(3) {
                    *dst = (src as f32 * alpha + *dst as f32 * inv) as u8;
                }
            });
        }
        caret += glyph.unpositioned().h_metrics().advance_width;
    }
}
