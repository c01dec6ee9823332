use crate::config::RenderConfig;
use crate::detection::{Detection, NormalizedBox};
use crate::glyphs;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

pub const OUTLINE_COLOR: Rgba<u8> = Rgba([255, 80, 80, 255]);
pub const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const STROKE_WIDTH: i32 = 3;

const TAG_PADDING: i32 = 6;
const FALLBACK_SCALE: u32 = 2;

/// Box in absolute pixels, truncated from the normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn from_normalized(bbox: &NormalizedBox, image_width: u32, image_height: u32) -> Self {
        let (w, h) = (f64::from(image_width), f64::from(image_height));
        Self {
            x: (bbox.x * w) as i32,
            y: (bbox.y * h) as i32,
            width: (bbox.w * w) as i32,
            height: (bbox.h * h) as i32,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Typeface for label tags.
pub enum LabelFont {
    Preferred { font: FontVec, scale: PxScale },
    Fallback,
}

impl LabelFont {
    /// Loads the first readable TrueType font from the configured paths and
    /// falls back to the built-in bitmap font.
    pub fn load(config: &RenderConfig) -> Self {
        for path in &config.font_paths {
            let Ok(font_data) = std::fs::read(path) else {
                continue;
            };
            match FontVec::try_from_vec(font_data) {
                Ok(font) => {
                    tracing::info!("Loaded label font: {}", path.display());
                    return LabelFont::Preferred {
                        font,
                        scale: PxScale::from(config.font_size),
                    };
                }
                Err(e) => {
                    tracing::warn!("Failed to parse font {}: {}", path.display(), e);
                }
            }
        }

        tracing::info!("No label font found, using the built-in bitmap font");
        LabelFont::Fallback
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, LabelFont::Fallback)
    }

    fn measure(&self, text: &str) -> (i32, i32) {
        let (w, h) = match self {
            LabelFont::Preferred { font, scale } => {
                imageproc::drawing::text_size(*scale, font, text)
            }
            LabelFont::Fallback => glyphs::text_size(FALLBACK_SCALE, text),
        };
        (w as i32, h as i32)
    }

    fn draw(&self, canvas: &mut RgbaImage, x: i32, y: i32, text: &str) {
        match self {
            LabelFont::Preferred { font, scale } => {
                imageproc::drawing::draw_text_mut(canvas, TEXT_COLOR, x, y, *scale, font, text)
            }
            LabelFont::Fallback => {
                glyphs::draw_text_mut(canvas, TEXT_COLOR, x, y, FALLBACK_SCALE, text)
            }
        }
    }
}

/// Returns an RGBA copy of `image` with an outline and a label tag for every
/// detection that carries a box. Detections without a box are skipped.
pub fn render_detections(
    image: &DynamicImage,
    detections: &[Detection],
    font: &LabelFont,
) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    let (width, height) = canvas.dimensions();

    for detection in detections {
        let Some(bbox) = detection.bbox.as_ref() else {
            continue;
        };
        let rect = PixelRect::from_normalized(bbox, width, height);
        draw_outline(&mut canvas, &rect);
        draw_label_tag(&mut canvas, &rect, &detection.display_text(), font);
    }

    canvas
}

fn draw_outline(canvas: &mut RgbaImage, rect: &PixelRect) {
    // The stroke grows inward from the box edge; corners are inclusive.
    for inset in 0..STROKE_WIDTH {
        let w = rect.width + 1 - 2 * inset;
        let h = rect.height + 1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let stroke = Rect::at(rect.x + inset, rect.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, stroke, OUTLINE_COLOR);
    }
}

fn draw_label_tag(canvas: &mut RgbaImage, rect: &PixelRect, text: &str, font: &LabelFont) {
    let (text_w, text_h) = font.measure(text);
    let tag_top = (rect.y - text_h - TAG_PADDING).max(0);
    let tag_w = text_w + TAG_PADDING + 1;
    let tag_h = rect.y - tag_top + 1;
    if tag_w > 0 && tag_h > 0 {
        let tag = Rect::at(rect.x, tag_top).of_size(tag_w as u32, tag_h as u32);
        draw_filled_rect_mut(canvas, tag, OUTLINE_COLOR);
    }

    let text_top = (rect.y - text_h - 4).max(0);
    font.draw(canvas, rect.x + 3, text_top, text);
}
