//! Text shaping/rasterization and pixel blending for caption overlays.
//!
//! Words are shaped with `parley` and rasterized with `vello_cpu` into a
//! premultiplied band-sized buffer; the band is then alpha-blended onto the
//! opaque video frame in place.

use crate::foundation::core::FrameRGBA;
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::mul_div255_u16;

/// RGBA8 brush carried through parley layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Stateful helper for shaping words from raw font bytes.
pub(crate) struct TextRasterizer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    family_name: String,
    font: vello_cpu::peniko::FontData,
}

impl TextRasterizer {
    /// Register `font_bytes` and prepare shaping contexts.
    pub(crate) fn new(font_bytes: Vec<u8>) -> ReelResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| ReelError::caption("no font families registered from font bytes"))?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ReelError::caption("registered font family has no name"))?
            .to_string();
        let font =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes), 0);
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
            font,
        })
    }

    /// Handle to the registered font for glyph drawing.
    pub(crate) fn font(&self) -> &vello_cpu::peniko::FontData {
        &self.font
    }

    /// Shape one word at `size_px` with `brush`. No line breaking: a word is
    /// always a single line.
    pub(crate) fn layout_word(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrush,
    ) -> ReelResult<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ReelError::caption("font size must be finite and > 0"));
        }
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));
        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Measured `(width, height)` of one shaped word.
    pub(crate) fn measure_word(&mut self, text: &str, size_px: f32) -> ReelResult<(f32, f32)> {
        let layout = self.layout_word(text, size_px, TextBrush::default())?;
        Ok((layout.width(), layout.height()))
    }
}

/// Draw a word's glyphs into `ctx`, translated to `(x, top)`.
pub(crate) fn draw_word_glyphs(
    ctx: &mut vello_cpu::RenderContext,
    font: &vello_cpu::peniko::FontData,
    layout: &parley::Layout<TextBrush>,
    x: f64,
    top: f64,
) {
    ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, top)));
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
}

/// Alpha-blend a premultiplied RGBA8 band over an opaque frame in place,
/// with the band's top-left at `(0, dst_y)`. Rows outside the frame clip.
pub(crate) fn blend_premul_band_over_opaque(
    frame: &mut FrameRGBA,
    band: &[u8],
    band_width: u32,
    band_height: u32,
    dst_y: i64,
) -> ReelResult<()> {
    if band.len() != (band_width as usize) * (band_height as usize) * 4 {
        return Err(ReelError::caption(
            "overlay band buffer size mismatch with its dimensions",
        ));
    }
    let copy_width = band_width.min(frame.width) as usize;

    for band_row in 0..band_height as i64 {
        let frame_row = dst_y + band_row;
        if frame_row < 0 || frame_row >= i64::from(frame.height) {
            continue;
        }
        let src_off = (band_row as usize) * (band_width as usize) * 4;
        let dst_off = (frame_row as usize) * (frame.width as usize) * 4;
        let src = &band[src_off..src_off + copy_width * 4];
        let dst = &mut frame.data[dst_off..dst_off + copy_width * 4];

        for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
            let a = s[3] as u16;
            if a == 0 {
                continue;
            }
            if a == 255 {
                d[0] = s[0];
                d[1] = s[1];
                d[2] = s[2];
                continue;
            }
            let inv = 255 - a;
            d[0] = (s[0] as u16 + mul_div255_u16(d[0] as u16, inv)).min(255) as u8;
            d[1] = (s[1] as u16 + mul_div255_u16(d[1] as u16, inv)).min(255) as u8;
            d[2] = (s[2] as u16 + mul_div255_u16(d[2] as u16, inv)).min(255) as u8;
        }
    }
    Ok(())
}
