//! Karaoke-style caption rendering onto video frames.
//!
//! For each frame at presentation time `t` the renderer finds the active cue,
//! wraps its words onto two centered lines, and paints a filled highlight
//! rectangle behind the word selected by the sweep cadence, with every word
//! drawn in the foreground color on top. Only the caption band's pixels are
//! touched; the rest of the frame passes through untouched.

mod layout;
mod overlay;

use crate::captions::{CaptionCue, active_cue};
use crate::foundation::core::{Canvas, FrameRGBA};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::layout::{LaidWord, highlight_index, layout_two_lines};
use crate::render::overlay::{TextBrush, TextRasterizer, blend_premul_band_over_opaque};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Visual style of the caption overlay.
#[derive(Clone, Debug)]
pub struct CaptionStyle {
    /// Raw bytes of the caption font (TTF/OTF).
    pub font_bytes: Vec<u8>,
    /// Font size in pixels.
    pub font_size_px: f32,
    /// Fraction of the frame width a caption line may occupy.
    pub safe_width_ratio: f32,
    /// Horizontal gap between words in pixels.
    pub word_gap_px: f32,
    /// Gap between the upper line's bottom and the vertical center.
    pub line_offset_above_px: f32,
    /// Gap between the vertical center and the lower line's top.
    pub line_offset_below_px: f32,
    /// Horizontal padding of the highlight rectangle.
    pub highlight_pad_x: f32,
    /// Vertical padding of the highlight rectangle.
    pub highlight_pad_y: f32,
    /// Highlight rectangle color.
    pub highlight_rgb: [u8; 3],
    /// Foreground text color.
    pub text_rgba: [u8; 4],
    /// Highlight sweep period in seconds.
    pub sweep_period_secs: f64,
}

impl CaptionStyle {
    /// Style with the stock reel look for the given font.
    pub fn new(font_bytes: Vec<u8>) -> Self {
        Self {
            font_bytes,
            font_size_px: 52.0,
            safe_width_ratio: 0.8,
            word_gap_px: 20.0,
            line_offset_above_px: 30.0,
            line_offset_below_px: 20.0,
            highlight_pad_x: 5.0,
            highlight_pad_y: 10.0,
            highlight_rgb: [128, 0, 128],
            text_rgba: [255, 255, 255, 255],
            sweep_period_secs: 2.0,
        }
    }
}

/// Seam for burning captions onto frames, driven by the pipeline once per
/// frame. [`CaptionRenderer`] is the production implementation.
pub trait CaptionOverlay {
    /// Overlay whatever cue is active at `t` onto `frame` in place.
    fn apply(&mut self, frame: &mut FrameRGBA, t: f64, cues: &[CaptionCue]) -> ReelResult<()>;
}

struct CachedBand {
    data: Vec<u8>,
    width: u32,
    height: u32,
    top: i64,
}

/// Renders caption overlays onto frames of one canvas size.
pub struct CaptionRenderer {
    style: CaptionStyle,
    canvas: Canvas,
    raster: TextRasterizer,
    ctx: Option<vello_cpu::RenderContext>,

    word_metrics: HashMap<String, (f32, f32)>,
    word_layouts: HashMap<String, Arc<parley::Layout<TextBrush>>>,
    band_cache: HashMap<(String, usize), CachedBand>,
    band_lru: VecDeque<(String, usize)>,
    band_capacity: usize,
}

impl CaptionRenderer {
    /// Create a renderer for `canvas`-sized frames.
    pub fn new(style: CaptionStyle, canvas: Canvas) -> ReelResult<Self> {
        if canvas.width == 0 || canvas.height == 0 {
            return Err(ReelError::validation(
                "caption canvas width/height must be non-zero",
            ));
        }
        if canvas.width > u16::MAX as u32 || canvas.height > u16::MAX as u32 {
            return Err(ReelError::validation("caption canvas exceeds raster limits"));
        }
        if !(style.sweep_period_secs.is_finite() && style.sweep_period_secs > 0.0) {
            return Err(ReelError::validation("sweep period must be positive"));
        }
        if !(0.0..=1.0).contains(&style.safe_width_ratio) || style.safe_width_ratio == 0.0 {
            return Err(ReelError::validation(
                "safe width ratio must be in (0, 1]",
            ));
        }
        let raster = TextRasterizer::new(style.font_bytes.clone())?;
        Ok(Self {
            style,
            canvas,
            raster,
            ctx: None,
            word_metrics: HashMap::new(),
            word_layouts: HashMap::new(),
            band_cache: HashMap::new(),
            band_lru: VecDeque::new(),
            band_capacity: 16,
        })
    }

    /// Overlay the cue active at `t` onto `frame` in place. Frames without an
    /// active cue pass through untouched.
    pub fn apply(&mut self, frame: &mut FrameRGBA, t: f64, cues: &[CaptionCue]) -> ReelResult<()> {
        if frame.width != self.canvas.width || frame.height != self.canvas.height {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.canvas.width, self.canvas.height
            )));
        }
        frame.validate()?;

        let Some(cue) = active_cue(cues, t) else {
            return Ok(());
        };
        let cue_text = cue.text.clone();

        let mut measured = Vec::new();
        for word in cue_text.split_whitespace() {
            let (w, _) = self.measure(word)?;
            measured.push((word.to_owned(), w));
        }
        let laid = layout_two_lines(
            &measured,
            self.canvas.width as f32,
            self.style.safe_width_ratio,
            self.style.word_gap_px,
        );
        if laid.is_empty() {
            return Ok(());
        }

        let hi = highlight_index(t, laid.len(), self.style.sweep_period_secs);
        let key = (cue_text, hi);
        if !self.band_cache.contains_key(&key) {
            let band = self.render_band(&laid, hi)?;
            self.insert_band(key.clone(), band);
        } else {
            self.touch_band(&key);
        }
        let band = self
            .band_cache
            .get(&key)
            .ok_or_else(|| ReelError::caption("caption band cache miss after insert"))?;

        blend_premul_band_over_opaque(frame, &band.data, band.width, band.height, band.top)
    }

    fn measure(&mut self, word: &str) -> ReelResult<(f32, f32)> {
        if let Some(m) = self.word_metrics.get(word) {
            return Ok(*m);
        }
        let m = self.raster.measure_word(word, self.style.font_size_px)?;
        self.word_metrics.insert(word.to_owned(), m);
        Ok(m)
    }

    fn word_layout(&mut self, word: &str) -> ReelResult<Arc<parley::Layout<TextBrush>>> {
        if let Some(l) = self.word_layouts.get(word) {
            return Ok(l.clone());
        }
        let [r, g, b, a] = self.style.text_rgba;
        let layout = self
            .raster
            .layout_word(word, self.style.font_size_px, TextBrush { r, g, b, a })?;
        let layout = Arc::new(layout);
        self.word_layouts.insert(word.to_owned(), layout.clone());
        Ok(layout)
    }

    /// Rasterize the caption band for one cue layout and highlight index.
    ///
    /// The band covers both text lines plus highlight padding, full frame
    /// width, and is premultiplied for the blend step.
    fn render_band(&mut self, laid: &[LaidWord], hi: usize) -> ReelResult<CachedBand> {
        let line_h = laid
            .iter()
            .map(|w| self.word_metrics.get(&w.text).map(|m| m.1).unwrap_or(0.0))
            .fold(0.0f32, f32::max)
            .max(self.style.font_size_px);

        let center = self.canvas.height as f32 / 2.0;
        let line_tops = [
            center - self.style.line_offset_above_px - line_h,
            center + self.style.line_offset_below_px,
        ];

        let used_lines: Vec<usize> = {
            let mut v: Vec<usize> = laid.iter().map(|w| w.line).collect();
            v.dedup();
            v
        };
        let band_top = used_lines
            .iter()
            .map(|&l| line_tops[l])
            .fold(f32::INFINITY, f32::min)
            - self.style.highlight_pad_y;
        let band_bottom = used_lines
            .iter()
            .map(|&l| line_tops[l] + line_h)
            .fold(f32::NEG_INFINITY, f32::max)
            + self.style.highlight_pad_y;
        let band_top = band_top.floor().max(0.0);
        let band_height = (band_bottom.ceil() - band_top).max(1.0) as u32;
        let band_height = band_height.min(self.canvas.height).min(u16::MAX as u32);

        let mut ctx = match self.ctx.take() {
            Some(ctx)
                if u32::from(ctx.width()) == self.canvas.width
                    && u32::from(ctx.height()) == band_height =>
            {
                ctx
            }
            _ => vello_cpu::RenderContext::new(self.canvas.width as u16, band_height as u16),
        };
        ctx.reset();

        // Highlight rectangle behind the swept word.
        if let Some(word) = laid.get(hi) {
            let top = line_tops[word.line] - band_top;
            let [r, g, b] = self.style.highlight_rgb;
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, 255));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                f64::from(word.x - self.style.highlight_pad_x),
                f64::from(top - self.style.highlight_pad_y),
                f64::from(word.x + word.width + self.style.highlight_pad_x),
                f64::from(top + line_h + self.style.highlight_pad_y),
            ));
        }

        for word in laid {
            let layout = self.word_layout(&word.text)?;
            let top = line_tops[word.line] - band_top;
            overlay::draw_word_glyphs(
                &mut ctx,
                self.raster.font(),
                &layout,
                f64::from(word.x),
                f64::from(top),
            );
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(self.canvas.width as u16, band_height as u16);
        ctx.render_to_pixmap(&mut pixmap);
        let data = pixmap.data_as_u8_slice().to_vec();
        self.ctx = Some(ctx);

        Ok(CachedBand {
            data,
            width: self.canvas.width,
            height: band_height,
            top: band_top as i64,
        })
    }

    fn insert_band(&mut self, key: (String, usize), band: CachedBand) {
        self.band_cache.insert(key.clone(), band);
        self.band_lru.push_back(key);
        while self.band_lru.len() > self.band_capacity {
            if let Some(old) = self.band_lru.pop_front() {
                self.band_cache.remove(&old);
            }
        }
    }

    fn touch_band(&mut self, key: &(String, usize)) {
        if let Some(pos) = self.band_lru.iter().position(|k| k == key) {
            self.band_lru.remove(pos);
            self.band_lru.push_back(key.clone());
        }
    }
}

impl CaptionOverlay for CaptionRenderer {
    fn apply(&mut self, frame: &mut FrameRGBA, t: f64, cues: &[CaptionCue]) -> ReelResult<()> {
        CaptionRenderer::apply(self, frame, t, cues)
    }
}
