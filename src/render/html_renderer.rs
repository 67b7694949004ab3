//! The HTML renderer: lays out a document into lines, draws the visible
//! ones and maps points back to links.

use std::io;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use url::Url;

use super::layout::{should_wrap, LayoutEngine};
use super::line::{
    Colour, ImagePart, LineBuilder, LineType, RenderablePart, RenderableLine, Style, StyledPart,
};
use super::painter::{LineMetrics, Painter};
use super::{Canvas, FontMetrics, Rect};
use crate::config::{self, Config};
use crate::css::{Bullet, OrderedMarker};
use crate::images::{BuiltinIcon, ImageResolver, LoadedTexture, ReadyCallback};
use crate::{
    parse, parse_str, tree_map_reduce, DomContext, Error, RenderNode, RenderNodeInfo, Result,
    TreeMapResult,
};

/// Version numbers such as `1.20.1` are never drawn bold.
fn version_pattern() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+").expect("version regex compiles"))
}

type UpdateHook = Arc<dyn Fn() + Send + Sync>;

/// Lays out HTML for a panel of a given width and draws it.
///
/// All the layout state is rebuilt by every call to [`prepare`]; only the
/// measurement caches survive (and they are cleared too, as the width may
/// have changed).
///
/// [`prepare`]: HtmlRenderer::prepare
pub struct HtmlRenderer<F> {
    engine: LayoutEngine<F>,
    images: Arc<dyn ImageResolver>,
    config: Config,
    metrics: LineMetrics,
    lines: Vec<RenderableLine>,
    total_height: f32,
    width: f32,
    on_update: Option<UpdateHook>,
}

impl<F: std::fmt::Debug> std::fmt::Debug for HtmlRenderer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlRenderer")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("lines", &self.lines)
            .field("total_height", &self.total_height)
            .field("width", &self.width)
            .finish()
    }
}

impl<F: FontMetrics> HtmlRenderer<F> {
    /// Create a renderer with the standard configuration.
    pub fn new(font: F, images: Arc<dyn ImageResolver>) -> Result<HtmlRenderer<F>> {
        HtmlRenderer::with_config(font, images, config::standard())
    }

    /// Create a renderer.  Fails if the configuration is out of range or
    /// the font is unusable; a host should then fall back to plain text.
    pub fn with_config(
        font: F,
        images: Arc<dyn ImageResolver>,
        config: Config,
    ) -> Result<HtmlRenderer<F>> {
        config.validate()?;
        let line_height = font.line_height();
        if !(line_height.is_finite() && line_height > 0.0) {
            return Err(Error::NoFont);
        }
        Ok(HtmlRenderer {
            engine: LayoutEngine::new(font, config.width_correction),
            images,
            metrics: LineMetrics {
                scale: config.scale,
                line_spacing: config.line_spacing,
            },
            config,
            lines: Vec::new(),
            total_height: 0.0,
            width: 0.0,
            on_update: None,
        })
    }

    /// Run `hook` (on the thread calling [`ImageBridge::pump`]) whenever
    /// an image of the current content finishes loading.
    ///
    /// [`ImageBridge::pump`]: crate::images::ImageBridge::pump
    pub fn on_update(&mut self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_update = Some(Arc::new(hook));
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lay out `html` for a panel `width` pixels wide.  Relative links and
    /// image sources are resolved against `base_url`.  Returns the content
    /// height.
    pub fn prepare(&mut self, html: &str, width: f32, base_url: Option<&str>) -> f32 {
        let context = self.dom_context(base_url);
        let tree = parse_str(html, &context);
        self.layout(tree, width)
    }

    /// Like [`prepare`](HtmlRenderer::prepare), reading the HTML from
    /// `input`.
    pub fn prepare_from_read(
        &mut self,
        input: impl io::Read,
        width: f32,
        base_url: Option<&str>,
    ) -> Result<f32> {
        let context = self.dom_context(base_url);
        let tree = parse(input, &context)?;
        Ok(self.layout(tree, width))
    }

    fn dom_context(&self, base_url: Option<&str>) -> DomContext {
        let base = base_url.and_then(|base| match Url::parse(base) {
            Ok(url) => Some(url),
            Err(err) => {
                log::debug!("ignoring bad base URL {:?}: {}", base, err);
                None
            }
        });
        DomContext {
            base,
            skip_classes: self.config.skip_classes.clone(),
        }
    }

    /// Lay out an already converted render tree.
    pub fn layout(&mut self, tree: RenderNode, width: f32) -> f32 {
        self.engine.clear();
        self.width = width.max(0.0);
        let font_height = self.engine.font().line_height();
        let max_width = self.engine.corrected_max_width(self.width);
        let mut flow = Flow {
            engine: &mut self.engine,
            images: &*self.images,
            on_update: self.on_update.clone(),
            lines: LineBuilder::new(font_height),
            styles: vec![Style::default()],
            lists: Vec::new(),
            metrics: self.metrics,
            max_width,
            font_height,
            image_scale: self.config.image_scale,
            block_margin: self.config.block_margin,
            title_margin: self.config.title_margin,
        };
        tree_map_reduce(&mut flow, tree, |flow, node| flow.visit(node));
        self.lines = flow.lines.into_lines();
        self.total_height = self.metrics.content_height(&self.lines);
        log::debug!(
            "laid out {} lines, {}px high, at width {}",
            self.lines.len(),
            self.total_height,
            self.width
        );
        self.total_height
    }

    /// The laid-out lines.
    pub fn lines(&self) -> &[RenderableLine] {
        &self.lines
    }

    /// Total height of the content, in screen pixels.
    pub fn content_height(&self) -> f32 {
        self.total_height
    }

    /// The width the content was laid out for.
    pub fn width(&self) -> f32 {
        self.width
    }

    fn painter(&self) -> Painter {
        Painter {
            metrics: self.metrics,
            font_height: self.engine.font().line_height(),
            max_width: self.engine.corrected_max_width(self.width),
        }
    }

    /// Top of each line relative to the top of the content, with the line's
    /// drawn height.
    fn line_tops(&self) -> impl Iterator<Item = (f32, f32, &RenderableLine)> + '_ {
        let mut y = 0.0;
        (0..self.lines.len()).map(move |i| {
            let line = &self.lines[i];
            let top = y;
            y += self.metrics.advance(&self.lines, i);
            (top, self.metrics.scaled_height(line), line)
        })
    }

    /// Draw the content with its top-left corner at `(x, y)`.  Only lines
    /// overlapping `viewport_top..viewport_bottom` are drawn, clipped to
    /// that band.  Returns the number of lines drawn.
    pub fn render<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        x: f32,
        y: f32,
        viewport_top: f32,
        viewport_bottom: f32,
    ) -> usize {
        let painter = self.painter();
        canvas.enable_clip(Rect::new(
            x,
            viewport_top,
            painter.max_width,
            (viewport_bottom - viewport_top).max(0.0),
        ));
        let mut drawn = 0;
        for (top, height, line) in self.line_tops() {
            let line_y = y + top;
            if line_y >= viewport_bottom {
                break;
            }
            if line_y + height > viewport_top {
                painter.paint_line(canvas, line, x, line_y);
                drawn += 1;
            }
        }
        canvas.disable_clip();
        drawn
    }

    /// The text run drawn at screen point `(x, y)` when the content is
    /// rendered at `(origin_x, origin_y)`.
    pub fn part_at(&self, x: f32, y: f32, origin_x: f32, origin_y: f32) -> Option<&StyledPart> {
        let max_width = self.engine.corrected_max_width(self.width);
        let (_, _, line) = self.line_tops().find(|(top, height, _)| {
            let line_y = origin_y + top;
            y >= line_y && y < line_y + height
        })?;
        let left = origin_x + self.metrics.x_offset(line, max_width);
        self.metrics
            .part_spans(line, left)
            .find(|(x0, x1, _)| x >= *x0 && x < *x1)
            .and_then(|(_, _, part)| match part {
                RenderablePart::Styled(text) => Some(text),
                RenderablePart::Image(_) => None,
            })
    }

    /// The link target under screen point `(x, y)`, if any.
    pub fn link_url_at(&self, x: f32, y: f32, origin_x: f32, origin_y: f32) -> Option<&str> {
        self.part_at(x, y, origin_x, origin_y)
            .and_then(|part| part.style().link.as_deref())
    }
}

#[derive(Debug)]
enum ListState {
    Ordered { next: i64, marker: OrderedMarker },
    Unordered(Bullet),
}

impl ListState {
    fn next_prefix(&mut self) -> String {
        match self {
            ListState::Ordered { next, marker } => {
                let prefix = marker.prefix(*next);
                *next += 1;
                prefix
            }
            ListState::Unordered(bullet) => bullet.prefix().into(),
        }
    }
}

/// Parse-time state of one layout pass.
struct Flow<'r, F> {
    engine: &'r mut LayoutEngine<F>,
    images: &'r dyn ImageResolver,
    on_update: Option<UpdateHook>,
    lines: LineBuilder,
    /// Never empty: the bottom entry is the document's default style.
    styles: Vec<Style>,
    lists: Vec<ListState>,
    metrics: LineMetrics,
    /// Width-corrected budget, screen pixels.
    max_width: f32,
    font_height: f32,
    image_scale: f32,
    block_margin: f32,
    title_margin: f32,
}

type FlowResult<'r, F> = TreeMapResult<'r, Flow<'r, F>, RenderNode, ()>;

fn pending<'r, F, G>(children: Vec<RenderNode>, after: G) -> FlowResult<'r, F>
where
    F: 'r,
    G: FnOnce(&mut Flow<'r, F>) + 'r,
{
    TreeMapResult::PendingChildren {
        children,
        cons: Box::new(move |flow, _| {
            after(flow);
            Some(())
        }),
    }
}

impl<'r, F: FontMetrics> Flow<'r, F> {
    fn style(&self) -> Style {
        self.styles.last().cloned().unwrap_or_default()
    }

    fn push_style(&mut self, derive: impl FnOnce(&Style) -> Style) {
        let style = derive(&self.style());
        self.styles.push(style);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    /// The scale of the open line.
    fn scale(&self) -> f32 {
        self.metrics
            .effective_scale(self.lines.current().line_type())
    }

    fn visit(&mut self, node: RenderNode) -> FlowResult<'r, F> {
        use RenderNodeInfo::*;
        use TreeMapResult::*;
        html_trace!("visit({:?})", node);
        match node.into_info() {
            Text(text) => {
                self.add_text(&text);
                Finished(())
            }
            Container(children) => pending(children, |_| ()),
            Link(target, children) => {
                self.push_style(|s| s.with_colour(Colour::LINK).with_link(&target));
                pending(children, |flow: &mut Flow<'r, F>| flow.pop_style())
            }
            Strong(children) => {
                self.push_style(|s| s.with_bold(true));
                pending(children, |flow: &mut Flow<'r, F>| flow.pop_style())
            }
            Em(children) => {
                self.push_style(|s| s.with_italic(true));
                pending(children, |flow: &mut Flow<'r, F>| flow.pop_style())
            }
            Coloured(colour, children) => {
                self.push_style(|s| s.with_colour(colour));
                pending(children, |flow: &mut Flow<'r, F>| flow.pop_style())
            }
            Caption(children) => {
                self.lines.new_line(false);
                self.lines.enter_scope(LineType::Caption);
                self.push_style(|s| s.with_colour(Colour::CAPTION));
                pending(children, |flow: &mut Flow<'r, F>| {
                    flow.pop_style();
                    flow.end_scope(flow.block_margin);
                })
            }
            Title(children) => {
                self.lines.new_line(false);
                self.lines.enter_scope(LineType::Title);
                self.push_style(|s| s.with_colour(Colour::TITLE).with_bold(true));
                pending(children, |flow: &mut Flow<'r, F>| {
                    flow.pop_style();
                    flow.end_scope(flow.title_margin);
                })
            }
            Img { src, width, height } => {
                self.add_image(src, width, height);
                Finished(())
            }
            Icon(icon) => {
                self.add_icon(icon);
                Finished(())
            }
            Block {
                image_only,
                children,
                ..
            } => {
                self.lines.new_line(true);
                pending(children, move |flow: &mut Flow<'r, F>| {
                    flow.end_block(image_only)
                })
            }
            Break => {
                self.lines.new_line(true);
                Finished(())
            }
            Ul(bullet, items) => {
                self.lines.new_line(true);
                self.lists.push(ListState::Unordered(bullet));
                pending(items, |flow: &mut Flow<'r, F>| {
                    flow.lists.pop();
                    flow.end_block(false);
                })
            }
            Ol {
                start,
                marker,
                items,
            } => {
                self.lines.new_line(true);
                self.lists.push(ListState::Ordered {
                    next: start,
                    marker,
                });
                // Not a block: break the line but add no margin.
                pending(items, |flow: &mut Flow<'r, F>| {
                    flow.lists.pop();
                    flow.lines.new_line(true);
                })
            }
            ListItem(children) => {
                self.lines.new_line(true);
                if let Some(prefix) = self.lists.last_mut().map(ListState::next_prefix) {
                    let bold = self.style().with_bold(true);
                    self.add_styled_text(&prefix, &bold);
                }
                pending(children, |flow: &mut Flow<'r, F>| flow.end_block(false))
            }
        }
    }

    /// Close a block: give its last line a bottom margin (unless the block
    /// holds just an image) and start a new line.
    fn end_block(&mut self, image_only: bool) {
        if !image_only && !self.lines.current().is_empty() {
            let margin = self.block_margin * self.font_height;
            self.lines.current_mut().set_margin_bottom(margin);
        }
        self.lines.new_line(true);
    }

    /// Close a caption or title.
    fn end_scope(&mut self, margin_lines: f32) {
        if !self.lines.current().is_empty() {
            let margin = margin_lines * self.font_height;
            self.lines.current_mut().set_margin_bottom(margin);
        }
        self.lines.leave_scope();
        self.lines.new_line(true);
    }

    fn add_text(&mut self, text: &str) {
        let style = self.style();
        let mut last = 0;
        for found in version_pattern().find_iter(text) {
            self.add_styled_text(&text[last..found.start()], &style);
            self.add_styled_text(found.as_str(), &style.with_bold(false));
            last = found.end();
        }
        self.add_styled_text(&text[last..], &style);
    }

    fn add_styled_text(&mut self, text: &str, style: &Style) {
        if text.is_empty() {
            return;
        }
        let s = self.scale();
        for segment in self.engine.split_text_to_segments(text, self.max_width / s) {
            if segment == " " {
                self.add_space(style);
                continue;
            }
            let s = self.scale();
            let width = self.engine.measure(&segment);
            if should_wrap(self.lines.cursor_x(), width * s, self.max_width) {
                self.lines.new_line(false);
            }
            self.push_text(&segment, style, width);
        }
    }

    /// Spaces never start a line, never follow another space and are
    /// dropped rather than wrapped.
    fn add_space(&mut self, style: &Style) {
        if self.lines.cursor_x() <= 0.0 || self.lines.current().ends_with_space() {
            return;
        }
        let width = self.engine.measure(" ");
        if self.lines.cursor_x() + width * self.scale() > self.max_width {
            self.lines.new_line(false);
            return;
        }
        self.push_text(" ", style, width);
    }

    fn push_text(&mut self, text: &str, style: &Style, width: f32) {
        let s = self.scale();
        let engine = &mut *self.engine;
        self.lines
            .current_mut()
            .push_text(text, style, width, |merged| engine.measure(merged));
        self.lines.advance(width * s);
    }

    /// Pick the unscaled draw size for an image.
    fn image_size(
        &self,
        width: Option<u32>,
        height: Option<u32>,
        texture: Option<&LoadedTexture>,
    ) -> (f32, f32) {
        const DEFAULT_SIZE: f32 = 50.0;
        let natural = texture
            .filter(|t| t.width > 0 && t.height > 0)
            .map(|t| (t.width as f32, t.height as f32));
        let (w, h) = match (width, height, natural) {
            (Some(w), Some(h), _) => (w as f32, h as f32),
            (Some(w), None, Some((tw, th))) => (w as f32, w as f32 * th / tw),
            (None, Some(h), Some((tw, th))) => (h as f32 * tw / th, h as f32),
            (None, None, Some(size)) => size,
            (w, h, None) => (
                w.map_or(DEFAULT_SIZE, |w| w as f32),
                h.map_or(DEFAULT_SIZE, |h| h as f32),
            ),
        };
        let mut draw_w = (w * self.image_scale).floor();
        let mut draw_h = (h * self.image_scale).floor();
        // Never wider than a line; keep the aspect ratio.
        let available = self.max_width / self.metrics.effective_scale(LineType::Image);
        if draw_w > available && draw_w > 0.0 {
            draw_h *= available / draw_w;
            draw_w = available;
        }
        (draw_w, draw_h)
    }

    fn add_image(&mut self, src: String, width: Option<u32>, height: Option<u32>) {
        if !self.lines.current().is_empty() {
            self.lines.new_line(false);
        }
        let on_ready = self.on_update.clone().map(|hook| {
            Box::new(move |_: &LoadedTexture| hook()) as ReadyCallback
        });
        let slot = self.images.resolve(&src, on_ready);
        let (draw_w, draw_h) = self.image_size(width, height, slot.get());
        let s = self.metrics.effective_scale(LineType::Image);
        if should_wrap(self.lines.cursor_x(), draw_w * s, self.max_width) {
            self.lines.new_line(false);
        }
        self.lines
            .current_mut()
            .push_image(ImagePart::remote(src, slot, draw_w, draw_h));
        let s = self.scale();
        self.lines.advance(draw_w * s);
    }

    fn add_icon(&mut self, icon: &'static BuiltinIcon) {
        let part = ImagePart::icon(icon);
        let s = self.scale();
        if should_wrap(self.lines.cursor_x(), part.draw_width() * s, self.max_width) {
            self.lines.new_line(false);
        }
        let s = self.scale();
        self.lines.advance(part.draw_width() * s);
        self.lines.current_mut().push_image(part);
    }
}
