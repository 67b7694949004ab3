extern crate argparse;
extern crate omnisearch_html;
use argparse::{ArgumentParser, Store, StoreOption, StoreTrue};
use std::io;
use std::io::Write;
use std::sync::Arc;

use omnisearch_html::config;
use omnisearch_html::images::{Placeholders, TextureRef};
use omnisearch_html::render::cell_metrics::CellMetrics;
use omnisearch_html::render::line::{LineType, RenderablePart, Style};
use omnisearch_html::render::{Canvas, Rect, UvRect};
use omnisearch_html::{Colour, HtmlRenderer};

/// Prints every drawing call, one per line.
struct DrawLog<W: Write> {
    out: W,
}

impl<W: Write> Canvas for DrawLog<W> {
    fn push_transform(&mut self, dx: f32, dy: f32, scale: f32) {
        let _ = writeln!(self.out, "push ({:.1}, {:.1}) x{:.2}", dx, dy, scale);
    }
    fn pop_transform(&mut self) {
        let _ = writeln!(self.out, "pop");
    }
    fn enable_clip(&mut self, rect: Rect) {
        let _ = writeln!(self.out, "clip {:?}", rect);
    }
    fn disable_clip(&mut self) {
        let _ = writeln!(self.out, "unclip");
    }
    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: &Style) {
        let _ = writeln!(
            self.out,
            "  text ({:.1}, {:.1}) #{:08x}{}{} {:?}",
            x,
            y,
            style.colour.to_argb(),
            if style.bold { " bold" } else { "" },
            if style.italic { " italic" } else { "" },
            text
        );
    }
    fn draw_texture(
        &mut self,
        texture: TextureRef,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        _uv: Option<UvRect>,
    ) {
        let what = match texture {
            TextureRef::Pending => "placeholder".to_string(),
            TextureRef::Loaded(id) => format!("texture {}", id.0),
            TextureRef::Sprite(icon) => format!("sprite {}", icon.sprite),
        };
        let _ = writeln!(self.out, "  {} ({:.1}, {:.1}) {}x{}", what, x, y, w, h);
    }
    fn fill_rect(&mut self, rect: Rect, colour: Colour) {
        let _ = writeln!(self.out, "  fill {:?} #{:08x}", rect, colour.to_argb());
    }
}

fn dump_lines<W: Write>(renderer: &HtmlRenderer<CellMetrics>, out: &mut W) -> io::Result<()> {
    for line in renderer.lines() {
        let tag = match line.line_type() {
            LineType::Text => "text",
            LineType::Image => "image",
            LineType::Caption => "caption",
            LineType::Title => "title",
        };
        let mut text = String::new();
        for part in line.parts() {
            match part {
                RenderablePart::Styled(p) => text.push_str(p.text()),
                RenderablePart::Image(img) => text.push_str(&format!(
                    "[{} {}x{}]",
                    img.source_key().unwrap_or("icon"),
                    img.draw_width(),
                    img.draw_height()
                )),
            }
        }
        writeln!(out, "{:>7} | {}", tag, text)?;
    }
    writeln!(out, "height: {}", renderer.content_height())
}

fn main() {
    env_logger::init();

    let mut infile: Option<String> = None;
    let mut outfile: Option<String> = None;
    let mut base: Option<String> = None;
    let mut width: f32 = 200.0;
    let mut scale: f32 = 0.85;
    let mut cell: f32 = 6.0;
    let mut draw = false;

    {
        let mut ap = ArgumentParser::new();
        ap.refer(&mut infile).add_argument(
            "infile",
            StoreOption,
            "Input HTML file (default is standard input)",
        );
        ap.refer(&mut width).add_option(
            &["-w", "--width"],
            Store,
            "Panel width in pixels (default is 200)",
        );
        ap.refer(&mut scale)
            .add_option(&["-s", "--scale"], Store, "Draw scale (default is 0.85)");
        ap.refer(&mut cell).add_option(
            &["--cell"],
            Store,
            "Width of one character cell (default is 6)",
        );
        ap.refer(&mut base).add_option(
            &["-b", "--base"],
            StoreOption,
            "URL to resolve relative links against",
        );
        ap.refer(&mut draw).add_option(
            &["-d", "--draw"],
            StoreTrue,
            "Print drawing calls instead of lines",
        );
        ap.refer(&mut outfile).add_option(
            &["-o", "--output"],
            StoreOption,
            "Output file (default is standard output)",
        );
        ap.parse_args_or_exit();
    }

    let mut renderer = config::standard()
        .scale(scale)
        .build(CellMetrics::new(cell, 9.0), Arc::new(Placeholders))
        .expect("Invalid settings");

    let height = match infile {
        None => {
            let stdin = io::stdin();
            renderer.prepare_from_read(&mut stdin.lock(), width, base.as_deref())
        }
        Some(name) => {
            let file = std::fs::File::open(name).expect("Tried to open file");
            renderer.prepare_from_read(file, width, base.as_deref())
        }
    }
    .expect("Failed to read input");

    let mut out: Box<dyn Write> = match outfile {
        None => Box::new(io::stdout()),
        Some(name) => Box::new(std::fs::File::create(name).expect("Tried to create file")),
    };
    if draw {
        let mut canvas = DrawLog { out: &mut out };
        renderer.render(&mut canvas, 0.0, 0.0, 0.0, height);
    } else {
        dump_lines(&renderer, &mut out).unwrap();
    }
}
