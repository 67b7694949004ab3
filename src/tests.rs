use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::{self, Config};
use crate::images::{
    builtin_icon, ImageResolver, LoadedTexture, Placeholders, ReadyCallback, TextureId,
    TextureRef,
};
use crate::render::cell_metrics::CellMetrics;
use crate::render::line::{LineType, RenderableLine, RenderablePart, Style, TextureSlot};
use crate::render::painter::LineMetrics;
use crate::render::{Canvas, FontMetrics, Rect, UvRect};
use crate::{Colour, Error, HtmlRenderer};

/// Like assert_eq!(), but prints out the results normally as well
macro_rules! assert_eq_str {
    ($a:expr, $b:expr) => {
        if $a != $b {
            println!("<<<\n{:?}\n===\n{:?}\n>>>", $a, $b);
            assert_eq!($a, $b);
        }
    };
}

macro_rules! assert_close {
    ($a:expr, $b:expr) => {
        let (a, b): (f32, f32) = ($a, $b);
        assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
    };
}

/// 10 units per cell, lines 9 high.
fn font() -> CellMetrics {
    CellMetrics::new(10.0, 9.0)
}

/// Scale and spacing of 1, so positions are easy to work out.
fn flat() -> Config {
    config::standard().scale(1.0).line_spacing(1.0)
}

fn renderer_conf(conf: Config) -> HtmlRenderer<CellMetrics> {
    conf.build(font(), Arc::new(Placeholders)).unwrap()
}

fn renderer() -> HtmlRenderer<CellMetrics> {
    renderer_conf(flat())
}

fn texts(lines: &[RenderableLine]) -> Vec<String> {
    lines.iter().map(|l| l.text().trim_end().to_string()).collect()
}

#[track_caller]
fn test_lines_conf(conf: Config, input: &str, width: f32, expected: &[&str]) {
    let mut r = renderer_conf(conf);
    r.prepare(input, width, None);
    assert_eq_str!(texts(r.lines()), expected);
}

#[track_caller]
fn test_lines(input: &str, width: f32, expected: &[&str]) {
    test_lines_conf(flat(), input, width, expected)
}

fn images(lines: &[RenderableLine]) -> Vec<(Option<String>, f32, f32)> {
    lines
        .iter()
        .flat_map(|l| l.parts())
        .filter_map(|p| match p {
            RenderablePart::Image(img) => Some((
                img.source_key().map(String::from),
                img.draw_width(),
                img.draw_height(),
            )),
            RenderablePart::Styled(_) => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Push(f32, f32, f32),
    Pop,
    Clip(Rect),
    Unclip,
    Text(String, f32, f32, Style),
    Texture(TextureRef, f32, f32, Option<UvRect>),
    Fill(Rect, Colour),
}

#[derive(Default)]
struct Recorder {
    ops: Vec<Op>,
}

impl Recorder {
    fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Text(t, ..) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn pushes(&self) -> Vec<(f32, f32, f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Push(x, y, s) => Some((*x, *y, *s)),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for Recorder {
    fn push_transform(&mut self, dx: f32, dy: f32, scale: f32) {
        self.ops.push(Op::Push(dx, dy, scale));
    }
    fn pop_transform(&mut self) {
        self.ops.push(Op::Pop);
    }
    fn enable_clip(&mut self, rect: Rect) {
        self.ops.push(Op::Clip(rect));
    }
    fn disable_clip(&mut self) {
        self.ops.push(Op::Unclip);
    }
    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: &Style) {
        self.ops.push(Op::Text(text.into(), x, y, style.clone()));
    }
    fn draw_texture(
        &mut self,
        texture: TextureRef,
        x: f32,
        y: f32,
        _w: f32,
        _h: f32,
        uv: Option<UvRect>,
    ) {
        self.ops.push(Op::Texture(texture, x, y, uv));
    }
    fn fill_rect(&mut self, rect: Rect, colour: Colour) {
        self.ops.push(Op::Fill(rect, colour));
    }
}

/// Hands out slots which are already loaded, and keeps any callbacks.
#[derive(Default)]
struct Preloaded {
    texture: Option<LoadedTexture>,
    callbacks: Mutex<Vec<ReadyCallback>>,
    requested: Mutex<Vec<String>>,
}

impl ImageResolver for Preloaded {
    fn resolve(&self, url: &str, on_ready: Option<ReadyCallback>) -> TextureSlot {
        self.requested.lock().push(url.into());
        let slot = Arc::new(OnceLock::new());
        match self.texture {
            Some(texture) => {
                let _ = slot.set(texture);
            }
            None => self.callbacks.lock().extend(on_ready),
        }
        slot
    }
}

const MIXED: &str = r##"
<span class="common-text-title-1">Iron Golem</span>
<p>The <b>iron golem</b> is a <a href="/w/Mob">mob</a> which protects villagers,
added in version 1.2.5 of the game. 铁傀儡是一种保护村民的生物。</p>
<ul><li>Health: 100 <svg class="common-mcicon"><use xlink:href="#icon-heart-full"></use></svg></li>
<li><p>Attack: <span style="color: #ff5555">7 to 21</span></p></li></ul>
<ol start="2"><li>Spawns in villages</li><li>Can be <i>built</i> by players</li></ol>
<p><img data-src="/img/golem.png" width="320" height="240"></p>
<p>Aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa</p>
"##;

#[test]
fn test_empty() {
    let mut r = renderer();
    assert_eq!(r.prepare("", 100.0, None), 0.0);
    assert!(r.lines().is_empty());
    assert_eq!(r.prepare("<p>   </p><div>\n</div>", 100.0, None), 0.0);
    assert!(r.lines().is_empty());
}

#[test]
fn test_para() {
    test_lines("<p>Hello</p>", 100.0, &["Hello"]);
}

#[test]
fn test_wrap_words() {
    // The space after "bbbb" doesn't fit, so it is dropped.
    test_lines("<p>aaaa bbbb cccc</p>", 95.0, &["aaaa bbbb", "cccc"]);
    test_lines("<p>aaaa   bbbb\n\tcccc</p>", 200.0, &["aaaa bbbb cccc"]);
}

#[test]
fn test_wrap_long_word() {
    let word = "a".repeat(80);
    let mut r = renderer();
    r.prepare(&format!("<p>{}</p>", word), 50.0, None);
    assert_eq!(r.lines().len(), 16);
    assert!(texts(r.lines()).iter().all(|t| t == "aaaaa"));
}

#[test]
fn test_wrap_cjk() {
    test_lines(
        "<p>你好世界你好世界</p>",
        50.0,
        &["你好", "世界", "你好", "世界"],
    );
}

#[test]
fn test_merge_same_style() {
    let mut r = renderer();
    r.prepare(r#"Hello <a href="https://x/">there</a>"#, 300.0, None);
    let parts = r.lines()[0].parts();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].width(), 60.0);
    assert_eq!(parts[1].link(), Some("https://x/"));

    r.prepare("<b>a</b> <i>b</i>", 300.0, None);
    assert_eq_str!(texts(r.lines()), ["a b"]);
}

#[test]
fn test_link_paragraph() {
    let mut r = renderer_conf(config::standard());
    r.prepare(r#"<p>Hello <a href="https://x/y">there</a></p>"#, 1000.0, None);
    assert_eq!(r.lines().len(), 1);
    let line = &r.lines()[0];
    assert_eq!(line.parts().len(), 2);
    assert_eq!(line.parts()[0].link(), None);
    assert_eq!(line.parts()[1].link(), Some("https://x/y"));
    assert!(line.margin_bottom() > 0.0);
    assert_eq!(line.line_type(), LineType::Text);
}

#[test]
fn test_breaks() {
    test_lines("a<br>b", 100.0, &["a", "b"]);
    test_lines("a<br><br><br>b", 100.0, &["a", "b"]);
    test_lines("<br>a", 100.0, &["a"]);
}

#[test]
fn test_block_margins() {
    let mut r = renderer();
    let height = r.prepare("<p>one</p><p>two</p>", 100.0, None);
    assert_eq!(r.lines()[0].margin_bottom(), 4.5);
    assert_eq!(r.lines()[1].margin_bottom(), 4.5);
    assert_eq!(height, 27.0);

    r.prepare("<div>one<br></div>two", 100.0, None);
    assert_eq!(r.lines()[0].margin_bottom(), 0.0);

    r.prepare("<h3>Title</h3><table><tr><td>cell</td></tr></table>", 100.0, None);
    assert_eq_str!(texts(r.lines()), ["Title", "cell"]);
    assert_eq!(r.lines()[0].margin_bottom(), 4.5);
    assert_eq!(r.lines()[1].margin_bottom(), 4.5);
}

#[test]
fn test_unordered_list() {
    test_lines(
        "<p>Before</p><ul><li>one</li>\n<li>two</li></ul>After",
        200.0,
        &["Before", "• one", "• two", "After"],
    );
    test_lines(
        r#"<ul style="list-style-type: circle"><li>round</li></ul>"#,
        200.0,
        &["◦ round"],
    );
}

#[test]
fn test_ordered_list() {
    test_lines(
        r#"<ol start="3"><li>three</li><li>four</li></ol>"#,
        200.0,
        &["3. three", "4. four"],
    );
    test_lines(
        r#"<ol style="list-style-type: lower-roman"><li>x</li><li>y</li></ol>"#,
        200.0,
        &["1) x", "2) y"],
    );
}

#[test]
fn test_list_markers_bold() {
    let mut r = renderer();
    r.prepare("<ol><li>step</li></ol>", 200.0, None);
    match &r.lines()[0].parts()[0] {
        RenderablePart::Styled(p) => {
            assert_eq!(p.text(), "1. ");
            assert!(p.style().bold);
        }
        other => panic!("unexpected part {:?}", other),
    }
}

#[test]
fn test_nested_lists() {
    test_lines(
        "<ul><li>outer<ol><li>inner</li><li>again</li></ol></li><li>last</li></ul>",
        200.0,
        &["• outer", "1. inner", "2. again", "• last"],
    );
}

#[test]
fn test_paragraph_in_item() {
    test_lines(
        "<ul><li><p>Item text</p></li></ul>",
        200.0,
        &["• Item text"],
    );
}

#[test]
fn test_later_paragraphs_in_item() {
    let mut r = renderer();
    r.prepare("<ul><li><p>alpha</p><p>beta</p></li></ul>", 200.0, None);
    assert_eq_str!(texts(r.lines()), ["• alpha", "beta"]);
    assert_eq!(r.lines()[0].margin_bottom(), 0.0);
    assert_eq!(r.lines()[1].margin_bottom(), 4.5);
}

#[test]
fn test_item_breaks_before() {
    test_lines("<ul>stray<li>a</li></ul>", 200.0, &["stray", "• a"]);
    test_lines(
        "<ol><li>one</li>between<li>two</li></ol>",
        200.0,
        &["1. one", "between", "2. two"],
    );
}

#[test]
fn test_item_outside_list() {
    test_lines("before<li>loose</li>", 200.0, &["before", "loose"]);
}

#[test]
fn test_links() {
    let mut r = renderer();
    r.prepare(
        r#"<a href="/w/Stone">Stone</a> <a href="Iron">Iron</a> <a href="https://other.test/">x</a>"#,
        500.0,
        Some("https://wiki.test/a/b"),
    );
    let links: Vec<_> = r.lines()[0].parts().iter().filter_map(|p| p.link()).collect();
    assert_eq!(
        links,
        ["https://wiki.test/w/Stone", "https://wiki.test/a/Iron", "https://other.test/"]
    );
    match &r.lines()[0].parts()[0] {
        RenderablePart::Styled(p) => assert_eq!(p.style().colour, Colour::LINK),
        other => panic!("unexpected part {:?}", other),
    }
}

#[test]
fn test_link_bad_base() {
    let mut r = renderer();
    r.prepare(r#"<a href="Iron">Iron</a>"#, 500.0, Some("not a url"));
    assert_eq!(r.lines()[0].parts()[0].link(), Some("Iron"));
}

#[test]
fn test_empty_href() {
    let mut r = renderer();
    r.prepare(r#"<a href="">plain</a> <a href="  ">text</a>"#, 500.0, None);
    for part in r.lines()[0].parts() {
        assert_eq!(part.link(), None);
        if let RenderablePart::Styled(p) = part {
            assert_eq!(p.style().colour, Colour::TEXT);
        }
    }
}

#[test]
fn test_inline_colour() {
    let mut r = renderer();
    r.prepare(
        r#"plain <span style="color: #ff0000">red <b>bold red</b></span>"#,
        500.0,
        None,
    );
    let styles: Vec<_> = r.lines()[0]
        .parts()
        .iter()
        .filter_map(|p| match p {
            RenderablePart::Styled(p) => Some((p.text().to_string(), p.style().clone())),
            RenderablePart::Image(_) => None,
        })
        .collect();
    assert_eq!(styles[0].1.colour, Colour::TEXT);
    assert_eq!(styles[1].0, "red ");
    assert_eq!(styles[1].1.colour, Colour::rgb(0xff, 0, 0));
    assert_eq!(styles[2].0, "bold red");
    assert_eq!(styles[2].1.colour, Colour::rgb(0xff, 0, 0));
    assert!(styles[2].1.bold);
}

#[test]
fn test_bad_inline_colour() {
    let mut r = renderer();
    r.prepare(r#"<span style="color: nonsense">text</span>"#, 500.0, None);
    match &r.lines()[0].parts()[0] {
        RenderablePart::Styled(p) => assert_eq!(p.style().colour, Colour::TEXT),
        other => panic!("unexpected part {:?}", other),
    }
}

#[test]
fn test_version_not_bold() {
    let mut r = renderer();
    r.prepare("<b>Requires 1.20.1 or later</b>", 1000.0, None);
    let parts: Vec<_> = r.lines()[0]
        .parts()
        .iter()
        .filter_map(|p| match p {
            RenderablePart::Styled(p) => Some((p.text(), p.style().bold)),
            RenderablePart::Image(_) => None,
        })
        .collect();
    assert_eq!(
        parts,
        [("Requires ", true), ("1.20.1", false), (" or later", true)]
    );
}

#[test]
fn test_skip_classes() {
    let input = r#"<div class="common-text-menu">menu</div><p>body <span class="x uknowtoomuch">hidden</span></p>"#;
    test_lines(input, 300.0, &["body"]);
    test_lines_conf(flat().no_skip_classes(), input, 300.0, &["menu", "body hidden"]);
    test_lines_conf(
        flat().skip_class("extra"),
        r#"<p class="extra">gone</p><p>kept</p>"#,
        300.0,
        &["kept"],
    );
}

#[test]
fn test_scripts_and_comments_ignored() {
    test_lines(
        "<style>p { color: red }</style><script>var x;</script><!-- note --><p>text</p>",
        300.0,
        &["text"],
    );
}

#[test]
fn test_image_sizes() {
    let mut r = renderer();
    r.prepare(
        concat!(
            r#"<img src="a.png">"#,
            r#"<img src="b.png" width="200">"#,
            r#"<img src="c.png" data-width="300" width="5" height="100">"#,
            r#"<img src="d.png" width="1000" height="500">"#,
        ),
        100.0,
        None,
    );
    assert_eq!(
        images(r.lines()),
        [
            (Some("a.png".to_string()), 10.0, 10.0),
            (Some("b.png".to_string()), 40.0, 10.0),
            (Some("c.png".to_string()), 60.0, 20.0),
            (Some("d.png".to_string()), 100.0, 50.0),
        ]
    );
    assert_eq!(r.lines().len(), 4);
    assert!(r.lines().iter().all(|l| l.line_type() == LineType::Image));
}

#[test]
fn test_image_source_precedence() {
    let mut r = renderer();
    r.prepare(
        concat!(
            r#"<img src="s.png" data-original="o.png" data-src="d.png">"#,
            r#"<img src="s.png" data-original="o.png">"#,
            r#"<img src="s.png" data-src="">"#,
            r#"<img alt="no source">"#,
        ),
        300.0,
        Some("https://img.test/x/"),
    );
    let urls: Vec<_> = images(r.lines()).into_iter().filter_map(|i| i.0).collect();
    assert_eq!(
        urls,
        [
            "https://img.test/x/d.png",
            "https://img.test/x/o.png",
            "https://img.test/x/s.png",
        ]
    );
}

#[test]
fn test_image_starts_line() {
    let mut r = renderer();
    r.prepare(r#"<p>See <img src="a.png" width="100" height="50"> here</p>"#, 300.0, None);
    assert_eq_str!(texts(r.lines()), ["See", " here"]);
    assert_eq!(r.lines()[0].line_type(), LineType::Text);
    assert_eq!(r.lines()[1].line_type(), LineType::Image);
    assert_eq!(r.lines()[1].height(), 10.0);
}

#[test]
fn test_image_only_block() {
    let mut r = renderer();
    r.prepare(
        r#"<p><img src="x.png" width="100" height="50"></p><p>text</p>"#,
        300.0,
        None,
    );
    assert_eq!(r.lines()[0].line_type(), LineType::Image);
    assert_eq!(r.lines()[0].margin_bottom(), 0.0);
    assert_eq!(r.lines()[1].margin_bottom(), 4.5);
}

#[test]
fn test_natural_image_size() {
    let resolver = Arc::new(Preloaded {
        texture: Some(LoadedTexture {
            id: TextureId(7),
            width: 200,
            height: 100,
        }),
        ..Default::default()
    });
    let mut r = flat().build(font(), resolver.clone()).unwrap();
    r.prepare(
        r#"<img src="a.png"><img src="b.png" width="100"><img src="c.png" height="50">"#,
        300.0,
        None,
    );
    let sizes: Vec<_> = images(r.lines()).into_iter().map(|i| (i.1, i.2)).collect();
    assert_eq!(sizes, [(40.0, 20.0), (20.0, 10.0), (20.0, 10.0)]);
    assert_eq!(resolver.requested.lock().len(), 3);
    match &r.lines()[0].parts()[0] {
        RenderablePart::Image(img) => {
            assert_eq!(img.texture(), TextureRef::Loaded(TextureId(7)));
            assert_eq!(img.texture_size(), Some((200, 100)));
        }
        other => panic!("unexpected part {:?}", other),
    }
}

#[test]
fn test_update_hook() {
    let resolver = Arc::new(Preloaded::default());
    let mut r = flat().build(font(), resolver.clone()).unwrap();
    let updates = Arc::new(AtomicUsize::new(0));
    let counter = updates.clone();
    r.on_update(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    r.prepare(r#"<img src="a.png"><p>x</p><img src="b.png">"#, 300.0, None);
    let callbacks: Vec<_> = resolver.callbacks.lock().drain(..).collect();
    assert_eq!(callbacks.len(), 2);
    let texture = LoadedTexture {
        id: TextureId(1),
        width: 16,
        height: 16,
    };
    for cb in callbacks {
        cb(&texture);
    }
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[test]
fn test_icons_inline() {
    let mut r = renderer();
    r.prepare(
        concat!(
            r##"Heals <svg class="common-mcicon"><use xlink:href="#icon-heart-full"></use></svg>"##,
            r##" and <svg class="common-mcicon"><use href="#icon-food-half"></use></svg>"##,
            r##" <svg class="common-mcicon"><use href="#no-such-icon"></use></svg>"##,
        ),
        300.0,
        None,
    );
    assert_eq!(r.lines().len(), 1);
    let line = &r.lines()[0];
    assert_eq!(line.line_type(), LineType::Text);
    let icons: Vec<_> = line
        .parts()
        .iter()
        .filter_map(|p| match p {
            RenderablePart::Image(img) => Some(img.texture()),
            RenderablePart::Styled(_) => None,
        })
        .collect();
    assert_eq!(
        icons,
        [
            TextureRef::Sprite(builtin_icon("icon-heart-full").unwrap()),
            TextureRef::Sprite(builtin_icon("icon-food-half").unwrap()),
        ]
    );
}

#[test]
fn test_caption() {
    let mut r = renderer();
    let height = r.prepare(
        r#"<img src="/a.png" width="100" height="50"><span class="figcaption">A cap</span>after"#,
        200.0,
        Some("https://wiki.test/"),
    );
    let lines = r.lines();
    assert_eq_str!(texts(lines), ["", "A cap", "after"]);
    assert_eq!(lines[0].line_type(), LineType::Image);
    assert_eq!(lines[1].line_type(), LineType::Caption);
    assert_eq!(lines[2].line_type(), LineType::Text);
    assert_eq!(
        images(lines)[0].0.as_deref(),
        Some("https://wiki.test/a.png")
    );
    match &lines[1].parts()[0] {
        RenderablePart::Styled(p) => assert_eq!(p.style().colour, Colour::CAPTION),
        other => panic!("unexpected part {:?}", other),
    }
    // The image line doesn't add spacing before its caption.
    assert_close!(height, 10.0 + (9.0 + 4.5) * 0.7 + 9.0);
}

#[test]
fn test_caption_wraps_as_caption() {
    let mut r = renderer();
    // 0.7 scale: each cell is 7px wide.
    r.prepare(
        r#"<span class="figcaption">aaaaa bbbbb ccccc</span>"#,
        60.0,
        None,
    );
    assert_eq_str!(texts(r.lines()), ["aaaaa", "bbbbb", "ccccc"]);
    assert!(r.lines().iter().all(RenderableLine::is_caption));
    assert_eq!(r.lines()[2].margin_bottom(), 4.5);
    assert_eq!(r.lines()[1].margin_bottom(), 0.0);
}

#[test]
fn test_title_inside_caption() {
    let mut r = renderer();
    r.prepare(
        r#"<span class="figcaption">aaaaa <span class="common-text-title">T</span>bbbbb ccccc</span>"#,
        60.0,
        None,
    );
    assert_eq_str!(texts(r.lines()), ["aaaaa", "T", "bbbbb", "ccccc"]);
    let types: Vec<_> = r.lines().iter().map(|l| l.line_type()).collect();
    assert_eq!(
        types,
        [LineType::Caption, LineType::Title, LineType::Caption, LineType::Caption]
    );
}

#[test]
fn test_title() {
    let mut r = renderer();
    r.prepare(
        r#"before<span class="common-text-title-2">Recipe</span>after"#,
        300.0,
        None,
    );
    let lines = r.lines();
    assert_eq_str!(texts(lines), ["before", "Recipe", "after"]);
    assert_eq!(lines[1].line_type(), LineType::Title);
    assert_eq!(lines[2].line_type(), LineType::Text);
    assert_close!(lines[1].margin_bottom(), 5.4);
    match &lines[1].parts()[0] {
        RenderablePart::Styled(p) => {
            assert_eq!(p.style().colour, Colour::TITLE);
            assert!(p.style().bold);
        }
        other => panic!("unexpected part {:?}", other),
    }
}

#[test]
fn test_render_culls() {
    let mut r = renderer();
    let input: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let height = r.prepare(&input.join("<br>"), 100.0, None);
    assert_eq!(height, 90.0);

    let mut canvas = Recorder::default();
    assert_eq!(r.render(&mut canvas, 0.0, 0.0, 20.0, 40.0), 3);
    assert_eq!(canvas.texts(), ["2", "3", "4"]);
    assert_eq!(canvas.ops.first(), Some(&Op::Clip(Rect::new(0.0, 20.0, 100.0, 20.0))));
    assert_eq!(canvas.ops.last(), Some(&Op::Unclip));

    let mut canvas = Recorder::default();
    assert_eq!(r.render(&mut canvas, 0.0, 100.0, 0.0, 50.0), 0);
    assert_eq!(r.render(&mut canvas, 5.0, -30.0, 0.0, 1000.0), 7);
    assert_eq!(canvas.pushes()[0], (5.0, -3.0, 1.0));
}

#[test]
fn test_render_balanced() {
    let mut r = renderer_conf(config::standard());
    r.prepare(MIXED, 180.0, Some("https://wiki.test/"));
    let mut canvas = Recorder::default();
    let drawn = r.render(&mut canvas, 0.0, 0.0, 0.0, r.content_height());
    assert_eq!(drawn, r.lines().len());
    let pushes = canvas.ops.iter().filter(|op| matches!(op, Op::Push(..))).count();
    let pops = canvas.ops.iter().filter(|op| matches!(op, Op::Pop)).count();
    assert_eq!(pushes, drawn);
    assert_eq!(pops, drawn);
    // Title decoration.
    assert!(canvas
        .ops
        .iter()
        .any(|op| matches!(op, Op::Fill(_, c) if *c == Colour::from_argb(0x22151518))));
    // Icons are drawn from the sprite sheet; remote images have no UVs.
    assert!(canvas
        .ops
        .iter()
        .any(|op| matches!(op, Op::Texture(TextureRef::Sprite(_), _, _, Some(_)))));
    assert!(canvas
        .ops
        .iter()
        .any(|op| matches!(op, Op::Texture(TextureRef::Pending, _, _, None))));
}

#[test]
fn test_render_centres_images() {
    let mut r = renderer();
    r.prepare(
        r#"<img src="a.png" width="100" height="50"><span class="figcaption">A cap</span>"#,
        200.0,
        None,
    );
    let mut canvas = Recorder::default();
    r.render(&mut canvas, 10.0, 0.0, 0.0, 100.0);
    let pushes = canvas.pushes();
    assert_eq!(pushes[0], (100.0, 0.0, 1.0));
    assert_close!(pushes[1].0, 10.0 + (200.0 - 35.0) / 2.0);
    assert_close!(pushes[1].1, 10.0);
    assert_close!(pushes[1].2, 0.7);
}

#[test]
fn test_link_at() {
    let mut r = renderer_conf(config::standard().scale(1.0));
    r.prepare(r#"Go <a href="https://x/y">here</a> now"#, 500.0, None);
    assert_eq!(r.link_url_at(35.0, 1.0, 0.0, 0.0), Some("https://x/y"));
    assert_eq!(r.link_url_at(69.0, 10.0, 0.0, 0.0), Some("https://x/y"));
    assert_eq!(r.link_url_at(10.0, 1.0, 0.0, 0.0), None);
    assert_eq!(r.link_url_at(75.0, 1.0, 0.0, 0.0), None);
    assert_eq!(r.link_url_at(35.0, 11.0, 0.0, 0.0), None);
    assert_eq!(r.link_url_at(135.0, 51.0, 100.0, 50.0), Some("https://x/y"));
    assert_eq!(r.link_url_at(35.0, 1.0, 100.0, 50.0), None);
    assert_eq!(r.part_at(5.0, 1.0, 0.0, 0.0).map(|p| p.text()), Some("Go "));
}

#[test]
fn test_hit_test_matches_layout() {
    let mut r = renderer_conf(config::standard());
    r.prepare(MIXED, 200.0, Some("https://wiki.test/"));
    let metrics = LineMetrics {
        scale: 0.85,
        line_spacing: 1.2,
    };
    let lines = r.lines();
    let mut top = 0.0;
    let mut checked = 0;
    for i in 0..lines.len() {
        let line = &lines[i];
        let y = top + metrics.scaled_height(line) / 2.0;
        let left = metrics.x_offset(line, 200.0);
        for (x0, x1, part) in metrics.part_spans(line, left) {
            if let RenderablePart::Styled(p) = part {
                let hit = r.part_at((x0 + x1) / 2.0, y, 0.0, 0.0);
                assert_eq!(hit.map(|h| h.text()), Some(p.text()));
                checked += 1;
            }
        }
        top += metrics.advance(lines, i);
    }
    assert!(checked > 5);
    assert_eq!(
        r.lines()
            .iter()
            .flat_map(|l| l.parts())
            .find_map(|p| p.link()),
        Some("https://wiki.test/w/Mob")
    );
}

#[test]
fn test_layout_invariants() {
    for width in [40.0, 60.0, 120.0, 180.0, 400.0] {
        let mut r = renderer_conf(config::standard());
        let height = r.prepare(MIXED, width, Some("https://wiki.test/"));
        let metrics = LineMetrics {
            scale: 0.85,
            line_spacing: 1.2,
        };
        assert!(!r.lines().is_empty());
        assert_close!(height, metrics.content_height(r.lines()));
        assert_eq!(height, r.content_height());
        assert_eq!(r.width(), width);
        for line in r.lines() {
            assert!(line.has_content(), "blank line at width {}", width);
            let w = line.total_width() * metrics.effective_scale(line.line_type());
            // Only a lone character or image may be wider than the panel.
            let unbreakable = match line.parts() {
                [RenderablePart::Image(_)] => true,
                [RenderablePart::Styled(p)] => p.text().chars().count() == 1,
                _ => false,
            };
            assert!(
                unbreakable || w <= width + 1e-3,
                "line {:?} is {} wide at width {}",
                line.text(),
                w,
                width
            );
        }
    }
}

#[test]
fn test_idempotent() {
    let mut r = renderer_conf(config::standard());
    let first = r.prepare(MIXED, 150.0, Some("https://wiki.test/"));
    let first_lines = texts(r.lines());
    r.prepare("<p>something else</p>", 90.0, None);
    let again = r.prepare(MIXED, 150.0, Some("https://wiki.test/"));
    assert_eq!(first, again);
    assert_eq_str!(texts(r.lines()), first_lines);
}

#[test]
fn test_width_keeps_text() {
    let squash = |lines: &[RenderableLine]| -> String {
        lines
            .iter()
            .map(|l| l.text())
            .collect::<String>()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    };
    let mut r = renderer_conf(config::standard());
    r.prepare(MIXED, 400.0, None);
    let wide = squash(r.lines());
    let wide_count = r.lines().len();
    r.prepare(MIXED, 70.0, None);
    assert_eq_str!(squash(r.lines()), wide);
    assert!(r.lines().len() > wide_count);
}

#[test]
fn test_width_correction() {
    // Only 5 cells fit in 50px, but a correction of 2 allows 10.
    test_lines("<p>aaaaaaaaaa</p>", 50.0, &["aaaaa", "aaaaa"]);
    test_lines_conf(
        flat().width_correction(2.0),
        "<p>aaaaaaaaaa</p>",
        50.0,
        &["aaaaaaaaaa"],
    );
}

#[test]
fn test_default_scale() {
    // 0.85 scale: 8.5px per cell, so 10 cells fit in 90px.
    test_lines_conf(
        config::standard(),
        "<p>aaaaaaaaaaaaaaaaaaaa</p>",
        90.0,
        &["aaaaaaaaaa", "aaaaaaaaaa"],
    );
}

#[test]
fn test_prepare_from_read() {
    let mut r = renderer();
    let height = r
        .prepare_from_read("<p>from a reader</p>".as_bytes(), 300.0, None)
        .unwrap();
    assert_eq!(height, 13.5);
    assert_eq_str!(texts(r.lines()), ["from a reader"]);
}

#[test]
fn test_malformed_html() {
    test_lines("<p>open <b>bold <i>both</p>after", 300.0, &["open bold both", "after"]);
    test_lines("</div></p>stray", 300.0, &["stray"]);
}

#[derive(Debug)]
struct NoFont;

impl FontMetrics for NoFont {
    fn width(&self, text: &str) -> f32 {
        text.len() as f32
    }
    fn line_height(&self) -> f32 {
        0.0
    }
}

#[derive(Debug)]
struct Zero;

impl FontMetrics for Zero {
    fn width(&self, _text: &str) -> f32 {
        0.0
    }
    fn line_height(&self) -> f32 {
        9.0
    }
}

#[test]
fn test_errors() {
    assert!(matches!(
        HtmlRenderer::new(NoFont, Arc::new(Placeholders)),
        Err(Error::NoFont)
    ));
    assert!(matches!(
        config::standard().scale(0.0).build(font(), Arc::new(Placeholders)),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        config::standard()
            .line_spacing(f32::NAN)
            .build(font(), Arc::new(Placeholders)),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        config::standard()
            .block_margin(-1.0)
            .build(font(), Arc::new(Placeholders)),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_zero_width_font_terminates() {
    let mut r = flat().build(Zero, Arc::new(Placeholders)).unwrap();
    // Measured as one unit per character instead.
    r.prepare(&format!("<p>{}</p>", "x".repeat(50)), 10.0, None);
    assert_eq!(r.lines().len(), 5);
    assert!(texts(r.lines()).iter().all(|t| t == "xxxxxxxxxx"));
}

#[test]
fn test_zero_width_panel() {
    let mut r = renderer();
    r.prepare("<p>ab cd</p>", 0.0, None);
    assert_eq_str!(texts(r.lines()), ["a", "b", "c", "d"]);
}
