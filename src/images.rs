//! Asynchronous image loading.
//!
//! Layout never waits for an image.  [`ImageResolver::resolve`] hands out a
//! [`TextureSlot`] straight away; the slot is empty (drawn as a
//! placeholder) until a worker has fetched and decoded the image and the
//! host has registered it as a texture on its render thread.
//!
//! ```text
//!  render thread                   worker pool (2 threads)
//!  -------------                   -----------------------
//!  resolve(url) --spawn-----------> fetch + decode
//!        |                               |
//!  pump(registry) <----channel-----------+
//!    register texture, fill slot, run callbacks
//! ```

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, OnceLock};

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;

use crate::render::line::TextureSlot;
use crate::render::UvRect;
use crate::{Error, Result};

/// The number of background image workers.
pub const WORKER_THREADS: usize = 2;

/// A host texture handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// A texture which has been registered with the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadedTexture {
    /// The host's handle.
    pub id: TextureId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// What to draw for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureRef {
    /// Not loaded (yet, or ever); draw a placeholder.
    Pending,
    /// A texture registered with the host.
    Loaded(TextureId),
    /// A sprite of the host's GUI icon atlas.
    Sprite(&'static BuiltinIcon),
}

/// A built-in GUI icon which can be referenced from markup.
#[derive(Debug, PartialEq, Eq)]
pub struct BuiltinIcon {
    /// The id used in markup, e.g. `icon-heart-full`.
    pub id: &'static str,
    /// The host's sprite name.
    pub sprite: &'static str,
    /// Location in the 256x256 icon atlas.
    pub uv: UvRect,
    /// Draw width.
    pub width: u32,
    /// Draw height.
    pub height: u32,
}

const fn icon(id: &'static str, sprite: &'static str, u: u32, v: u32) -> BuiltinIcon {
    BuiltinIcon {
        id,
        sprite,
        uv: UvRect {
            u,
            v,
            w: 9,
            h: 9,
            texture_width: 256,
            texture_height: 256,
        },
        width: 9,
        height: 9,
    }
}

static ICONS: [BuiltinIcon; 15] = [
    icon("icon-health-full", "hud/heart/full", 52, 0),
    icon("icon-health-half", "hud/heart/half", 61, 0),
    icon("icon-health-empty", "hud/heart/container", 16, 0),
    icon("icon-heart-full", "hud/heart/full", 52, 0),
    icon("icon-heart-half", "hud/heart/half", 61, 0),
    icon("icon-heart-empty", "hud/heart/container", 16, 0),
    icon("icon-armor-full", "hud/armor_full", 34, 9),
    icon("icon-armor-half", "hud/armor_half", 25, 9),
    icon("icon-armor-empty", "hud/armor_empty", 16, 9),
    icon("icon-toughness-full", "hud/armor_full", 34, 9),
    icon("icon-toughness-half", "hud/armor_half", 25, 9),
    icon("icon-toughness-empty", "hud/armor_empty", 16, 9),
    icon("icon-food-full", "hud/food_full", 52, 27),
    icon("icon-food-half", "hud/food_half", 61, 27),
    icon("icon-food-empty", "hud/food_empty", 16, 27),
];

/// Look up a built-in icon by its markup id.
pub fn builtin_icon(id: &str) -> Option<&'static BuiltinIcon> {
    let found = ICONS.iter().find(|icon| icon.id == id);
    match found {
        Some(icon) => log::trace!("icon {} -> sprite {}", id, icon.sprite),
        None => log::debug!("unknown icon id {:?}", id),
    }
    found
}

/// A decoded image, as RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major RGBA8 pixels.
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    /// Decode PNG or JPEG data.
    pub fn decode(bytes: &[u8]) -> Result<DecodedImage> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }
}

/// Fetches the raw bytes of an image.  Called on a worker thread.
pub trait ImageFetcher: Send + Sync + 'static {
    /// Return the body found at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl<F> ImageFetcher for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync + 'static,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self(url)
    }
}

/// The host's texture store.  Only ever used on the render thread.
pub trait TextureRegistry {
    /// Upload a decoded image and return its handle.
    fn register(&mut self, url: &str, image: &DecodedImage) -> Result<TextureId>;
}

/// Called on the render thread once an image has become available.
pub type ReadyCallback = Box<dyn FnOnce(&LoadedTexture) + Send>;

/// Something which can turn image URLs into textures.
pub trait ImageResolver: Send + Sync {
    /// Return the slot for `url`, starting a load if needed.
    ///
    /// `on_ready` runs once the texture becomes available; it is dropped
    /// unrun if the texture is already available or can never be loaded.
    fn resolve(&self, url: &str, on_ready: Option<ReadyCallback>) -> TextureSlot;
}

/// A resolver which never loads anything: every image stays a placeholder.
///
/// Useful for headless layout, where only image sizes matter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Placeholders;

impl ImageResolver for Placeholders {
    fn resolve(&self, _url: &str, _on_ready: Option<ReadyCallback>) -> TextureSlot {
        Arc::new(OnceLock::new())
    }
}

struct Completion {
    url: String,
    result: Result<DecodedImage>,
}

#[derive(Default)]
struct SharedState {
    slots: Mutex<FxHashMap<String, TextureSlot>>,
    downloading: Mutex<FxHashSet<String>>,
    waiters: Mutex<FxHashMap<String, Vec<ReadyCallback>>>,
    failed: Mutex<FxHashSet<String>>,
}

/// The process-wide image service.
///
/// One bridge is meant to be shared (via `Arc`) by every renderer, so that
/// the texture cache and the set of in-flight downloads are global.
/// Requests for a URL which is already loading are coalesced onto the one
/// fetch; a URL which failed once is never retried.
pub struct ImageBridge {
    state: Arc<SharedState>,
    fetcher: Arc<dyn ImageFetcher>,
    pool: rayon::ThreadPool,
    sender: Sender<Completion>,
    receiver: Mutex<Receiver<Completion>>,
}

impl std::fmt::Debug for ImageBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBridge")
            .field("cached", &self.state.slots.lock().len())
            .field("downloading", &self.state.downloading.lock().len())
            .field("failed", &self.state.failed.lock().len())
            .finish()
    }
}

impl ImageBridge {
    /// Start the worker pool.
    pub fn new(fetcher: impl ImageFetcher) -> Result<ImageBridge> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(WORKER_THREADS)
            .thread_name(|i| format!("omnisearch-image-{}", i))
            .build()?;
        let (sender, receiver) = channel();
        Ok(ImageBridge {
            state: Arc::new(SharedState::default()),
            fetcher: Arc::new(fetcher),
            pool,
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    /// Returns true while a fetch for `url` is outstanding.
    pub fn is_downloading(&self, url: &str) -> bool {
        self.state.downloading.lock().contains(url)
    }

    /// Returns true if `url` failed to load.
    pub fn is_failed(&self, url: &str) -> bool {
        self.state.failed.lock().contains(url)
    }

    /// The texture for `url`, if it has been loaded.
    pub fn cached(&self, url: &str) -> Option<LoadedTexture> {
        self.state
            .slots
            .lock()
            .get(url)
            .and_then(|slot| slot.get().copied())
    }

    fn spawn_fetch(&self, url: &str) {
        log::debug!("fetching image {}", url);
        let url = url.to_string();
        let fetcher = Arc::clone(&self.fetcher);
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = fetcher
                .fetch(&url)
                .and_then(|bytes| DecodedImage::decode(&bytes));
            // The bridge may be gone; then nobody wants the result.
            let _ = sender.send(Completion { url, result });
        });
    }

    /// Finish loads which have completed since the last call.  Must be
    /// called on the render thread; returns the number of loads finished.
    pub fn pump(&self, registry: &mut dyn TextureRegistry) -> usize {
        let completions: Vec<Completion> = {
            let receiver = self.receiver.lock();
            receiver.try_iter().collect()
        };
        let count = completions.len();
        for Completion { url, result } in completions {
            self.state.downloading.lock().remove(&url);
            let waiters = self.state.waiters.lock().remove(&url).unwrap_or_default();
            let loaded = result.and_then(|image| {
                let id = registry.register(&url, &image)?;
                Ok(LoadedTexture {
                    id,
                    width: image.width,
                    height: image.height,
                })
            });
            match loaded {
                Ok(texture) => {
                    log::debug!(
                        "image {} ready ({}x{})",
                        url,
                        texture.width,
                        texture.height
                    );
                    let slot = self.slot(&url);
                    let _ = slot.set(texture);
                    for waiter in waiters {
                        waiter(&texture);
                    }
                }
                Err(err) => {
                    log::warn!("failed to load image {}: {}", url, err);
                    self.state.failed.lock().insert(url);
                }
            }
        }
        count
    }

    fn slot(&self, url: &str) -> TextureSlot {
        let mut slots = self.state.slots.lock();
        Arc::clone(slots.entry(url.to_string()).or_default())
    }
}

impl ImageResolver for ImageBridge {
    fn resolve(&self, url: &str, on_ready: Option<ReadyCallback>) -> TextureSlot {
        let slot = self.slot(url);
        if slot.get().is_some() || self.is_failed(url) {
            return slot;
        }
        if let Some(callback) = on_ready {
            self.state
                .waiters
                .lock()
                .entry(url.to_string())
                .or_default()
                .push(callback);
        }
        let newly_started = self.state.downloading.lock().insert(url.to_string());
        if newly_started {
            self.spawn_fetch(url);
        }
        slot
    }
}

/// Convenience for hosts whose fetcher reports errors as strings.
pub fn fetch_error(url: &str, reason: impl Into<String>) -> Error {
    Error::ImageFetch {
        url: url.into(),
        reason: reason.into(),
    }
}
