mod http;
mod kv;
mod media;

pub use self::http::{Delivery, HttpResult, UrlError, ValidatedUrl};
pub use self::kv::{
    storage_result, KvError, KvKey, KvResult, StorageErrorCode, MAX_VALUE_SIZE,
};
pub use self::media::{
    AcquireOutcome, Acquisition, AspectRatio, ImageFormat, LocalImage, MediaError,
    MediaOperation, MediaOutput, MediaResult, MediaSource, PermissionStatus, PickConfig,
    MAX_IMAGE_SIZE_BYTES,
};

// Render comes straight from Crux; it only asks the shell to redraw.
pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::{KeyValue, KeyValueOperation};
pub use self::media::Media;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub kv: KeyValue<Event>,
    pub http: Http<Event>,
    pub media: Media<Event>,
}
