//! Layered asset registry: resolves logical paths through an ordered
//! stack of overlay sources into decoded, cached, hot-reloadable,
//! fallback-capable assets.

mod assets;
mod cache;
mod error;
mod events;
mod format;
pub mod path;
mod registry;
mod source;
mod store;
mod task;
mod ticket;

pub use self::assets::Assets;
pub use self::error::QueryError;
pub use self::events::{ChangeEvent, ChangeKind, ChangeReceiver};
pub use self::format::{
    decode_json, BasicFormat, CompoundFormat, JsonDocument, JsonDocumentFormat,
};
pub use self::source::{Source, SourceId};
pub use self::store::{DirStore, FileStore, MemoryStore, WritableFileStore};
pub use self::ticket::{BatchTicket, LoadOutcome, LoadTicket};

/// Marker for types that live in the asset cache. Instances are owned by
/// the cache; borrows handed out by the query layer stay valid until the
/// path is unloaded.
pub trait Asset: Send + Sync + 'static {}
