//! Editor host abstraction used by the session layer, plus an in-memory host.
//! 工作階段層所使用的編輯器主機介面，以及記憶體內的主機實作。

pub mod deferred;
pub mod document;
pub mod host;
pub mod memory;
mod split_view;

pub use deferred::{DeferredInitQueue, InitCallback};
pub use document::{detect_filetype, Buffer};
pub use host::{
    clamp_mark, BufferId, BufferInfo, BufferKind, DocumentHost, EventSuppression, Geometry, Host,
    HostError, Mark, NotifyLevel, OptionMap, OptionScope, OptionTarget, OptionValue, Orientation,
    TabId, WindowHost, WindowId, WindowLayout,
};
pub use memory::{HostEvent, MemoryHost, Notification};
