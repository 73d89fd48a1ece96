//! Session persistence for editor workspaces: layout capture and restore, document
//! re-materialisation, named session files, hooks, extensions and autosave.
//! 編輯器工作區的工作階段保存：配置擷取與還原、文件重建、具名工作階段檔案、掛勾、擴充與自動儲存。

mod serde_path;
mod util;

pub mod codec;
pub mod config;
pub mod error;
pub mod extension;
pub mod guard;
pub mod hooks;
pub mod manager;
pub mod model;
pub mod options;
pub mod registry;
pub mod store;

pub use codec::{capture_layout, restore_layout, CaptureContext, RestoreContext, ScaleFactors};
pub use config::{default_session_root, AutosaveConfig, ConfigError, ConfigStore, SessionConfig};
pub use error::SessionError;
pub use extension::{Extension, ExtensionRegistry};
pub use guard::{EventGuard, LoadingFlag, LoadingGuard};
pub use hooks::{HookCallback, HookEvent, HookId, HookOptions, HookPoint, HookRegistry};
pub use manager::{
    Attachment, CaptureScope, DeleteOptions, LoadOptions, ResetPolicy, RestoreOutcome,
    SaveOptions, SessionInfo, SessionManager,
};
pub use model::{
    DocumentRecord, DocumentRef, ExtensionWindow, LayoutNode, LeafState, SessionDocument,
    SessionMetadata, TabRecord, SESSION_FORMAT_VERSION,
};
pub use registry::{
    capture_documents, default_buffer_filter, materialize_documents, BufferFilter, Materialized,
};
pub use store::{SessionStore, SessionSummary};
