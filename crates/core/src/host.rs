use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 選項值。 / Option values are stored as loosely typed JSON values.
pub type OptionValue = serde_json::Value;

/// 有序的選項對應表。 / Ordered option-name to value mapping.
pub type OptionMap = BTreeMap<String, OptionValue>;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// 分頁識別碼。 / Opaque identifier for a tab page.
    TabId,
    "tab#"
);
handle!(
    /// 視窗識別碼。 / Opaque identifier for a window.
    WindowId,
    "win#"
);
handle!(
    /// 緩衝區識別碼。 / Opaque identifier for a document buffer.
    BufferId,
    "buf#"
);

/// 顯示區尺寸（以字元格計）。 / Display geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn extent(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Horizontal => self.width,
            Orientation::Vertical => self.height,
        }
    }
}

/// 游標或標記位置（行從 1 起算，欄從 0 起算）。 /
/// Cursor or mark position: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    pub line: usize,
    pub column: usize,
}

impl Mark {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Mark {
    fn default() -> Self {
        Self { line: 1, column: 0 }
    }
}

/// 分割方向。 / Direction along which a split divides its space.
///
/// `Horizontal` places children side by side (their widths vary), `Vertical` stacks
/// them (their heights vary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }
}

/// 主機回報的視窗分割描述。 / The host's own description of a tab's window arrangement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowLayout {
    /// Children side by side.
    Row(Vec<WindowLayout>),
    /// Children stacked top to bottom.
    Col(Vec<WindowLayout>),
    Leaf(WindowId),
}

impl WindowLayout {
    /// Returns the windows in left-to-right, top-to-bottom order.
    pub fn windows(&self) -> Vec<WindowId> {
        let mut out = Vec::new();
        self.collect_windows(&mut out);
        out
    }

    fn collect_windows(&self, out: &mut Vec<WindowId>) {
        match self {
            WindowLayout::Leaf(win) => out.push(*win),
            WindowLayout::Row(children) | WindowLayout::Col(children) => {
                for child in children {
                    child.collect_windows(out);
                }
            }
        }
    }
}

/// 緩衝區種類。 / Kind of buffer, mirroring the usual editor buffer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    Normal,
    Help,
    Scratch,
    Terminal,
}

/// 緩衝區摘要。 / Summary of a buffer's identity and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    pub id: BufferId,
    /// Resolved path, or empty for unnamed buffers.
    pub name: String,
    pub kind: BufferKind,
    pub listed: bool,
    pub loaded: bool,
}

/// 選項作用範圍。 / The scope an option lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionScope {
    Global,
    Tab,
    Buffer,
    Window,
}

/// 讀寫選項時的對象。 / Concrete target for an option get/set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTarget {
    Global,
    Tab(TabId),
    Buffer(BufferId),
    Window(WindowId),
}

/// 事件抑制狀態。 / Which host UI events are currently suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventSuppression {
    #[default]
    Off,
    Events(Vec<String>),
    All,
}

impl EventSuppression {
    pub fn suppresses(&self, event: &str) -> bool {
        match self {
            EventSuppression::Off => false,
            EventSuppression::All => true,
            EventSuppression::Events(names) => names.iter().any(|name| name == event),
        }
    }
}

/// 通知等級。 / Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

/// 主機操作錯誤。 / Errors raised by host operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no such tab: {0}")]
    NoSuchTab(TabId),
    #[error("no such window: {0}")]
    NoSuchWindow(WindowId),
    #[error("no such buffer: {0}")]
    NoSuchBuffer(BufferId),
    #[error("not enough room to split {window}")]
    NoRoom { window: WindowId },
    #[error("cannot read {name}: {source}")]
    Unreadable {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("cursor position {line}:{column} outside buffer")]
    InvalidCursor { line: usize, column: usize },
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("option {name} cannot be set on {target:?}")]
    OptionScopeMismatch { name: String, target: OptionTarget },
    #[error("cannot close the last tab")]
    LastTab,
}

/// 主機文件 API。 / Host document API.
pub trait DocumentHost {
    /// All buffers in creation order.
    fn list_buffers(&self) -> Vec<BufferId>;

    fn buffer_info(&self, buf: BufferId) -> Result<BufferInfo, HostError>;

    /// Finds a buffer by resolved name or creates an unloaded one. An empty name always
    /// creates a fresh unnamed scratch buffer.
    fn find_or_create_buffer(&mut self, name: &str) -> Result<BufferId, HostError>;

    /// Reads the buffer's content from its backing file.
    fn load_buffer(&mut self, buf: BufferId) -> Result<(), HostError>;

    fn delete_buffer(&mut self, buf: BufferId) -> Result<(), HostError>;

    fn line_count(&self, buf: BufferId) -> Result<usize, HostError>;

    /// Length in characters of the 1-based `line`.
    fn line_len(&self, buf: BufferId, line: usize) -> Result<usize, HostError>;

    fn last_edit_mark(&self, buf: BufferId) -> Result<Mark, HostError>;

    /// A loaded buffer rejects a mark outside its contents. An unloaded buffer keeps the
    /// mark as given and clamps it once loaded.
    fn set_last_edit_mark(&mut self, buf: BufferId, mark: Mark) -> Result<(), HostError>;

    /// Defers the buffer's full initialisation (filetype detection and the like) until it
    /// is first shown by a display event.
    fn defer_until_displayed(&mut self, buf: BufferId) -> Result<(), HostError>;
}

/// 主機視窗 API。 / Host windowing API.
pub trait WindowHost {
    fn display_size(&self) -> Geometry;

    fn tabs(&self) -> Vec<TabId>;

    fn current_tab(&self) -> TabId;

    fn set_current_tab(&mut self, tab: TabId) -> Result<(), HostError>;

    /// Opens a new tab after the current one with a single window showing a fresh scratch
    /// buffer, and makes it current.
    fn new_tab(&mut self) -> Result<TabId, HostError>;

    fn close_tab(&mut self, tab: TabId) -> Result<(), HostError>;

    fn window_layout(&self, tab: TabId) -> Result<WindowLayout, HostError>;

    fn current_window(&self) -> WindowId;

    fn tab_current_window(&self, tab: TabId) -> Result<WindowId, HostError>;

    /// Focuses `win`, making its tab current as well.
    fn set_current_window(&mut self, win: WindowId) -> Result<(), HostError>;

    /// Splits `win`; the new window is placed after it and shows the same buffer.
    fn split_window(
        &mut self,
        win: WindowId,
        orientation: Orientation,
    ) -> Result<WindowId, HostError>;

    fn window_size(&self, win: WindowId) -> Result<Geometry, HostError>;

    /// Requests a new extent for `win` along `orientation`. The host clamps the request to
    /// the available space.
    fn resize_window(
        &mut self,
        win: WindowId,
        orientation: Orientation,
        size: u32,
    ) -> Result<(), HostError>;

    /// Closes every other window in `win`'s tab.
    fn only_window(&mut self, win: WindowId) -> Result<(), HostError>;

    fn window_buffer(&self, win: WindowId) -> Result<BufferId, HostError>;

    fn set_window_buffer(&mut self, win: WindowId, buf: BufferId) -> Result<(), HostError>;

    fn cursor(&self, win: WindowId) -> Result<Mark, HostError>;

    /// Fails with [`HostError::InvalidCursor`] when the mark lies outside the buffer.
    fn set_cursor(&mut self, win: WindowId, mark: Mark) -> Result<(), HostError>;

    fn window_folds(&self, win: WindowId) -> Result<Vec<usize>, HostError>;

    fn set_window_folds(&mut self, win: WindowId, folds: Vec<usize>) -> Result<(), HostError>;
}

/// 完整主機介面。 / Everything the session layer needs from the editor host.
pub trait Host: DocumentHost + WindowHost {
    fn cwd(&self) -> PathBuf;

    fn set_cwd(&mut self, path: &Path) -> Result<(), HostError>;

    fn tab_cwd(&self, tab: TabId) -> Result<Option<PathBuf>, HostError>;

    fn set_tab_cwd(&mut self, tab: TabId, path: Option<PathBuf>) -> Result<(), HostError>;

    fn option_scope(&self, name: &str) -> Option<OptionScope>;

    fn get_option(&self, target: OptionTarget, name: &str) -> Option<OptionValue>;

    fn set_option(
        &mut self,
        target: OptionTarget,
        name: &str,
        value: OptionValue,
    ) -> Result<(), HostError>;

    fn event_suppression(&self) -> EventSuppression;

    fn set_event_suppression(&mut self, value: EventSuppression);

    fn notify(&mut self, level: NotifyLevel, message: &str);
}

/// 將標記限制在緩衝區有效範圍內。 / Clamps `mark` to the nearest valid position in `buf`.
pub fn clamp_mark(host: &dyn Host, buf: BufferId, mark: Mark) -> Result<Mark, HostError> {
    let lines = host.line_count(buf)?.max(1);
    let line = mark.line.clamp(1, lines);
    let len = host.line_len(buf, line).unwrap_or(0);
    Ok(Mark::new(line, mark.column.min(len)))
}
