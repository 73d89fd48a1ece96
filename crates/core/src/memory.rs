use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::debug;

use crate::deferred::DeferredInitQueue;
use crate::document::Buffer;
use crate::host::{
    BufferId, BufferInfo, DocumentHost, EventSuppression, Geometry, Host, HostError, Mark,
    NotifyLevel, OptionMap, OptionScope, OptionTarget, OptionValue, Orientation, TabId,
    WindowHost, WindowId, WindowLayout,
};
use crate::split_view::SplitView;

/// 主機事件紀錄。 / A host UI event that fired while not suppressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    pub name: String,
    pub buffer: Option<BufferId>,
}

/// 使用者通知。 / A message sent to the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
struct TabState {
    id: TabId,
    view: SplitView,
    current_window: WindowId,
    cwd: Option<PathBuf>,
    options: OptionMap,
}

#[derive(Debug, Clone)]
struct WindowState {
    tab: TabId,
    buffer: BufferId,
    cursor: Mark,
    folds: Vec<usize>,
    options: OptionMap,
}

/// 記憶體內的編輯器主機。 / Complete in-memory editor host.
///
/// Holds tabs with integral-cell frame trees, buffers backed by real files, scoped
/// options, an event log that honours event suppression, and a notification log.
/// [`MemoryHost::redraw`] plays the role of the display event and drains deferred buffer
/// initialisation.
#[derive(Debug)]
pub struct MemoryHost {
    display: Geometry,
    cwd: PathBuf,
    tabs: Vec<TabState>,
    current_tab: TabId,
    windows: BTreeMap<WindowId, WindowState>,
    buffers: BTreeMap<BufferId, Buffer>,
    global_options: OptionMap,
    option_scopes: HashMap<String, OptionScope>,
    suppression: EventSuppression,
    events: Vec<HostEvent>,
    notifications: Vec<Notification>,
    pending_init: DeferredInitQueue<Buffer>,
    next_tab: u32,
    next_window: u32,
    next_buffer: u32,
}

const GLOBAL_OPTIONS: &[&str] = &["hidden", "laststatus", "showtabline"];
const TAB_OPTIONS: &[&str] = &["cmdheight"];
const BUFFER_OPTIONS: &[&str] = &[
    "filetype",
    "readonly",
    "modifiable",
    "bufhidden",
    "binary",
    "expandtab",
    "buflisted",
];
const WINDOW_OPTIONS: &[&str] = &[
    "wrap",
    "number",
    "diff",
    "scrollbind",
    "winfixwidth",
    "winfixheight",
    "previewwindow",
];

impl MemoryHost {
    /// 建立含單一分頁與視窗的主機。 / Creates a host with one tab holding one window.
    pub fn new(display: Geometry, cwd: impl Into<PathBuf>) -> Self {
        let mut option_scopes = HashMap::new();
        let mut global_options = OptionMap::new();
        for name in GLOBAL_OPTIONS {
            option_scopes.insert(name.to_string(), OptionScope::Global);
        }
        global_options.insert("hidden".into(), OptionValue::Bool(true));
        global_options.insert("laststatus".into(), OptionValue::from(2));
        global_options.insert("showtabline".into(), OptionValue::from(1));
        for name in TAB_OPTIONS {
            option_scopes.insert(name.to_string(), OptionScope::Tab);
        }
        for name in BUFFER_OPTIONS {
            option_scopes.insert(name.to_string(), OptionScope::Buffer);
        }
        for name in WINDOW_OPTIONS {
            option_scopes.insert(name.to_string(), OptionScope::Window);
        }

        let mut host = Self {
            display,
            cwd: cwd.into(),
            tabs: Vec::new(),
            current_tab: TabId(0),
            windows: BTreeMap::new(),
            buffers: BTreeMap::new(),
            global_options,
            option_scopes,
            suppression: EventSuppression::Off,
            events: Vec::new(),
            notifications: Vec::new(),
            pending_init: DeferredInitQueue::new(),
            next_tab: 1,
            next_window: 1000,
            next_buffer: 1,
        };
        let tab = host.open_tab(0);
        host.current_tab = tab;
        host
    }

    /// 註冊自訂選項。 / Registers an additional option name under `scope`.
    pub fn register_option(&mut self, name: impl Into<String>, scope: OptionScope) {
        self.option_scopes.insert(name.into(), scope);
    }

    /// 模擬顯示區改變大小。 / Resizes the display, refitting every tab.
    pub fn set_display_size(&mut self, display: Geometry) {
        self.display = display;
        for tab in &mut self.tabs {
            tab.view.set_geometry(display);
        }
    }

    /// 在視窗中開啟檔案。 / Opens `path` in `win`, loading it if needed.
    pub fn edit(&mut self, win: WindowId, path: impl AsRef<Path>) -> Result<BufferId, HostError> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let buf = self.find_or_create_buffer(&name)?;
        if !self.buffer_ref(buf)?.is_loaded() {
            self.load_buffer(buf)?;
        }
        self.set_window_buffer(win, buf)?;
        Ok(buf)
    }

    pub fn buffer(&self, buf: BufferId) -> Option<&Buffer> {
        self.buffers.get(&buf)
    }

    pub fn buffer_mut(&mut self, buf: BufferId) -> Option<&mut Buffer> {
        self.buffers.get_mut(&buf)
    }

    pub fn find_buffer(&self, name: &str) -> Option<BufferId> {
        let resolved = self.resolve_name(name);
        self.buffers
            .values()
            .find(|buffer| buffer.name() == resolved)
            .map(Buffer::id)
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn pending_initializations(&self) -> usize {
        self.pending_init.len()
    }

    /// 顯示事件：初始化目前分頁中顯示的緩衝區。 / Display event: runs the deferred
    /// initialisation of every buffer shown in the current tab.
    pub fn redraw(&mut self) {
        let shown: Vec<BufferId> = match self.tab_state(self.current_tab) {
            Ok(tab) => tab
                .view
                .windows()
                .iter()
                .filter_map(|win| self.windows.get(win).map(|state| state.buffer))
                .collect(),
            Err(_) => return,
        };
        for buf in shown {
            let Some(callback) = self.pending_init.take(buf) else {
                continue;
            };
            if let Some(buffer) = self.buffers.get_mut(&buf) {
                callback(buffer);
                debug!("initialised {buf} on display");
                self.fire("BufReadPost", Some(buf));
            }
        }
    }

    fn fire(&mut self, name: &str, buffer: Option<BufferId>) {
        if self.suppression.suppresses(name) {
            return;
        }
        self.events.push(HostEvent {
            name: name.to_string(),
            buffer,
        });
    }

    fn resolve_name(&self, name: &str) -> String {
        let path = Path::new(name);
        if path.is_absolute() {
            name.to_string()
        } else {
            self.cwd.join(path).to_string_lossy().into_owned()
        }
    }

    fn alloc_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        id
    }

    fn alloc_window(&mut self) -> WindowId {
        let id = WindowId(self.next_window);
        self.next_window += 1;
        id
    }

    /// Inserts a new tab at `position` with one window on a fresh unnamed buffer.
    fn open_tab(&mut self, position: usize) -> TabId {
        let tab = TabId(self.next_tab);
        self.next_tab += 1;
        let buf = self.alloc_buffer();
        self.buffers.insert(buf, Buffer::unnamed(buf));
        let win = self.alloc_window();
        self.windows.insert(
            win,
            WindowState {
                tab,
                buffer: buf,
                cursor: Mark::default(),
                folds: Vec::new(),
                options: OptionMap::new(),
            },
        );
        let mut options = OptionMap::new();
        options.insert("cmdheight".into(), OptionValue::from(1));
        let position = position.min(self.tabs.len());
        self.tabs.insert(
            position,
            TabState {
                id: tab,
                view: SplitView::new(win, self.display),
                current_window: win,
                cwd: None,
                options,
            },
        );
        tab
    }

    fn tab_state(&self, tab: TabId) -> Result<&TabState, HostError> {
        self.tabs
            .iter()
            .find(|state| state.id == tab)
            .ok_or(HostError::NoSuchTab(tab))
    }

    fn tab_state_mut(&mut self, tab: TabId) -> Result<&mut TabState, HostError> {
        self.tabs
            .iter_mut()
            .find(|state| state.id == tab)
            .ok_or(HostError::NoSuchTab(tab))
    }

    fn window_state(&self, win: WindowId) -> Result<&WindowState, HostError> {
        self.windows.get(&win).ok_or(HostError::NoSuchWindow(win))
    }

    fn window_state_mut(&mut self, win: WindowId) -> Result<&mut WindowState, HostError> {
        self.windows.get_mut(&win).ok_or(HostError::NoSuchWindow(win))
    }

    fn buffer_ref(&self, buf: BufferId) -> Result<&Buffer, HostError> {
        self.buffers.get(&buf).ok_or(HostError::NoSuchBuffer(buf))
    }

    fn buffer_ref_mut(&mut self, buf: BufferId) -> Result<&mut Buffer, HostError> {
        self.buffers.get_mut(&buf).ok_or(HostError::NoSuchBuffer(buf))
    }

    fn is_displayed(&self, buf: BufferId) -> bool {
        self.windows.values().any(|state| state.buffer == buf)
    }

    /// Wipes buffers marked `bufhidden=wipe` that no window shows any more.
    fn wipe_hidden(&mut self) {
        let doomed: Vec<BufferId> = self
            .buffers
            .values()
            .filter(|buffer| {
                matches!(buffer.option("bufhidden"), Some(OptionValue::String(value)) if value == "wipe")
            })
            .map(Buffer::id)
            .filter(|buf| !self.is_displayed(*buf))
            .collect();
        for buf in doomed {
            self.buffers.remove(&buf);
            self.pending_init.cancel(buf);
            debug!("wiped hidden buffer {buf}");
        }
    }

    fn validate_mark(&self, buf: BufferId, mark: Mark) -> Result<(), HostError> {
        let buffer = self.buffer_ref(buf)?;
        let invalid = HostError::InvalidCursor {
            line: mark.line,
            column: mark.column,
        };
        let line_count = buffer.line_count().max(1);
        if mark.line == 0 || mark.line > line_count {
            return Err(invalid);
        }
        let len = buffer.line_len(mark.line).unwrap_or(0);
        if mark.column > len {
            return Err(invalid);
        }
        Ok(())
    }
}

impl DocumentHost for MemoryHost {
    fn list_buffers(&self) -> Vec<BufferId> {
        self.buffers.keys().copied().collect()
    }

    fn buffer_info(&self, buf: BufferId) -> Result<BufferInfo, HostError> {
        Ok(self.buffer_ref(buf)?.info())
    }

    fn find_or_create_buffer(&mut self, name: &str) -> Result<BufferId, HostError> {
        if name.is_empty() {
            let buf = self.alloc_buffer();
            self.buffers.insert(buf, Buffer::scratch(buf));
            return Ok(buf);
        }
        if let Some(existing) = self.find_buffer(name) {
            return Ok(existing);
        }
        let resolved = self.resolve_name(name);
        let buf = self.alloc_buffer();
        self.buffers.insert(buf, Buffer::named(buf, resolved));
        self.fire("BufAdd", Some(buf));
        Ok(buf)
    }

    fn load_buffer(&mut self, buf: BufferId) -> Result<(), HostError> {
        let buffer = self.buffer_ref_mut(buf)?;
        if let Err(source) = buffer.load() {
            return Err(HostError::Unreadable {
                name: buffer.name().to_string(),
                source,
            });
        }
        if !self.suppression.suppresses("BufReadPost") {
            self.buffer_ref_mut(buf)?.initialize();
            self.fire("BufReadPost", Some(buf));
        }
        Ok(())
    }

    fn delete_buffer(&mut self, buf: BufferId) -> Result<(), HostError> {
        self.buffers
            .remove(&buf)
            .ok_or(HostError::NoSuchBuffer(buf))?;
        self.pending_init.cancel(buf);
        let orphaned: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|(_, state)| state.buffer == buf)
            .map(|(win, _)| *win)
            .collect();
        for win in orphaned {
            let scratch = self.find_or_create_buffer("")?;
            self.window_state_mut(win)?.buffer = scratch;
        }
        Ok(())
    }

    fn line_count(&self, buf: BufferId) -> Result<usize, HostError> {
        Ok(self.buffer_ref(buf)?.line_count())
    }

    fn line_len(&self, buf: BufferId, line: usize) -> Result<usize, HostError> {
        Ok(self.buffer_ref(buf)?.line_len(line).unwrap_or(0))
    }

    fn last_edit_mark(&self, buf: BufferId) -> Result<Mark, HostError> {
        Ok(self.buffer_ref(buf)?.last_edit())
    }

    fn set_last_edit_mark(&mut self, buf: BufferId, mark: Mark) -> Result<(), HostError> {
        if self.buffer_ref(buf)?.is_loaded() {
            self.validate_mark(buf, mark)?;
        }
        self.buffer_ref_mut(buf)?.set_last_edit(mark);
        Ok(())
    }

    fn defer_until_displayed(&mut self, buf: BufferId) -> Result<(), HostError> {
        if self.buffer_ref(buf)?.is_initialized() {
            return Ok(());
        }
        self.pending_init
            .schedule(buf, Box::new(|buffer: &mut Buffer| buffer.initialize()));
        Ok(())
    }
}

impl WindowHost for MemoryHost {
    fn display_size(&self) -> Geometry {
        self.display
    }

    fn tabs(&self) -> Vec<TabId> {
        self.tabs.iter().map(|tab| tab.id).collect()
    }

    fn current_tab(&self) -> TabId {
        self.current_tab
    }

    fn set_current_tab(&mut self, tab: TabId) -> Result<(), HostError> {
        self.tab_state(tab)?;
        self.current_tab = tab;
        Ok(())
    }

    fn new_tab(&mut self) -> Result<TabId, HostError> {
        let position = self
            .tabs
            .iter()
            .position(|tab| tab.id == self.current_tab)
            .map_or(self.tabs.len(), |index| index + 1);
        let tab = self.open_tab(position);
        self.current_tab = tab;
        self.fire("TabNew", None);
        Ok(tab)
    }

    fn close_tab(&mut self, tab: TabId) -> Result<(), HostError> {
        let index = self
            .tabs
            .iter()
            .position(|state| state.id == tab)
            .ok_or(HostError::NoSuchTab(tab))?;
        if self.tabs.len() == 1 {
            return Err(HostError::LastTab);
        }
        let removed = self.tabs.remove(index);
        for win in removed.view.windows() {
            self.windows.remove(&win);
        }
        if self.current_tab == tab {
            let next = index.min(self.tabs.len() - 1);
            self.current_tab = self.tabs[next].id;
        }
        self.wipe_hidden();
        Ok(())
    }

    fn window_layout(&self, tab: TabId) -> Result<WindowLayout, HostError> {
        Ok(self.tab_state(tab)?.view.layout())
    }

    fn current_window(&self) -> WindowId {
        self.tab_state(self.current_tab)
            .map(|tab| tab.current_window)
            .unwrap_or(WindowId(0))
    }

    fn tab_current_window(&self, tab: TabId) -> Result<WindowId, HostError> {
        Ok(self.tab_state(tab)?.current_window)
    }

    fn set_current_window(&mut self, win: WindowId) -> Result<(), HostError> {
        let tab = self.window_state(win)?.tab;
        self.tab_state_mut(tab)?.current_window = win;
        self.current_tab = tab;
        Ok(())
    }

    fn split_window(
        &mut self,
        win: WindowId,
        orientation: Orientation,
    ) -> Result<WindowId, HostError> {
        let source = self.window_state(win)?.clone();
        let new_win = self.alloc_window();
        self.tab_state_mut(source.tab)?
            .view
            .split(win, orientation, new_win)?;
        self.windows.insert(new_win, source);
        self.fire("WinNew", None);
        Ok(new_win)
    }

    fn window_size(&self, win: WindowId) -> Result<Geometry, HostError> {
        let tab = self.window_state(win)?.tab;
        self.tab_state(tab)?
            .view
            .size_of(win)
            .ok_or(HostError::NoSuchWindow(win))
    }

    fn resize_window(
        &mut self,
        win: WindowId,
        orientation: Orientation,
        size: u32,
    ) -> Result<(), HostError> {
        let tab = self.window_state(win)?.tab;
        self.tab_state_mut(tab)?.view.resize(win, orientation, size)
    }

    fn only_window(&mut self, win: WindowId) -> Result<(), HostError> {
        let tab = self.window_state(win)?.tab;
        let state = self.tab_state_mut(tab)?;
        let closed = state.view.only(win)?;
        state.current_window = win;
        for id in closed {
            self.windows.remove(&id);
        }
        self.wipe_hidden();
        Ok(())
    }

    fn window_buffer(&self, win: WindowId) -> Result<BufferId, HostError> {
        Ok(self.window_state(win)?.buffer)
    }

    fn set_window_buffer(&mut self, win: WindowId, buf: BufferId) -> Result<(), HostError> {
        self.buffer_ref(buf)?;
        let state = self.window_state_mut(win)?;
        let previous = state.buffer;
        state.buffer = buf;
        state.cursor = Mark::default();
        self.fire("BufEnter", Some(buf));
        if previous != buf {
            self.wipe_hidden();
        }
        Ok(())
    }

    fn cursor(&self, win: WindowId) -> Result<Mark, HostError> {
        Ok(self.window_state(win)?.cursor)
    }

    fn set_cursor(&mut self, win: WindowId, mark: Mark) -> Result<(), HostError> {
        let buf = self.window_state(win)?.buffer;
        self.validate_mark(buf, mark)?;
        self.window_state_mut(win)?.cursor = mark;
        Ok(())
    }

    fn window_folds(&self, win: WindowId) -> Result<Vec<usize>, HostError> {
        Ok(self.window_state(win)?.folds.clone())
    }

    fn set_window_folds(&mut self, win: WindowId, folds: Vec<usize>) -> Result<(), HostError> {
        self.window_state_mut(win)?.folds = folds;
        Ok(())
    }
}

impl Host for MemoryHost {
    fn cwd(&self) -> PathBuf {
        self.cwd.clone()
    }

    fn set_cwd(&mut self, path: &Path) -> Result<(), HostError> {
        self.cwd = path.to_path_buf();
        self.fire("DirChanged", None);
        Ok(())
    }

    fn tab_cwd(&self, tab: TabId) -> Result<Option<PathBuf>, HostError> {
        Ok(self.tab_state(tab)?.cwd.clone())
    }

    fn set_tab_cwd(&mut self, tab: TabId, path: Option<PathBuf>) -> Result<(), HostError> {
        self.tab_state_mut(tab)?.cwd = path;
        Ok(())
    }

    fn option_scope(&self, name: &str) -> Option<OptionScope> {
        self.option_scopes.get(name).copied()
    }

    fn get_option(&self, target: OptionTarget, name: &str) -> Option<OptionValue> {
        let scope = self.option_scope(name)?;
        match (scope, target) {
            (OptionScope::Global, OptionTarget::Global) => self.global_options.get(name).cloned(),
            (OptionScope::Tab, OptionTarget::Tab(tab)) => {
                self.tab_state(tab).ok()?.options.get(name).cloned()
            }
            (OptionScope::Buffer, OptionTarget::Buffer(buf)) => {
                let buffer = self.buffers.get(&buf)?;
                if name == "buflisted" {
                    return Some(OptionValue::Bool(buffer.is_listed()));
                }
                buffer.option(name).cloned()
            }
            (OptionScope::Window, OptionTarget::Window(win)) => {
                self.windows.get(&win)?.options.get(name).cloned()
            }
            _ => None,
        }
    }

    fn set_option(
        &mut self,
        target: OptionTarget,
        name: &str,
        value: OptionValue,
    ) -> Result<(), HostError> {
        let scope = self
            .option_scope(name)
            .ok_or_else(|| HostError::UnknownOption(name.to_string()))?;
        match (scope, target) {
            (OptionScope::Global, OptionTarget::Global) => {
                self.global_options.insert(name.to_string(), value);
            }
            (OptionScope::Tab, OptionTarget::Tab(tab)) => {
                self.tab_state_mut(tab)?
                    .options
                    .insert(name.to_string(), value);
            }
            (OptionScope::Buffer, OptionTarget::Buffer(buf)) => {
                let buffer = self.buffer_ref_mut(buf)?;
                if name == "buflisted" {
                    buffer.set_listed(value.as_bool().unwrap_or(true));
                } else {
                    buffer.set_option(name, value);
                }
            }
            (OptionScope::Window, OptionTarget::Window(win)) => {
                self.window_state_mut(win)?
                    .options
                    .insert(name.to_string(), value);
            }
            _ => {
                return Err(HostError::OptionScopeMismatch {
                    name: name.to_string(),
                    target,
                })
            }
        }
        Ok(())
    }

    fn event_suppression(&self) -> EventSuppression {
        self.suppression.clone()
    }

    fn set_event_suppression(&mut self, value: EventSuppression) {
        self.suppression = value;
    }

    fn notify(&mut self, level: NotifyLevel, message: &str) {
        self.notifications.push(Notification {
            level,
            message: message.to_string(),
        });
    }
}
