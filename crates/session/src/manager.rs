//! Session orchestration: capture, restore, attachment, hooks and autosave.
//! 工作階段管理：擷取、還原、附著、掛勾與自動儲存。

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::Value;
use sessionkit_core::{
    BufferId, Host, NotifyLevel, OptionTarget, TabId, WindowId,
};

use crate::codec::{capture_layout, restore_layout, CaptureContext, RestoreContext, ScaleFactors};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::extension::{Extension, ExtensionRegistry};
use crate::guard::{EventGuard, LoadingFlag, LoadingGuard};
use crate::hooks::{HookEvent, HookOptions, HookPoint, HookRegistry};
use crate::model::{SessionDocument, TabRecord};
use crate::options::{apply_options, capture_options};
use crate::registry::{capture_documents, default_buffer_filter, materialize_documents, BufferFilter};
use crate::store::{SessionStore, SessionSummary};

/// What a capture covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureScope {
    Global,
    Tab(TabId),
}

/// 還原前是否清空工作區。 / Whether restore first clears the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    Always,
    Never,
    /// Reset for global sessions, open a clean tab for tab sessions.
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Session sub-directory; defaults to the attached one or the configured one.
    pub dir: Option<String>,
    pub attach: bool,
    /// Overrides the configured notification setting.
    pub notify: Option<bool>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            dir: None,
            attach: true,
            notify: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub dir: Option<String>,
    pub attach: bool,
    pub reset: ResetPolicy,
    /// Turns a missing session into `Ok(None)`.
    pub silence_errors: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            dir: None,
            attach: true,
            reset: ResetPolicy::Auto,
            silence_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    pub dir: Option<String>,
    pub notify: Option<bool>,
}

/// Result of a restore.
/// 還原結果。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoreOutcome {
    /// Tabs created or reused, in session order.
    pub tabs: Vec<TabId>,
    pub current_window: Option<WindowId>,
    pub skipped_documents: Vec<String>,
    pub failed_extensions: Vec<String>,
}

/// A session bound to the workspace or to one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub dir: String,
    pub tab_scoped: bool,
}

/// 工作階段管理器。 / Owns configuration, collaborators and attachment state, and runs
/// every session operation against a host.
pub struct SessionManager {
    config: SessionConfig,
    filter: BufferFilter,
    hooks: HookRegistry,
    extensions: ExtensionRegistry,
    global: Option<Attachment>,
    tab_sessions: BTreeMap<TabId, Attachment>,
    loading: LoadingFlag,
    last_autosave: Option<Instant>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("extensions", &self.extensions)
            .field("global", &self.global)
            .field("tab_sessions", &self.tab_sessions)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(mut config: SessionConfig) -> Self {
        config.sanitize();
        let extensions = ExtensionRegistry::new(config.load_order.clone());
        Self {
            config,
            filter: Box::new(default_buffer_filter),
            hooks: HookRegistry::new(),
            extensions,
            global: None,
            tab_sessions: BTreeMap::new(),
            loading: LoadingFlag::new(),
            last_autosave: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_buffer_filter(&mut self, filter: BufferFilter) {
        self.filter = filter;
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    pub fn register_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.register(extension, &self.config.extensions);
    }

    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    /// Store for `dir`, or for the configured default directory.
    pub fn store(&self, dir: Option<&str>) -> SessionStore {
        SessionStore::new(self.config.session_dir(dir))
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_set()
    }

    /// Shared handle to the "restore in progress" flag.
    pub fn loading_flag(&self) -> LoadingFlag {
        self.loading.clone()
    }

    /// 擷取工作階段。 / Captures the workspace, or a single tab, with host events
    /// suppressed.
    pub fn capture_session(
        &mut self,
        host: &mut dyn Host,
        scope: CaptureScope,
    ) -> Result<SessionDocument, SessionError> {
        let mut guard = EventGuard::suppress_all(host);
        self.capture_suppressed(&mut *guard, scope)
    }

    fn capture_suppressed(
        &mut self,
        host: &mut dyn Host,
        scope: CaptureScope,
    ) -> Result<SessionDocument, SessionError> {
        let mut document = SessionDocument::new(host.cwd(), host.display_size());
        document.metadata.application_version = Some(env!("CARGO_PKG_VERSION").to_string());
        let tabs = match scope {
            CaptureScope::Global => {
                document.options =
                    capture_options(&*host, &self.config.options, OptionTarget::Global);
                host.tabs()
            }
            CaptureScope::Tab(tab) => {
                document.tab_scoped = true;
                vec![tab]
            }
        };

        let current_tab = host.current_tab();
        let mut ctx = CaptureContext {
            filter: &*self.filter,
            options: &self.config.options,
            extensions: &mut self.extensions,
        };
        for tab in tabs {
            let current_window = host.tab_current_window(tab)?;
            let layout = capture_layout(&*host, tab, current_window, &mut ctx)?;
            let mut cwd = host.tab_cwd(tab)?;
            if document.tab_scoped && cwd.is_none() {
                cwd = Some(document.cwd.clone());
            }
            document.tabs.push(TabRecord {
                cwd,
                options: capture_options(&*host, &self.config.options, OptionTarget::Tab(tab)),
                current: document.tab_scoped || tab == current_tab,
                layout,
            });
        }

        document.documents = capture_documents(&*host, &*self.filter, &self.config.options)?;
        if document.tab_scoped {
            let referenced = document.referenced_documents();
            document
                .documents
                .retain(|record| referenced.contains(&record.name));
        }

        let (payloads, failed) = self.extensions.save_all(host);
        if !failed.is_empty() {
            debug!("capture continued without extensions {failed:?}");
        }
        document.extensions = payloads;
        Ok(document)
    }

    /// 還原工作階段。 / Restores `document` into the host.
    ///
    /// Documents are materialised before any layout is rebuilt; scale factors are computed
    /// once from the recorded and current display sizes. Reentrant calls are rejected.
    pub fn restore_session(
        &mut self,
        host: &mut dyn Host,
        document: &SessionDocument,
        policy: ResetPolicy,
    ) -> Result<RestoreOutcome, SessionError> {
        let Some(_loading) = LoadingGuard::enter(&self.loading) else {
            return Err(SessionError::Misuse(
                "a session restore is already in progress".into(),
            ));
        };
        document.validate()?;
        let mut guard = EventGuard::suppress_all(host);
        self.restore_suppressed(&mut *guard, document, policy)
    }

    fn restore_suppressed(
        &mut self,
        host: &mut dyn Host,
        document: &SessionDocument,
        policy: ResetPolicy,
    ) -> Result<RestoreOutcome, SessionError> {
        let reset = match policy {
            ResetPolicy::Always => true,
            ResetPolicy::Never => false,
            ResetPolicy::Auto => !document.tab_scoped,
        };
        let first_window = if reset {
            reset_workspace(host)?
        } else {
            open_clean_tab(host)?
        };

        let mut outcome = RestoreOutcome {
            failed_extensions: self.extensions.pre_load_all(host, &document.extensions),
            ..RestoreOutcome::default()
        };

        if !document.tab_scoped {
            apply_options(host, OptionTarget::Global, &document.options);
            if let Err(err) = host.set_cwd(&document.cwd) {
                warn!("cannot change to {}: {err}", document.cwd.display());
            }
        }

        let materialized = materialize_documents(host, &document.documents)?;
        outcome.skipped_documents = materialized.skipped;
        let scale = ScaleFactors::between(document.geometry, host.display_size());
        debug!("restoring with scale {scale:?}");

        let focus_index = document.current_tab_index();
        let mut focus = None;
        for (index, record) in document.tabs.iter().enumerate() {
            let (tab, window) = if index == 0 {
                (host.current_tab(), first_window)
            } else {
                let tab = host.new_tab()?;
                let window = host.tab_current_window(tab)?;
                let blank = host.window_buffer(window)?;
                wipe_when_hidden(host, blank);
                (tab, window)
            };
            host.set_tab_cwd(tab, record.cwd.clone())?;
            apply_options(host, OptionTarget::Tab(tab), &record.options);

            let mut ctx = RestoreContext {
                documents: &materialized.documents,
                scale,
                extensions: &mut self.extensions,
            };
            let current = restore_layout(host, &record.layout, window, &mut ctx)?
                .unwrap_or(window);
            host.set_current_window(current)?;
            if index == focus_index {
                focus = Some(current);
            }
            outcome.tabs.push(tab);
        }
        if let Some(window) = focus {
            host.set_current_window(window)?;
        }
        outcome.current_window = focus;

        let failed = self.extensions.load_all(host, &document.extensions);
        outcome.failed_extensions.extend(failed);
        Ok(outcome)
    }

    /// Saves the whole workspace as `name`, or as the attached session when `name` is
    /// `None`.
    /// 儲存整個工作區。
    pub fn save(
        &mut self,
        host: &mut dyn Host,
        name: Option<&str>,
        options: SaveOptions,
    ) -> Result<PathBuf, SessionError> {
        let target = resolve(name, options.dir.as_deref(), self.global.as_ref(), &self.config)?;
        let path = self.persist(host, CaptureScope::Global, &target, &options)?;
        if options.attach {
            self.global = Some(target);
        }
        Ok(path)
    }

    /// Saves the current tab as a tab-scoped session and attaches it to that tab.
    pub fn save_tab(
        &mut self,
        host: &mut dyn Host,
        name: Option<&str>,
        options: SaveOptions,
    ) -> Result<PathBuf, SessionError> {
        let tab = host.current_tab();
        let target = resolve(
            name,
            options.dir.as_deref(),
            self.tab_sessions.get(&tab),
            &self.config,
        )?;
        let path = self.persist(host, CaptureScope::Tab(tab), &target, &options)?;
        if options.attach {
            self.tab_sessions.insert(tab, target);
        }
        Ok(path)
    }

    /// Saves every attached session. Tab sessions whose tab is gone are detached.
    /// A session that fails to save is reported and skipped so the others still get
    /// written. Returns the names saved.
    pub fn save_all(
        &mut self,
        host: &mut dyn Host,
        notify: Option<bool>,
    ) -> Result<Vec<String>, SessionError> {
        let live: HashSet<TabId> = host.tabs().into_iter().collect();
        self.tab_sessions.retain(|tab, attachment| {
            let keep = live.contains(tab);
            if !keep {
                debug!("detaching {} from closed {tab}", attachment.name);
            }
            keep
        });

        let options = SaveOptions {
            dir: None,
            attach: true,
            notify,
        };
        let mut targets: Vec<(CaptureScope, Attachment)> = Vec::new();
        if let Some(target) = self.global.clone() {
            targets.push((CaptureScope::Global, target));
        }
        targets.extend(
            self.tab_sessions
                .iter()
                .map(|(tab, attachment)| (CaptureScope::Tab(*tab), attachment.clone())),
        );

        let mut saved = Vec::new();
        for (scope, target) in targets {
            match self.persist(host, scope, &target, &options) {
                Ok(_) => saved.push(target.name),
                Err(err) => {
                    let message = format!("failed to save session {}: {err}", target.name);
                    warn!("{message}");
                    host.notify(NotifyLevel::Warn, &message);
                }
            }
        }
        Ok(saved)
    }

    fn persist(
        &mut self,
        host: &mut dyn Host,
        scope: CaptureScope,
        target: &Attachment,
        options: &SaveOptions,
    ) -> Result<PathBuf, SessionError> {
        self.dispatch(HookPoint::PreSave, &target.name, HookOptions::Save(options.clone()));
        let document = self.capture_session(host, scope)?;
        let path = self.store(Some(&target.dir)).write(&target.name, &document)?;
        info!("saved session {} to {}", target.name, path.display());
        if options.notify.unwrap_or(self.config.notify) {
            host.notify(NotifyLevel::Info, &format!("Saved session {}", target.name));
        }
        self.dispatch(HookPoint::PostSave, &target.name, HookOptions::Save(options.clone()));
        Ok(path)
    }

    /// 載入工作階段。 / Loads `name` (or the attached session) into the host.
    ///
    /// Returns `Ok(None)` for a missing session when `silence_errors` is set.
    pub fn load(
        &mut self,
        host: &mut dyn Host,
        name: Option<&str>,
        options: LoadOptions,
    ) -> Result<Option<RestoreOutcome>, SessionError> {
        let attached = self.current(&*host).cloned();
        let target = resolve(name, options.dir.as_deref(), attached.as_ref(), &self.config)?;
        self.dispatch(HookPoint::PreLoad, &target.name, HookOptions::Load(options.clone()));

        let document = match self.store(Some(&target.dir)).read(&target.name) {
            Ok(document) => document,
            Err(err) if err.is_not_found() && options.silence_errors => {
                debug!("{err}");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let outcome = self.restore_session(host, &document, options.reset)?;
        info!(
            "loaded session {} ({} tabs, {} documents skipped)",
            target.name,
            outcome.tabs.len(),
            outcome.skipped_documents.len()
        );

        if options.attach {
            if document.tab_scoped {
                self.tab_sessions.insert(host.current_tab(), target.clone());
            } else {
                self.tab_sessions.clear();
                self.global = Some(target.clone());
            }
        }
        if self.config.notify {
            host.notify(NotifyLevel::Info, &format!("Loaded session {}", target.name));
        }
        self.dispatch(HookPoint::PostLoad, &target.name, HookOptions::Load(options));
        Ok(Some(outcome))
    }

    /// Deletes a stored session; deleting an attached session detaches it.
    pub fn delete(
        &mut self,
        host: &mut dyn Host,
        name: Option<&str>,
        options: DeleteOptions,
    ) -> Result<PathBuf, SessionError> {
        let attached = self.current(&*host).cloned();
        let target = resolve(name, options.dir.as_deref(), attached.as_ref(), &self.config)?;
        self.dispatch(HookPoint::PreDelete, &target.name, HookOptions::Delete(options.clone()));
        let path = self.store(Some(&target.dir)).remove(&target.name)?;

        if self.global.as_ref() == Some(&target) {
            self.global = None;
        }
        self.tab_sessions.retain(|_, attachment| *attachment != target);
        info!("deleted session {}", target.name);
        if options.notify.unwrap_or(self.config.notify) {
            host.notify(NotifyLevel::Info, &format!("Deleted session {}", target.name));
        }
        self.dispatch(HookPoint::PostDelete, &target.name, HookOptions::Delete(options));
        Ok(path)
    }

    pub fn list(&self, dir: Option<&str>) -> Result<Vec<String>, SessionError> {
        self.store(dir).list()
    }

    pub fn list_detailed(&self, dir: Option<&str>) -> Result<Vec<SessionSummary>, SessionError> {
        self.store(dir).list_detailed()
    }

    /// The current tab's session, or else the workspace session.
    pub fn current(&self, host: &dyn Host) -> Option<&Attachment> {
        self.tab_sessions
            .get(&host.current_tab())
            .or(self.global.as_ref())
    }

    pub fn current_info(&self, host: &dyn Host) -> Option<SessionInfo> {
        if let Some(attachment) = self.tab_sessions.get(&host.current_tab()) {
            return Some(SessionInfo {
                name: attachment.name.clone(),
                dir: attachment.dir.clone(),
                tab_scoped: true,
            });
        }
        self.global.as_ref().map(|attachment| SessionInfo {
            name: attachment.name.clone(),
            dir: attachment.dir.clone(),
            tab_scoped: false,
        })
    }

    pub fn detach(&mut self) -> Option<Attachment> {
        self.global.take()
    }

    pub fn detach_tab(&mut self, tab: TabId) -> Option<Attachment> {
        self.tab_sessions.remove(&tab)
    }

    /// 自動儲存計時。 / Saves every attached session once the autosave interval has
    /// elapsed. The first tick only starts the clock. Returns whether a save ran.
    pub fn autosave_tick(&mut self, host: &mut dyn Host, now: Instant) -> Result<bool, SessionError> {
        if !self.config.autosave.enabled || self.is_loading() {
            return Ok(false);
        }
        if self.global.is_none() && self.tab_sessions.is_empty() {
            return Ok(false);
        }
        let Some(last) = self.last_autosave else {
            self.last_autosave = Some(now);
            return Ok(false);
        };
        let interval = Duration::from_secs(self.config.autosave.interval_seconds);
        if now.saturating_duration_since(last) < interval {
            return Ok(false);
        }
        self.last_autosave = Some(now);
        let saved = self.save_all(host, Some(self.config.autosave.notify))?;
        debug!("autosaved {saved:?}");
        Ok(true)
    }

    fn dispatch(&mut self, point: HookPoint, name: &str, options: HookOptions) {
        self.hooks.dispatch(&HookEvent {
            point,
            name: name.to_string(),
            options,
        });
    }
}

fn resolve(
    name: Option<&str>,
    dir: Option<&str>,
    attached: Option<&Attachment>,
    config: &SessionConfig,
) -> Result<Attachment, SessionError> {
    match (name, attached) {
        (Some(name), _) => Ok(Attachment {
            name: name.to_string(),
            dir: dir.unwrap_or(&config.dir).to_string(),
        }),
        (None, Some(attached)) => Ok(Attachment {
            name: attached.name.clone(),
            dir: dir.unwrap_or(&attached.dir).to_string(),
        }),
        (None, None) => Err(SessionError::MissingName),
    }
}

fn wipe_when_hidden(host: &mut dyn Host, buf: BufferId) {
    if let Err(err) = host.set_option(OptionTarget::Buffer(buf), "bufhidden", Value::from("wipe")) {
        debug!("{buf} keeps default bufhidden: {err}");
    }
}

/// Closes everything down to one window showing a scratch placeholder.
fn reset_workspace(host: &mut dyn Host) -> Result<WindowId, SessionError> {
    let keep = host.current_tab();
    for tab in host.tabs() {
        if tab != keep {
            host.close_tab(tab)?;
        }
    }
    let window = host.current_window();
    host.only_window(window)?;
    let scratch = host.find_or_create_buffer("")?;
    wipe_when_hidden(host, scratch);
    host.set_window_buffer(window, scratch)?;
    for buf in host.list_buffers() {
        if buf == scratch {
            continue;
        }
        if let Err(err) = host.delete_buffer(buf) {
            debug!("could not drop {buf} during reset: {err}");
        }
    }
    host.set_tab_cwd(keep, None)?;
    Ok(window)
}

/// Reuses the current tab when it holds a single blank window, otherwise opens a new one.
fn open_clean_tab(host: &mut dyn Host) -> Result<WindowId, SessionError> {
    let tab = host.current_tab();
    let window = host.current_window();
    let buf = host.window_buffer(window)?;
    let single = host.window_layout(tab)?.windows().len() == 1;
    let blank = host.buffer_info(buf)?.name.is_empty()
        && host.line_count(buf)? <= 1
        && host.line_len(buf, 1)? == 0;
    if single && blank {
        return Ok(window);
    }
    let tab = host.new_tab()?;
    let window = host.tab_current_window(tab)?;
    let blank = host.window_buffer(window)?;
    wipe_when_hidden(host, blank);
    Ok(window)
}
