use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use serde_json::Value;
use sessionkit_core::{Host, NotifyLevel, WindowId};

use crate::model::ExtensionWindow;

/// 工作階段擴充。 / A plugin that stores extra state alongside a session.
///
/// Every callback may fail; failures are logged and reported but never abort the
/// surrounding capture or restore.
pub trait Extension {
    /// Key under which the payload is stored.
    fn name(&self) -> &str;

    fn configure(&mut self, _config: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the payload to store, or `None` to store nothing.
    fn on_save(&mut self, _host: &dyn Host) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    /// Runs before any document or layout is restored.
    fn on_pre_load(&mut self, _host: &mut dyn Host, _payload: Option<&Value>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after the layout is rebuilt, with the stored payload.
    fn on_load(&mut self, _host: &mut dyn Host, _payload: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// Claims a window the document filter rejected.
    fn save_window(&mut self, _host: &dyn Host, _win: WindowId) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn load_window(
        &mut self,
        _host: &mut dyn Host,
        _win: WindowId,
        _data: &Value,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 擴充註冊表。 / Registered extensions in invocation order.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
    load_order: Vec<String>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new(load_order: Vec<String>) -> Self {
        Self {
            extensions: Vec::new(),
            load_order,
        }
    }

    /// Adds an extension, replacing any earlier one with the same name, and hands it its
    /// configuration payload if one exists.
    pub fn register(
        &mut self,
        mut extension: Box<dyn Extension>,
        configs: &BTreeMap<String, Value>,
    ) {
        let name = extension.name().to_string();
        if let Some(config) = configs.get(&name) {
            if let Err(err) = extension.configure(config) {
                warn!("extension {name} rejected its configuration: {err:#}");
            }
        }
        self.extensions.retain(|existing| existing.name() != name);
        self.extensions.push(extension);
        self.reorder();
        debug!("registered session extension {name}");
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.extensions.len();
        self.extensions.retain(|existing| existing.name() != name);
        self.extensions.len() != before
    }

    pub fn set_load_order(&mut self, load_order: Vec<String>) {
        self.load_order = load_order;
        self.reorder();
    }

    /// Names in invocation order.
    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|ext| ext.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    fn reorder(&mut self) {
        let order = &self.load_order;
        // Stable sort keeps registration order among unlisted extensions.
        self.extensions.sort_by_key(|ext| {
            order
                .iter()
                .position(|name| name == ext.name())
                .unwrap_or(order.len())
        });
    }

    /// Collects every extension's save payload. Returns the payloads and the names of the
    /// extensions that failed.
    pub fn save_all(&mut self, host: &mut dyn Host) -> (BTreeMap<String, Value>, Vec<String>) {
        let mut payloads = BTreeMap::new();
        let mut failed = Vec::new();
        for extension in self.extensions.iter_mut() {
            let name = extension.name().to_string();
            match extension.on_save(&*host) {
                Ok(Some(payload)) => {
                    payloads.insert(name, payload);
                }
                Ok(None) => {}
                Err(err) => {
                    report(host, &name, "save", &err);
                    failed.push(name);
                }
            }
        }
        (payloads, failed)
    }

    pub fn pre_load_all(
        &mut self,
        host: &mut dyn Host,
        payloads: &BTreeMap<String, Value>,
    ) -> Vec<String> {
        let mut failed = Vec::new();
        for extension in self.extensions.iter_mut() {
            let name = extension.name().to_string();
            if let Err(err) = extension.on_pre_load(host, payloads.get(&name)) {
                report(host, &name, "pre-load", &err);
                failed.push(name);
            }
        }
        failed
    }

    pub fn load_all(
        &mut self,
        host: &mut dyn Host,
        payloads: &BTreeMap<String, Value>,
    ) -> Vec<String> {
        let mut failed = Vec::new();
        for extension in self.extensions.iter_mut() {
            let name = extension.name().to_string();
            let Some(payload) = payloads.get(&name) else {
                continue;
            };
            if let Err(err) = extension.on_load(host, payload) {
                report(host, &name, "load", &err);
                failed.push(name);
            }
        }
        failed
    }

    /// Asks each extension in turn to claim `win`; the first claim wins.
    pub fn save_window(&mut self, host: &dyn Host, win: WindowId) -> Option<ExtensionWindow> {
        for extension in self.extensions.iter_mut() {
            match extension.save_window(host, win) {
                Ok(Some(data)) => {
                    return Some(ExtensionWindow {
                        extension: extension.name().to_string(),
                        data,
                    })
                }
                Ok(None) => {}
                Err(err) => warn!(
                    "extension {} failed to save {win}: {err:#}",
                    extension.name()
                ),
            }
        }
        None
    }

    /// Hands `win` back to the extension that claimed it. Returns `false` when the
    /// extension is missing or fails.
    pub fn load_window(
        &mut self,
        host: &mut dyn Host,
        win: WindowId,
        window: &ExtensionWindow,
    ) -> bool {
        let Some(extension) = self
            .extensions
            .iter_mut()
            .find(|ext| ext.name() == window.extension)
        else {
            warn!("no extension {} to restore {win}", window.extension);
            return false;
        };
        match extension.load_window(host, win, &window.data) {
            Ok(()) => true,
            Err(err) => {
                report(host, &window.extension, "window restore", &err);
                false
            }
        }
    }
}

fn report(host: &mut dyn Host, name: &str, stage: &str, err: &anyhow::Error) {
    let message = format!("session extension {name} failed during {stage}: {err:#}");
    warn!("{message}");
    host.notify(NotifyLevel::Warn, &message);
}
