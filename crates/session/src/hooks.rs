use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::error::SessionError;
use crate::manager::{DeleteOptions, LoadOptions, SaveOptions};

/// 掛勾點。 / Points in the save/load/delete lifecycle where callbacks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    PreSave,
    PostSave,
    PreLoad,
    PostLoad,
    PreDelete,
    PostDelete,
}

impl HookPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::PreSave => "pre_save",
            HookPoint::PostSave => "post_save",
            HookPoint::PreLoad => "pre_load",
            HookPoint::PostLoad => "post_load",
            HookPoint::PreDelete => "pre_delete",
            HookPoint::PostDelete => "post_delete",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pre_save" => Ok(HookPoint::PreSave),
            "post_save" => Ok(HookPoint::PostSave),
            "pre_load" => Ok(HookPoint::PreLoad),
            "post_load" => Ok(HookPoint::PostLoad),
            "pre_delete" => Ok(HookPoint::PreDelete),
            "post_delete" => Ok(HookPoint::PostDelete),
            other => Err(SessionError::UnknownHook(other.to_string())),
        }
    }
}

/// Options of the operation that triggered a hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOptions {
    Save(SaveOptions),
    Load(LoadOptions),
    Delete(DeleteOptions),
}

/// 傳給掛勾回呼的事件。 / What a hook callback receives.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub point: HookPoint,
    pub name: String,
    pub options: HookOptions,
}

/// Handle returned by [`HookRegistry::add`], used to remove the hook again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

pub type HookCallback = Box<dyn FnMut(&HookEvent)>;

/// 掛勾註冊表。 / Ordered callbacks per hook point.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<(HookId, HookPoint, HookCallback)>,
    next_id: u64,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, point: HookPoint, callback: F) -> HookId
    where
        F: FnMut(&HookEvent) + 'static,
    {
        let id = HookId(self.next_id);
        self.next_id += 1;
        self.hooks.push((id, point, Box::new(callback)));
        id
    }

    /// Registers a callback by hook point name such as `"post_load"`.
    pub fn add_named<F>(&mut self, point: &str, callback: F) -> Result<HookId, SessionError>
    where
        F: FnMut(&HookEvent) + 'static,
    {
        let point = point.parse::<HookPoint>()?;
        Ok(self.add(point, callback))
    }

    pub fn remove(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook, _, _)| *hook != id);
        self.hooks.len() != before
    }

    pub fn len(&self, point: HookPoint) -> usize {
        self.hooks.iter().filter(|(_, p, _)| *p == point).count()
    }

    /// Runs every callback registered for `event.point`, in registration order.
    pub fn dispatch(&mut self, event: &HookEvent) {
        debug!("dispatching {} for session {}", event.point, event.name);
        for (_, point, callback) in self.hooks.iter_mut() {
            if *point == event.point {
                callback(event);
            }
        }
    }
}
