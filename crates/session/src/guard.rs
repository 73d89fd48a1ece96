use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use sessionkit_core::{EventSuppression, Host};

/// 事件抑制守衛。 / Suppresses every host UI event while alive.
///
/// The previous suppression state is restored on drop, including when the guarded
/// operation returns early with an error.
pub struct EventGuard<'a> {
    host: &'a mut dyn Host,
    previous: EventSuppression,
}

impl<'a> EventGuard<'a> {
    pub fn suppress_all(host: &'a mut dyn Host) -> Self {
        let previous = host.event_suppression();
        host.set_event_suppression(EventSuppression::All);
        Self { host, previous }
    }
}

impl<'a> Deref for EventGuard<'a> {
    type Target = dyn Host + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.host
    }
}

impl<'a> DerefMut for EventGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.host
    }
}

impl Drop for EventGuard<'_> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        self.host.set_event_suppression(previous);
    }
}

/// 「還原進行中」旗標。 / Shared "restore in progress" flag.
///
/// Clones observe the same state, so collaborators can hold one to detect reentrancy.
#[derive(Debug, Clone, Default)]
pub struct LoadingFlag(Rc<Cell<bool>>);

impl LoadingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }
}

/// Holds a [`LoadingFlag`] raised until dropped.
#[derive(Debug)]
pub struct LoadingGuard {
    flag: LoadingFlag,
}

impl LoadingGuard {
    /// Raises the flag, or returns `None` when it is already raised.
    pub fn enter(flag: &LoadingFlag) -> Option<Self> {
        if flag.0.replace(true) {
            return None;
        }
        Some(Self { flag: flag.clone() })
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.flag.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_core::{Geometry, HostError, MemoryHost, WindowHost, WindowId};

    fn failing(host: &mut dyn Host) -> Result<(), HostError> {
        let guard = EventGuard::suppress_all(host);
        assert_eq!(guard.event_suppression(), EventSuppression::All);
        guard.window_size(WindowId(1))?;
        Ok(())
    }

    #[test]
    fn suppression_is_restored_on_error_path() {
        let mut host = MemoryHost::new(Geometry::new(80, 24), "/work");
        let previous = EventSuppression::Events(vec!["BufEnter".into()]);
        host.set_event_suppression(previous.clone());

        assert!(failing(&mut host).is_err());
        assert_eq!(host.event_suppression(), previous);
    }

    #[test]
    fn guard_derefs_to_host() {
        let mut host = MemoryHost::new(Geometry::new(80, 24), "/work");
        {
            let mut guard = EventGuard::suppress_all(&mut host);
            let win = guard.current_window();
            guard.split_window(win, sessionkit_core::Orientation::Vertical).unwrap();
        }
        assert_eq!(host.event_suppression(), EventSuppression::Off);
        assert!(host.events().is_empty());
    }

    #[test]
    fn loading_guard_rejects_reentry_and_resets() {
        let flag = LoadingFlag::new();
        let observer = flag.clone();
        {
            let _guard = LoadingGuard::enter(&flag).unwrap();
            assert!(observer.is_set());
            assert!(LoadingGuard::enter(&flag).is_none());
        }
        assert!(!observer.is_set());
    }
}
