//! Scoped window-level listener registration.
//!
//! Each [`ListenerGuard`] attaches one listener scope on creation and
//! detaches it on drop, so attach/detach stay symmetric whatever path
//! the session takes out of an interaction or a mount.

use std::fmt;
use std::rc::Rc;

/// A group of host listeners registered together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerScope {
    /// `keydown` on the window, for the whole mount.
    Keyboard,
    /// Non-passive `wheel` on the canvas, for the whole mount.
    Wheel,
    /// Window `pointermove` + `pointerup` while an interaction is active.
    PointerTracking,
}

/// Host side of listener registration.
pub trait ListenerHost {
    fn attach(&self, scope: ListenerScope);
    fn detach(&self, scope: ListenerScope);
}

/// Detaches its scope when dropped.
#[must_use = "dropping the guard detaches the listener immediately"]
pub struct ListenerGuard {
    host: Rc<dyn ListenerHost>,
    scope: ListenerScope,
}

impl ListenerGuard {
    pub fn acquire(host: &Rc<dyn ListenerHost>, scope: ListenerScope) -> Self {
        log::debug!("listeners: attach {scope:?}");
        host.attach(scope);
        Self {
            host: Rc::clone(host),
            scope,
        }
    }

    pub fn scope(&self) -> ListenerScope {
        self.scope
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        log::debug!("listeners: detach {:?}", self.scope);
        self.host.detach(self.scope);
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Tally(RefCell<Vec<(bool, ListenerScope)>>);

    impl ListenerHost for Tally {
        fn attach(&self, scope: ListenerScope) {
            self.0.borrow_mut().push((true, scope));
        }
        fn detach(&self, scope: ListenerScope) {
            self.0.borrow_mut().push((false, scope));
        }
    }

    #[test]
    fn guard_detaches_on_drop() {
        let tally = Rc::new(Tally::default());
        let host: Rc<dyn ListenerHost> = tally.clone();
        {
            let guard = ListenerGuard::acquire(&host, ListenerScope::Wheel);
            assert_eq!(guard.scope(), ListenerScope::Wheel);
            assert_eq!(tally.0.borrow().len(), 1);
        }
        assert_eq!(
            *tally.0.borrow(),
            vec![(true, ListenerScope::Wheel), (false, ListenerScope::Wheel)]
        );
    }
}
