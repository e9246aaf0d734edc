//! Revocable, reference-counted handles to host-owned state.
//!
//! The host keeps a [`BindingAnchor`] next to the state it owns and hands out
//! [`ExternalBinding`] copies. Bindings never own the state; every dereference
//! goes through a liveness and version check:
//!
//! - [`BindingAnchor::revoke`] (or dropping the anchor) marks the state destroyed.
//! - [`BindingAnchor::invalidate`] bumps the version after an incompatible
//!   mutation; bindings taken before the bump become stale.
//!
//! Each binding copy counts as one holder. When the anchor has been revoked and
//! the last holder is released, the teardown hook registered with
//! [`BindingAnchor::on_teardown`] runs exactly once.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

static NEXT_STUB_ID: AtomicU64 = AtomicU64::new(1);

type Teardown = Box<dyn FnOnce()>;

struct Stub {
    id: u64,
    live: Cell<bool>,
    version: Cell<u64>,
    holders: Cell<usize>,
    target: Option<Weak<dyn Any>>,
    teardown: RefCell<Option<Teardown>>,
}

impl Stub {
    fn release_if_done(&self) {
        if self.live.get() || self.holders.get() != 0 {
            return;
        }
        let hook = self.teardown.borrow_mut().take();
        if let Some(hook) = hook {
            trace!(binding = self.id, "last holder released, tearing down");
            hook();
        }
    }
}

/// Host-side owner of a binding stub.
///
/// Dropping the anchor revokes every outstanding binding.
pub struct BindingAnchor {
    stub: Rc<Stub>,
}

impl BindingAnchor {
    /// Create an anchor with no attached state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_target(None)
    }

    /// Create an anchor observing `state`.
    ///
    /// Bindings can then [`resolve`](ExternalBinding::resolve) to the state
    /// while it is alive and the version matches.
    #[must_use]
    pub fn for_state<T: Any>(state: &Rc<T>) -> Self {
        let weak: Weak<dyn Any> = Rc::downgrade(state) as Weak<dyn Any>;
        Self::with_target(Some(weak))
    }

    fn with_target(target: Option<Weak<dyn Any>>) -> Self {
        Self {
            stub: Rc::new(Stub {
                id: NEXT_STUB_ID.fetch_add(1, Ordering::Relaxed),
                live: Cell::new(true),
                version: Cell::new(0),
                holders: Cell::new(0),
                target,
                teardown: RefCell::new(None),
            }),
        }
    }

    /// Hand out a new binding at the current version.
    #[must_use]
    pub fn bind(&self) -> ExternalBinding {
        self.stub.holders.set(self.stub.holders.get() + 1);
        ExternalBinding {
            stub: Rc::clone(&self.stub),
            version: self.stub.version.get(),
        }
    }

    /// Mark the state as mutated incompatibly.
    pub fn invalidate(&self) {
        self.stub.version.set(self.stub.version.get() + 1);
    }

    /// Mark the state as destroyed.
    pub fn revoke(&self) {
        if self.stub.live.replace(false) {
            trace!(binding = self.stub.id, "binding revoked");
        }
        self.stub.release_if_done();
    }

    /// Register the hook run once the state is revoked and no holder remains.
    pub fn on_teardown(&self, hook: impl FnOnce() + 'static) {
        *self.stub.teardown.borrow_mut() = Some(Box::new(hook));
        self.stub.release_if_done();
    }

    /// Number of binding copies currently alive.
    #[must_use]
    pub fn holders(&self) -> usize {
        self.stub.holders.get()
    }

    /// Whether the state is still alive.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.stub.live.get()
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.stub.version.get()
    }
}

impl Default for BindingAnchor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingAnchor {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for BindingAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingAnchor")
            .field("id", &self.stub.id)
            .field("live", &self.stub.live.get())
            .field("version", &self.stub.version.get())
            .field("holders", &self.stub.holders.get())
            .finish()
    }
}

/// A weak, revocable handle to host state.
///
/// Cloning a binding adds a holder; dropping one removes it.
///
/// ```
/// use tempo_common::binding::BindingAnchor;
///
/// let anchor = BindingAnchor::new();
/// let a = anchor.bind();
/// let b = a.clone();
/// assert_eq!(anchor.holders(), 2);
///
/// anchor.invalidate();
/// assert!(!b.is_live());
/// drop((a, b));
/// assert_eq!(anchor.holders(), 0);
/// ```
pub struct ExternalBinding {
    stub: Rc<Stub>,
    version: u64,
}

impl ExternalBinding {
    /// Whether the referenced state is alive at the version this binding saw.
    #[must_use]
    pub fn is_live(&self) -> bool {
        if !self.stub.live.get() || self.stub.version.get() != self.version {
            return false;
        }
        match &self.stub.target {
            Some(target) => target.strong_count() > 0,
            None => true,
        }
    }

    /// Resolve to the observed state, if still live and of type `T`.
    #[must_use]
    pub fn resolve<T: Any>(&self) -> Option<Rc<T>> {
        if !self.is_live() {
            return None;
        }
        let state = self.stub.target.as_ref()?.upgrade()?;
        state.downcast::<T>().ok()
    }

    /// Number of binding copies sharing this stub.
    #[must_use]
    pub fn holders(&self) -> usize {
        self.stub.holders.get()
    }

    /// Version captured when the binding was created.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether two bindings refer to the same stub.
    #[must_use]
    pub fn same_target(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.stub, &other.stub)
    }
}

impl Clone for ExternalBinding {
    fn clone(&self) -> Self {
        self.stub.holders.set(self.stub.holders.get() + 1);
        Self {
            stub: Rc::clone(&self.stub),
            version: self.version,
        }
    }
}

impl Drop for ExternalBinding {
    fn drop(&mut self) {
        let holders = self.stub.holders.get().saturating_sub(1);
        self.stub.holders.set(holders);
        self.stub.release_if_done();
    }
}

impl PartialEq for ExternalBinding {
    fn eq(&self, other: &Self) -> bool {
        self.same_target(other) && self.version == other.version
    }
}

impl fmt::Debug for ExternalBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBinding")
            .field("id", &self.stub.id)
            .field("version", &self.version)
            .field("live", &self.is_live())
            .finish()
    }
}

impl fmt::Display for ExternalBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(pointer #{})", self.stub.id)
    }
}
