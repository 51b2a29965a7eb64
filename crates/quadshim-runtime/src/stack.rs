//! Context stack discipline
//!
//! A `ContextSlot` holds the one active context of its kind for the current
//! thread. Activation snapshots the active frame into a caller-owned
//! `SavedContext` before overwriting it; restoration writes the snapshot back.
//! Records nest on the caller's own call stack, so the slot never keeps an
//! explicit stack of its own.
//!
//! Slots are meant to live in `thread_local!` storage. Nesting is same-thread
//! reentrancy only: an independent session on another thread gets its own
//! slot instance.

use crate::error::{CallbackError, CallbackResult, ContextDescription};
use crate::unwind;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;
use std::thread::LocalKey;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
    static MAX_DEPTH: Cell<Option<usize>> = const { Cell::new(None) };
    /// Guards alive on this thread, across every slot
    static GUARDS: Cell<usize> = const { Cell::new(0) };
}

/// Whether any context guard is alive on this thread
pub(crate) fn guards_active() -> bool {
    GUARDS.try_with(|g| g.get() > 0).unwrap_or(false)
}

/// Whether no guard and no unwind target is active on this thread
fn unguarded() -> bool {
    !guards_active() && unwind::target_depth() == 0
}

/// Identity of one activation, unique per thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            ContextId(id)
        })
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set the nesting limit for bounded slots on the current thread
pub fn set_max_depth(limit: Option<usize>) {
    MAX_DEPTH.with(|d| d.set(limit));
}

/// Nesting limit for bounded slots on the current thread
pub fn max_depth() -> Option<usize> {
    MAX_DEPTH.with(|d| d.get())
}

#[derive(Debug, Clone)]
struct Frame<T> {
    id: ContextId,
    value: T,
}

/// Snapshot taken by `ContextSlot::install`
///
/// Holds both halves of a call context record: the frame that was active
/// before (`previous`) and the frame this record activated (`current`).
#[derive(Debug)]
pub struct SavedContext<T> {
    previous: Option<Frame<T>>,
    id: ContextId,
    depth: usize,
    current: T,
}

impl<T> SavedContext<T> {
    /// Identity of the context this record activated
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Identity of the context that was active before, if any
    pub fn previous_id(&self) -> Option<ContextId> {
        self.previous.as_ref().map(|f| f.id)
    }

    /// Nesting depth while this record's context is active (outermost is 1)
    pub fn depth(&self) -> usize {
        self.depth + 1
    }

    /// The context this record activated
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The context that was active before, if any
    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref().map(|f| &f.value)
    }
}

/// The active context of one kind
pub struct ContextSlot<T> {
    active: RefCell<Option<Frame<T>>>,
    /// Ids of activations not yet restored, innermost last
    live: RefCell<Vec<ContextId>>,
}

impl<T: Clone> ContextSlot<T> {
    pub const fn new() -> Self {
        Self {
            active: RefCell::new(None),
            live: RefCell::new(Vec::new()),
        }
    }

    /// Activate `value`, refusing when `limit` contexts are already active
    ///
    /// A refusal leaves the slot untouched.
    pub fn install(&self, value: T, limit: Option<usize>) -> CallbackResult<SavedContext<T>> {
        if let Some(limit) = limit {
            if self.depth() >= limit {
                return Err(CallbackError::DepthExceeded { limit });
            }
        }
        Ok(self.install_unbounded(value))
    }

    /// Activate `value` without a nesting limit
    pub fn install_unbounded(&self, value: T) -> SavedContext<T> {
        let depth = self.depth();
        let id = ContextId::next();
        let frame = Frame {
            id,
            value: value.clone(),
        };

        // Snapshot and overwrite in one step.
        let previous = self.active.replace(Some(frame));
        self.live.borrow_mut().push(id);

        SavedContext {
            previous,
            id,
            depth,
            current: value,
        }
    }

    /// Write the saved previous context back
    ///
    /// In order, this pops the record's activation. Out of order, the restore
    /// is reported as `NestingViolation`: a record that is still live unwinds
    /// the slot to its own previous context, dropping every activation above
    /// it, and a record that was already unwound writes nothing.
    pub fn restore(&self, saved: SavedContext<T>) -> CallbackResult<()> {
        let active = self.active_id();
        let position = self.live.borrow().iter().rposition(|id| *id == saved.id);

        if let Some(position) = position {
            self.live.borrow_mut().truncate(position);
            self.active.replace(saved.previous);
        }

        match active {
            Some(id) if id == saved.id => Ok(()),
            Some(id) => Err(CallbackError::NestingViolation {
                record: saved.id,
                active: ContextDescription::Context(id),
            }),
            None => Err(CallbackError::NestingViolation {
                record: saved.id,
                active: ContextDescription::Nothing,
            }),
        }
    }

    /// Clone of the active context, if any
    pub fn current(&self) -> Option<T> {
        self.active.borrow().as_ref().map(|f| f.value.clone())
    }

    /// Identity of the active context, if any
    pub fn active_id(&self) -> Option<ContextId> {
        self.active.borrow().as_ref().map(|f| f.id)
    }

    /// Number of nested activations currently in effect
    pub fn depth(&self) -> usize {
        self.live.borrow().len()
    }
}

impl<T: Clone> Default for ContextSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped activation of a thread-local slot
///
/// Restores the previous context when dropped, so the restore runs on every
/// exit path, including unwinding. `restore` does the same explicitly and
/// reports nesting violations to the caller.
pub struct ContextGuard<T: Clone + 'static> {
    slot: &'static LocalKey<ContextSlot<T>>,
    saved: Option<SavedContext<T>>,
    kind: &'static str,
    _not_send: PhantomData<Rc<()>>,
}

impl<T: Clone + 'static> ContextGuard<T> {
    pub(crate) fn install(
        slot: &'static LocalKey<ContextSlot<T>>,
        value: T,
        limit: Option<usize>,
        kind: &'static str,
    ) -> CallbackResult<Self> {
        if unguarded() {
            unwind::discard_stale();
        }
        let saved = slot.with(|s| s.install(value, limit))?;
        Ok(Self::activated(slot, saved, kind))
    }

    pub(crate) fn install_unbounded(
        slot: &'static LocalKey<ContextSlot<T>>,
        value: T,
        kind: &'static str,
    ) -> Self {
        if unguarded() {
            unwind::discard_stale();
        }
        let saved = slot.with(|s| s.install_unbounded(value));
        Self::activated(slot, saved, kind)
    }

    fn activated(
        slot: &'static LocalKey<ContextSlot<T>>,
        saved: SavedContext<T>,
        kind: &'static str,
    ) -> Self {
        tracing::debug!(
            kind,
            id = saved.id().get(),
            depth = saved.depth(),
            previous = saved.previous_id().map(ContextId::get),
            "context activated"
        );
        GUARDS.with(|g| g.set(g.get() + 1));
        Self {
            slot,
            saved: Some(saved),
            kind,
            _not_send: PhantomData,
        }
    }

    fn saved(&self) -> &SavedContext<T> {
        match &self.saved {
            Some(saved) => saved,
            // Only `finish` clears it, and it consumes or drops the guard.
            None => unreachable!("context guard used after restore"),
        }
    }

    /// Identity of the activated context
    pub fn id(&self) -> ContextId {
        self.saved().id()
    }

    /// Identity of the context this activation displaced
    pub fn previous_id(&self) -> Option<ContextId> {
        self.saved().previous_id()
    }

    /// Nesting depth of the activated context (outermost is 1)
    pub fn depth(&self) -> usize {
        self.saved().depth()
    }

    /// The activated context
    pub fn current(&self) -> &T {
        self.saved().current()
    }

    /// The displaced context, if any
    pub fn previous(&self) -> Option<&T> {
        self.saved().previous()
    }

    /// Restore the displaced context, reporting out-of-order use
    ///
    /// When this is the last active guard on the thread and no unwind target
    /// is active, an evaluation failure recorded under it is taken here and
    /// returned as `Fatal`.
    pub fn restore(mut self) -> CallbackResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> CallbackResult<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        let id = saved.id();
        let depth = saved.depth();
        let result = match self.slot.try_with(|s| s.restore(saved)) {
            Ok(result) => result,
            // Thread-local storage is being torn down; nothing left to restore.
            Err(_) => Ok(()),
        };
        let _ = GUARDS.try_with(|g| g.set(g.get().saturating_sub(1)));
        tracing::debug!(kind = self.kind, id = id.get(), depth, "context restored");

        let fatal = if unguarded() {
            unwind::take_fatal()
        } else {
            None
        };
        match (result, fatal) {
            (Ok(()), Some(err)) => {
                tracing::error!(kind = self.kind, error = %err, "evaluation failed");
                Err(CallbackError::Fatal(err))
            }
            (Err(violation), Some(err)) => {
                tracing::error!(kind = self.kind, error = %err, "evaluation failed");
                Err(violation)
            }
            (result, None) => result,
        }
    }
}

impl<T: Clone + 'static> Drop for ContextGuard<T> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::error!(kind = self.kind, error = %e, "context restore failed");
        }
    }
}
