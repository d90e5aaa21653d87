#[cfg(test)]
mod tests;

use {
    crate::{
        compositor::Compositor,
        transaction::TransactionId,
        utils::{clonecell::CloneCell, numcell::NumCell},
    },
    smallvec::SmallVec,
    std::{
        cell::{Cell, RefCell},
        fmt::{Debug, Formatter},
        mem,
        rc::Rc,
    },
    thiserror::Error,
};

linear_ids!(SurfaceIds, SurfaceId, u64);

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct BufferId(pub u64);

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct FrameCallbackId(pub u64);

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("The surface would become an ancestor of itself")]
    ParentLoop,
    #[error("The surface still has unapplied transactions")]
    OutstandingTransactions,
}

/// Hooks for the actor layer sitting on top of a surface.
pub trait SurfaceExt {
    fn state_applied(&self, surface: &Rc<Surface>) {
        let _ = surface;
    }

    fn sync_actor_state(&self, surface: &Rc<Surface>) {
        let _ = surface;
    }
}

pub struct NoneSurfaceExt;

impl SurfaceExt for NoneSurfaceExt {}

pub struct Surface {
    pub id: SurfaceId,
    parent: CloneCell<Option<Rc<Surface>>>,
    /// Sub-surfaces stacked bottom to top.
    children: RefCell<Vec<Rc<Surface>>>,
    pub sub_x: Cell<i32>,
    pub sub_y: Cell<i32>,
    pub buffer: Cell<Option<BufferId>>,
    pub buf_x: NumCell<i32>,
    pub buf_y: NumCell<i32>,
    pub damaged: Cell<bool>,
    pub frame_callbacks: RefCell<Vec<FrameCallbackId>>,
    /// Protocol state queued since the last commit.
    pub pending: RefCell<Box<SurfaceState>>,
    /// Oldest committed transaction that has not yet been applied for this
    /// surface. `None` means the surface has no outstanding transactions.
    pub(crate) first_committed: Cell<Option<TransactionId>>,
    /// Most recently committed transaction referencing this surface.
    pub(crate) last_committed: Cell<Option<TransactionId>>,
    ext: CloneCell<Rc<dyn SurfaceExt>>,
}

impl Debug for Surface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Surface {
    pub fn new(compositor: &Rc<Compositor>) -> Rc<Self> {
        Rc::new(Self {
            id: compositor.surface_ids.next(),
            parent: Default::default(),
            children: Default::default(),
            sub_x: Cell::new(0),
            sub_y: Cell::new(0),
            buffer: Cell::new(None),
            buf_x: Default::default(),
            buf_y: Default::default(),
            damaged: Cell::new(false),
            frame_callbacks: Default::default(),
            pending: Default::default(),
            first_committed: Cell::new(None),
            last_committed: Cell::new(None),
            ext: CloneCell::new(compositor.none_surface_ext.clone()),
        })
    }

    pub fn set_ext(&self, ext: Rc<dyn SurfaceExt>) {
        self.ext.set(ext);
    }

    pub fn parent(&self) -> Option<Rc<Surface>> {
        self.parent.get()
    }

    /// Makes this surface a sub-surface of `parent`, or a toplevel if
    /// `parent` is `None`.
    pub fn set_parent(
        self: &Rc<Self>,
        parent: Option<&Rc<Surface>>,
    ) -> Result<(), SurfaceError> {
        if let Some(parent) = parent {
            if parent.id == self.id || self.is_ancestor_of(parent) {
                return Err(SurfaceError::ParentLoop);
            }
        }
        if let Some(old) = self.parent.set(parent.cloned()) {
            old.children.borrow_mut().retain(|c| c.id != self.id);
        }
        if let Some(parent) = parent {
            parent.children.borrow_mut().push(self.clone());
        }
        Ok(())
    }

    pub fn toplevel(self: &Rc<Self>) -> Rc<Surface> {
        let mut surface = self.clone();
        while let Some(parent) = surface.parent.get() {
            surface = parent;
        }
        surface
    }

    pub fn is_ancestor_of(&self, other: &Rc<Surface>) -> bool {
        let mut ancestor = other.parent.get();
        while let Some(a) = ancestor {
            if a.id == self.id {
                return true;
            }
            ancestor = a.parent.get();
        }
        false
    }

    /// The surface ids on the path from the root ancestor down to this
    /// surface. An ancestor's path is a strict prefix of its descendants'
    /// paths, so comparing paths lexicographically orders ancestors first
    /// and unrelated trees by their toplevel id.
    pub(crate) fn tree_path(self: &Rc<Self>) -> SmallVec<[SurfaceId; 4]> {
        let mut path = SmallVec::new();
        path.push(self.id);
        let mut parent = self.parent.get();
        while let Some(p) = parent {
            path.push(p.id);
            parent = p.parent.get();
        }
        path.reverse();
        path
    }

    /// Tears the surface out of the tree. Fails while a committed
    /// transaction still references the surface.
    pub fn destroy(self: &Rc<Self>) -> Result<(), SurfaceError> {
        if self.first_committed.get().is_some() {
            return Err(SurfaceError::OutstandingTransactions);
        }
        if let Some(parent) = self.parent.set(None) {
            parent.children.borrow_mut().retain(|c| c.id != self.id);
        }
        for child in self.children.borrow_mut().drain(..) {
            child.parent.set(None);
        }
        Ok(())
    }

    pub(crate) fn apply_state(self: &Rc<Self>, state: &mut SurfaceState) {
        if let Some(buffer) = state.buffer.take() {
            self.buffer.set(buffer);
        }
        if let Some((x, y)) = state.offset.take() {
            self.buf_x.set(x);
            self.buf_y.set(y);
        }
        if mem::take(&mut state.damage) {
            self.damaged.set(true);
        }
        self.frame_callbacks
            .borrow_mut()
            .append(&mut state.frame_callbacks);
        for op in state.placements.drain(..) {
            apply_placement(op);
        }
        self.ext.get().state_applied(self);
    }

    pub(crate) fn sync_child_states(&self) {
        for child in self.children.borrow().iter() {
            child.ext.get().sync_actor_state(child);
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Placement {
    Above,
    Below,
}

#[derive(Clone)]
pub struct PlacementOp {
    pub placement: Placement,
    pub surface: Option<Rc<Surface>>,
    pub sibling: Option<Rc<Surface>>,
}

/// Restacks `op.surface` relative to `op.sibling` in their shared parent's
/// child stack. Placing relative to the parent itself clamps to the bottom
/// of the stack.
fn apply_placement(op: PlacementOp) {
    let (Some(surface), Some(sibling)) = (op.surface, op.sibling) else {
        return;
    };
    let Some(parent) = surface.parent.get() else {
        return;
    };
    let mut children = parent.children.borrow_mut();
    let Some(old) = children.iter().position(|c| c.id == surface.id) else {
        return;
    };
    let surface = children.remove(old);
    let idx = if sibling.id == parent.id {
        0
    } else {
        match children.iter().position(|c| c.id == sibling.id) {
            Some(pos) => match op.placement {
                Placement::Above => pos + 1,
                Placement::Below => pos,
            },
            None => old.min(children.len()),
        }
    };
    children.insert(idx, surface);
}

/// Protocol-visible changes queued on a surface between commits.
#[derive(Default)]
pub struct SurfaceState {
    pub buffer: Option<Option<BufferId>>,
    pub offset: Option<(i32, i32)>,
    pub damage: bool,
    pub frame_callbacks: Vec<FrameCallbackId>,
    pub placements: Vec<PlacementOp>,
}

impl SurfaceState {
    /// Merges this state into `into`, draining `self`. `self` is the newer
    /// of the two states: its scalar fields win, list fields are appended.
    pub fn merge_into(&mut self, into: &mut SurfaceState) {
        macro_rules! opt {
            ($name:ident) => {
                if let Some(n) = self.$name.take() {
                    into.$name = Some(n);
                }
            };
        }
        opt!(buffer);
        opt!(offset);
        into.damage |= mem::take(&mut self.damage);
        into.frame_callbacks.append(&mut self.frame_callbacks);
        into.placements.append(&mut self.placements);
    }

    pub fn reset(&mut self) {
        *self = Default::default();
    }
}
