use {
    crate::{
        surface::{NoneSurfaceExt, SurfaceIds},
        transaction::{Transaction, TransactionIds},
        utils::{linkedlist::LinkedList, numcell::NumCell},
    },
    std::rc::Rc,
};

/// The compositor-wide context: id allocators, the commit-sequence counter,
/// and the queue of committed but not yet applied transactions.
pub struct Compositor {
    pub(crate) surface_ids: SurfaceIds,
    pub(crate) transaction_ids: TransactionIds,
    pub(crate) commit_sequence: NumCell<u64>,
    pub(crate) committed: LinkedList<Rc<Transaction>>,
    pub(crate) none_surface_ext: Rc<NoneSurfaceExt>,
}

impl Compositor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            surface_ids: Default::default(),
            transaction_ids: Default::default(),
            commit_sequence: NumCell::new(1),
            committed: Default::default(),
            none_surface_ext: Rc::new(NoneSurfaceExt),
        })
    }

    pub fn has_committed_transactions(&self) -> bool {
        !self.committed.is_empty()
    }

    /// Destroys every committed but not yet applied transaction without
    /// applying it. Must run during compositor teardown, before the context
    /// is dropped, since the commit queue's nodes and the transactions'
    /// context references form cycles that only destruction breaks.
    pub fn clear(&self) {
        let mut discarded = 0usize;
        while let Some(tx) = self.committed.first() {
            tx.destroy();
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("discarded {} unapplied transactions", discarded);
        }
    }
}
