
use {
    crate::{
        compositor::Compositor,
        surface::{Surface, SurfaceId, SurfaceState},
        utils::{
            clonecell::CloneCell,
            copyhashmap::CopyHashMap,
            linkedlist::{LinkedNode, NodeRef},
        },
    },
    isnt::std_1::primitive::IsntSliceExt,
    smallvec::SmallVec,
    std::{
        cell::{Cell, RefCell},
        mem,
        ops::Deref,
        rc::Rc,
    },
};

linear_ids!(TransactionIds, TransactionId, u64);

/// Transactions that became applicable while applying another transaction,
/// ordered by commit sequence.
type Candidates = SmallVec<[Rc<Transaction>; 2]>;

/// An atomic batch of state changes for one or more surfaces.
///
/// A transaction is populated from the referenced surfaces' pending state,
/// committed exactly once, and destroyed exactly once: after it has been
/// applied, after it has been merged into another transaction, or when the
/// compositor context is cleared.
pub struct Transaction {
    pub id: TransactionId,
    compositor: Rc<Compositor>,
    committed_sequence: Cell<Option<u64>>,
    entries: CopyHashMap<SurfaceId, Rc<TransactionEntry>>,
    candidate: Cell<bool>,
    link: Cell<Option<LinkedNode<Rc<Transaction>>>>,
    node: CloneCell<Option<NodeRef<Rc<Transaction>>>>,
}

pub struct TransactionEntry {
    pub surface: Rc<Surface>,
    state: RefCell<Option<Box<SurfaceState>>>,
    sub_pos: Cell<Option<(i32, i32)>>,
}

impl TransactionEntry {
    /// Merges this entry into `to`. `self` belongs to the newer of the two
    /// transactions.
    fn merge_into(&self, to: &TransactionEntry) {
        if let Some(pos) = self.sub_pos.take() {
            to.sub_pos.set(Some(pos));
        }
        let from_state = self.state.borrow_mut().take();
        if let Some(mut from_state) = from_state {
            let mut to_state = to.state.borrow_mut();
            match &mut *to_state {
                Some(to_state) => from_state.merge_into(to_state),
                None => *to_state = Some(from_state),
            }
        }
    }
}

impl Transaction {
    pub fn new(compositor: &Rc<Compositor>) -> Rc<Self> {
        Rc::new(Self {
            id: compositor.transaction_ids.next(),
            compositor: compositor.clone(),
            committed_sequence: Cell::new(None),
            entries: Default::default(),
            candidate: Cell::new(false),
            link: Cell::new(None),
            node: Default::default(),
        })
    }

    pub fn is_committed(&self) -> bool {
        self.committed_sequence.get().is_some()
    }

    pub fn entry(&self, surface: &Surface) -> Option<Rc<TransactionEntry>> {
        self.entries.get(&surface.id)
    }

    fn ensure_entry(&self, surface: &Rc<Surface>) -> Rc<TransactionEntry> {
        if let Some(entry) = self.entries.get(&surface.id) {
            return entry;
        }
        let entry = Rc::new(TransactionEntry {
            surface: surface.clone(),
            state: RefCell::new(None),
            sub_pos: Cell::new(None),
        });
        self.entries.set(surface.id, entry.clone());
        entry
    }

    /// Ensures that any transaction containing a restacking operation also
    /// contains entries for the surfaces the operation touches.
    fn add_placement_surfaces(&self, state: &SurfaceState) {
        for op in &state.placements {
            if let Some(surface) = &op.surface {
                self.ensure_entry(surface);
            }
            if let Some(sibling) = &op.sibling {
                self.ensure_entry(sibling);
            }
        }
    }

    pub fn add_subsurface_position(&self, surface: &Rc<Surface>, x: i32, y: i32) {
        self.ensure_entry(surface).sub_pos.set(Some((x, y)));
    }

    /// Moves the surface's queued protocol state into its entry. If the
    /// entry already holds state, the queued state is merged into it.
    /// Afterwards the surface's queued state is empty either way.
    pub fn merge_pending_state(&self, surface: &Rc<Surface>) {
        let entry = self.ensure_entry(surface);
        {
            let mut pending = surface.pending.borrow_mut();
            let mut state = entry.state.borrow_mut();
            match &mut *state {
                None => *state = Some(mem::take(&mut *pending)),
                Some(state) => {
                    pending.merge_into(state);
                    pending.reset();
                }
            }
        }
        let state = entry.state.borrow();
        if let Some(state) = &*state {
            self.add_placement_surfaces(state);
        }
    }

    /// Merges this transaction into `to` and destroys it. Only uncommitted
    /// transactions can be merged; committed transactions are immutable
    /// members of the commit queue.
    pub fn merge_into(&self, to: &Rc<Transaction>) {
        assert!(!self.is_committed(), "cannot merge a committed transaction");
        assert!(
            !to.is_committed(),
            "cannot merge into a committed transaction"
        );
        for (_, from_entry) in self.entries.lock().drain() {
            let surface = &from_entry.surface;
            match to.entries.get(&surface.id) {
                None => {
                    to.entries.set(surface.id, from_entry.clone());
                    if let Some(state) = &*from_entry.state.borrow() {
                        to.add_placement_surfaces(state);
                    }
                }
                Some(to_entry) => {
                    if let Some(state) = &*from_entry.state.borrow() {
                        to.add_placement_surfaces(state);
                    }
                    from_entry.merge_into(&to_entry);
                }
            }
        }
        self.destroy();
    }

    /// Commits the transaction: assigns its position in the global commit
    /// order, appends it to the commit queue, and applies it immediately
    /// unless one of its surfaces still has an older unapplied transaction.
    pub fn commit(self: &Rc<Self>) {
        assert!(!self.is_committed(), "transaction is already committed");
        let sequence = self.compositor.commit_sequence.fetch_add(1);
        self.committed_sequence.set(Some(sequence));
        let link = self.compositor.committed.add_last(self.clone());
        self.node.set(Some(link.to_ref()));
        self.link.set(Some(link));
        let mut maybe_apply = true;
        for (_, entry) in self.entries.lock().iter() {
            let surface = &entry.surface;
            surface.last_committed.set(Some(self.id));
            if surface.first_committed.get().is_none() {
                surface.first_committed.set(Some(self.id));
            } else {
                maybe_apply = false;
            }
        }
        log::trace!(
            "committed transaction {} (sequence {}, {} entries)",
            self.id,
            sequence,
            self.entries.len(),
        );
        if maybe_apply {
            self.maybe_apply();
        }
    }

    fn has_unapplied_dependencies(&self) -> bool {
        for (_, entry) in self.entries.lock().iter() {
            if entry.surface.first_committed.get() != Some(self.id) {
                return true;
            }
        }
        false
    }

    /// Applies this transaction if it is applicable and then iteratively
    /// applies every transaction that becomes applicable as a result. The
    /// work list keeps the cascade bounded regardless of how long the
    /// dependency chain is.
    fn maybe_apply(self: &Rc<Self>) {
        let mut candidates = Candidates::new();
        self.maybe_apply_one(&mut candidates);
        while candidates.is_not_empty() {
            let next = candidates.remove(0);
            next.candidate.set(false);
            next.maybe_apply_one(&mut candidates);
        }
    }

    fn maybe_apply_one(self: &Rc<Self>, candidates: &mut Candidates) {
        if self.has_unapplied_dependencies() {
            return;
        }
        self.apply(candidates);
    }

    fn apply(self: &Rc<Self>, candidates: &mut Candidates) {
        log::trace!("applying transaction {}", self.id);
        // Sort surfaces from ancestors to descendants.
        let mut batch: SmallVec<[_; 4]> = self
            .entries
            .lock()
            .values()
            .map(|e| (e.surface.tree_path(), e.clone()))
            .collect();
        batch.sort_by(|(a, _), (b, _)| a.cmp(b));
        // Apply states from ancestors to descendants.
        for (_, entry) in &batch {
            let surface = &entry.surface;
            if let Some((x, y)) = entry.sub_pos.get() {
                surface.sub_x.set(x);
                surface.sub_y.set(y);
            }
            if let Some(state) = &mut *entry.state.borrow_mut() {
                surface.apply_state(state);
            }
            if surface.last_committed.get() == Some(self.id) {
                surface.first_committed.set(None);
                surface.last_committed.set(None);
            } else {
                match self.find_next_transaction(surface) {
                    Some(next) => {
                        surface.first_committed.set(Some(next.id));
                        next.ensure_candidate(candidates);
                    }
                    None => {
                        // The dependency chain invariant no longer holds.
                        // Fail closed instead of leaving a handle to this
                        // transaction behind.
                        surface.first_committed.set(None);
                    }
                }
            }
        }
        // Synchronize child states from descendants to ancestors.
        for (_, entry) in batch.iter().rev() {
            if entry.state.borrow().is_some() {
                entry.surface.sync_child_states();
            }
        }
        self.destroy();
    }

    /// The next transaction in the commit queue that references `surface`.
    fn find_next_transaction(&self, surface: &Rc<Surface>) -> Option<Rc<Transaction>> {
        let mut node = self.node.get()?.next();
        while let Some(next) = node {
            if surface.last_committed.get() == Some(next.id)
                || next.entries.contains(&surface.id)
            {
                return Some(next.deref().clone());
            }
            node = next.next();
        }
        None
    }

    fn ensure_candidate(self: &Rc<Self>, candidates: &mut Candidates) {
        if self.candidate.replace(true) {
            return;
        }
        let sequence = self.committed_sequence.get();
        let pos = candidates.partition_point(|c| c.committed_sequence.get() < sequence);
        candidates.insert(pos, self.clone());
    }

    /// Drops all entries, clears the surfaces' back-handles to this
    /// transaction, and unlinks it from the commit queue.
    pub(crate) fn destroy(&self) {
        for (_, entry) in self.entries.lock().drain() {
            let surface = &entry.surface;
            if surface.first_committed.get() == Some(self.id) {
                surface.first_committed.set(None);
            }
            if surface.last_committed.get() == Some(self.id) {
                surface.last_committed.set(None);
            }
        }
        self.node.take();
        let _link = self.link.take();
    }
}
