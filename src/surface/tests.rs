use {
    super::{BufferId, FrameCallbackId, Placement, PlacementOp, Surface, SurfaceError, SurfaceState},
    crate::{compositor::Compositor, transaction::Transaction},
    std::rc::Rc,
};

#[test]
fn toplevel_walks_to_the_root_ancestor() {
    let compositor = Compositor::new();
    let root = Surface::new(&compositor);
    let child = Surface::new(&compositor);
    let grandchild = Surface::new(&compositor);
    child.set_parent(Some(&root)).unwrap();
    grandchild.set_parent(Some(&child)).unwrap();
    assert_eq!(root.toplevel().id, root.id);
    assert_eq!(grandchild.toplevel().id, root.id);
    assert!(root.is_ancestor_of(&grandchild));
    assert!(!grandchild.is_ancestor_of(&root));
}

#[test]
fn tree_paths_order_ancestors_before_descendants() {
    let compositor = Compositor::new();
    let root = Surface::new(&compositor);
    let child = Surface::new(&compositor);
    let grandchild = Surface::new(&compositor);
    let other = Surface::new(&compositor);
    child.set_parent(Some(&root)).unwrap();
    grandchild.set_parent(Some(&child)).unwrap();
    assert_eq!(
        grandchild.tree_path().as_slice(),
        &[root.id, child.id, grandchild.id],
    );
    assert!(root.tree_path() < child.tree_path());
    assert!(child.tree_path() < grandchild.tree_path());
    // Unrelated surfaces order by their toplevel id.
    assert!(grandchild.tree_path() < other.tree_path());
}

#[test]
fn set_parent_rejects_loops() {
    let compositor = Compositor::new();
    let a = Surface::new(&compositor);
    let b = Surface::new(&compositor);
    b.set_parent(Some(&a)).unwrap();
    assert!(matches!(
        a.set_parent(Some(&b)),
        Err(SurfaceError::ParentLoop),
    ));
    assert!(matches!(
        a.set_parent(Some(&a)),
        Err(SurfaceError::ParentLoop),
    ));
}

#[test]
fn reparenting_updates_the_child_stacks() {
    let compositor = Compositor::new();
    let p1 = Surface::new(&compositor);
    let p2 = Surface::new(&compositor);
    let child = Surface::new(&compositor);
    child.set_parent(Some(&p1)).unwrap();
    assert_eq!(p1.children.borrow().len(), 1);
    child.set_parent(Some(&p2)).unwrap();
    assert!(p1.children.borrow().is_empty());
    assert_eq!(p2.children.borrow().len(), 1);
    child.set_parent(None).unwrap();
    assert!(p2.children.borrow().is_empty());
}

#[test]
fn destroy_fails_while_transactions_are_outstanding() {
    let compositor = Compositor::new();
    let parent = Surface::new(&compositor);
    let surface = Surface::new(&compositor);
    surface.set_parent(Some(&parent)).unwrap();
    let tx = Transaction::new(&compositor);
    surface.first_committed.set(Some(tx.id));
    assert!(matches!(
        surface.destroy(),
        Err(SurfaceError::OutstandingTransactions),
    ));
    surface.first_committed.set(None);
    surface.destroy().unwrap();
    assert!(surface.parent().is_none());
    assert!(parent.children.borrow().is_empty());
}

#[test]
fn state_merge_drains_the_newer_state() {
    let mut older = SurfaceState {
        buffer: Some(Some(BufferId(1))),
        offset: Some((1, 2)),
        damage: false,
        frame_callbacks: vec![FrameCallbackId(1)],
        placements: Vec::new(),
    };
    let mut newer = SurfaceState {
        buffer: Some(Some(BufferId(2))),
        damage: true,
        frame_callbacks: vec![FrameCallbackId(2)],
        ..Default::default()
    };
    newer.merge_into(&mut older);
    assert_eq!(older.buffer, Some(Some(BufferId(2))));
    assert_eq!(older.offset, Some((1, 2)));
    assert!(older.damage);
    assert_eq!(
        older.frame_callbacks,
        vec![FrameCallbackId(1), FrameCallbackId(2)],
    );
    assert!(newer.buffer.is_none());
    assert!(!newer.damage);
    assert!(newer.frame_callbacks.is_empty());
    older.reset();
    assert!(older.buffer.is_none());
    assert!(older.frame_callbacks.is_empty());
}

#[test]
fn apply_state_writes_the_surface_fields() {
    let compositor = Compositor::new();
    let surface = Surface::new(&compositor);
    let mut state = SurfaceState {
        buffer: Some(Some(BufferId(1))),
        offset: Some((10, 20)),
        damage: true,
        frame_callbacks: vec![FrameCallbackId(1)],
        placements: Vec::new(),
    };
    surface.apply_state(&mut state);
    assert_eq!(surface.buffer.get(), Some(BufferId(1)));
    assert_eq!(surface.buf_x.get(), 10);
    assert_eq!(surface.buf_y.get(), 20);
    assert!(surface.damaged.get());
    assert_eq!(*surface.frame_callbacks.borrow(), vec![FrameCallbackId(1)]);
    assert!(state.frame_callbacks.is_empty());
    // Detaching the buffer is a distinct change from leaving it untouched.
    let mut state = SurfaceState {
        buffer: Some(None),
        ..Default::default()
    };
    surface.apply_state(&mut state);
    assert_eq!(surface.buffer.get(), None);
}

#[test]
fn placements_restack_the_child_stack() {
    let compositor = Compositor::new();
    let parent = Surface::new(&compositor);
    let s1 = Surface::new(&compositor);
    let s2 = Surface::new(&compositor);
    let s3 = Surface::new(&compositor);
    for s in [&s1, &s2, &s3] {
        s.set_parent(Some(&parent)).unwrap();
    }
    let stack = |parent: &Rc<Surface>| {
        parent
            .children
            .borrow()
            .iter()
            .map(|c| c.id)
            .collect::<Vec<_>>()
    };
    assert_eq!(stack(&parent), vec![s1.id, s2.id, s3.id]);
    let mut state = SurfaceState {
        placements: vec![PlacementOp {
            placement: Placement::Below,
            surface: Some(s3.clone()),
            sibling: Some(s1.clone()),
        }],
        ..Default::default()
    };
    parent.apply_state(&mut state);
    assert_eq!(stack(&parent), vec![s3.id, s1.id, s2.id]);
    let mut state = SurfaceState {
        placements: vec![PlacementOp {
            placement: Placement::Above,
            surface: Some(s1.clone()),
            sibling: Some(parent.clone()),
        }],
        ..Default::default()
    };
    parent.apply_state(&mut state);
    assert_eq!(stack(&parent), vec![s1.id, s3.id, s2.id]);
}
