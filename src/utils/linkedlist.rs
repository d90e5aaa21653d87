use {
    crate::utils::numcell::NumCell,
    std::{cell::Cell, mem, ops::Deref, ptr::NonNull},
};

const LINKED_NODE_REF_COUNT: usize = !(!0 >> 1);

/// An intrusive, ref-counted, doubly linked list.
///
/// Nodes are owned by a `LinkedNode` and unlink themselves when it is
/// dropped. `NodeRef`s are weak cursors into the list that keep the node
/// allocation (but not its membership) alive.
pub struct LinkedList<T> {
    root: LinkedNode<T>,
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedList<T> {
    pub fn new() -> Self {
        Self {
            root: LinkedNode::new(None),
        }
    }

    pub fn add_last(&self, t: T) -> LinkedNode<T> {
        unsafe { prepend(self.root.data, t) }
    }

    pub fn first(&self) -> Option<NodeRef<T>> {
        unsafe {
            let first = self.root.data.as_ref().next.get();
            if first != self.root.data {
                first.as_ref().rc.fetch_add(1);
                Some(NodeRef { data: first })
            } else {
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }
}

#[repr(transparent)]
#[must_use]
pub struct LinkedNode<T> {
    data: NonNull<NodeData<T>>,
}

impl<T> Deref for LinkedNode<T> {
    type Target = NodeRef<T>;

    fn deref(&self) -> &Self::Target {
        unsafe { mem::transmute(self) }
    }
}

impl<T> LinkedNode<T> {
    fn new(t: Option<T>) -> Self {
        let node = Box::leak(Box::new(NodeData {
            rc: NumCell::new(LINKED_NODE_REF_COUNT),
            prev: Cell::new(NonNull::dangling()),
            next: Cell::new(NonNull::dangling()),
            data: t,
        }));
        let ptr = NonNull::from(&mut *node);
        node.prev.set(ptr);
        node.next.set(ptr);
        LinkedNode { data: ptr }
    }

    pub fn to_ref(&self) -> NodeRef<T> {
        unsafe {
            self.data.as_ref().rc.fetch_add(1);
            NodeRef { data: self.data }
        }
    }
}

impl<T> Drop for LinkedNode<T> {
    fn drop(&mut self) {
        unsafe {
            self.detach();
            dec_ref_count(self.data, LINKED_NODE_REF_COUNT);
        }
    }
}

#[repr(transparent)]
pub struct NodeRef<T> {
    data: NonNull<NodeData<T>>,
}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { self.data.as_ref().data.as_ref().unwrap_unchecked() }
    }
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        unsafe {
            self.data.as_ref().rc.fetch_add(1);
            Self { data: self.data }
        }
    }
}

impl<T> Drop for NodeRef<T> {
    fn drop(&mut self) {
        unsafe {
            dec_ref_count(self.data, 1);
        }
    }
}

impl<T> NodeRef<T> {
    pub fn next(&self) -> Option<NodeRef<T>> {
        unsafe {
            let next = self.data.as_ref().next.get();
            if next.as_ref().data.is_some() {
                next.as_ref().rc.fetch_add(1);
                Some(NodeRef { data: next })
            } else {
                None
            }
        }
    }

    fn detach(&self) {
        unsafe {
            let data = self.data.as_ref();
            data.prev.get().as_ref().next.set(data.next.get());
            data.next.get().as_ref().prev.set(data.prev.get());
            data.prev.set(self.data);
            data.next.set(self.data);
        }
    }
}

struct NodeData<T> {
    rc: NumCell<usize>,
    prev: Cell<NonNull<NodeData<T>>>,
    next: Cell<NonNull<NodeData<T>>>,
    data: Option<T>,
}

unsafe fn dec_ref_count<T>(slf: NonNull<NodeData<T>>, n: usize) {
    unsafe {
        if slf.as_ref().rc.fetch_sub(n) == n {
            drop(Box::from_raw(slf.as_ptr()));
        }
    }
}

unsafe fn prepend<T>(data: NonNull<NodeData<T>>, t: T) -> LinkedNode<T> {
    unsafe {
        let dref = data.as_ref();
        let node = NonNull::new_unchecked(Box::into_raw(Box::new(NodeData {
            rc: NumCell::new(LINKED_NODE_REF_COUNT),
            prev: Cell::new(dref.prev.get()),
            next: Cell::new(data),
            data: Some(t),
        })));
        dref.prev.get().as_ref().next.set(node);
        dref.prev.set(node);
        LinkedNode { data: node }
    }
}
