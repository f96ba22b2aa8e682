//! LRU List Module
//!
//! Arena-backed doubly linked list that keeps entries in recency order.

// == Node Handle ==
/// Stable handle to a node in an [`LruList`].
///
/// A handle stays valid until its node is removed; after that the slot may be
/// reused by a later insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU List ==
/// Recency-ordered list with O(1) access to both ends and to any node.
///
/// - Front = Most recently used
/// - Back = Least recently used (next eviction candidate)
#[derive(Debug)]
pub struct LruList<T> {
    /// Node storage, `None` for free slots
    slots: Vec<Option<Node<T>>>,
    /// Indices of free slots available for reuse
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for LruList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LruList<T> {
    // == Constructor ==
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    // == Push Front ==
    /// Inserts a value at the most recently used end.
    pub fn push_front(&mut self, value: T) -> NodeId {
        let node = Node {
            value,
            prev: None,
            next: self.head,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.node_mut(old_head).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;

        NodeId(idx)
    }

    // == Move To Front ==
    /// Marks a node as most recently used.
    pub fn move_to_front(&mut self, id: NodeId) {
        if self.head == Some(id.0) {
            return;
        }

        self.unlink(id.0);

        let old_head = self.head;
        {
            let node = self.node_mut(id.0);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.node_mut(h).prev = Some(id.0),
            None => self.tail = Some(id.0),
        }
        self.head = Some(id.0);
    }

    // == Remove ==
    /// Removes a node and returns its value.
    ///
    /// Returns None if the handle does not refer to a live node.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        self.slots.get(id.0)?.as_ref()?;

        self.unlink(id.0);
        let node = self.slots[id.0].take()?;
        self.free.push(id.0);
        self.len -= 1;

        Some(node.value)
    }

    // == Back ==
    /// Returns the handle of the least recently used node.
    pub fn back(&self) -> Option<NodeId> {
        self.tail.map(NodeId)
    }

    // == Pop Back ==
    /// Removes and returns the least recently used value.
    pub fn pop_back(&mut self) -> Option<T> {
        let tail = self.back()?;
        self.remove(tail)
    }

    // == Accessors ==
    /// Returns a reference to the value behind a handle.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .map(|node| &node.value)
    }

    /// Returns a mutable reference to the value behind a handle.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .map(|node| &mut node.value)
    }

    // == Iteration ==
    /// Iterates values from least to most recently used.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.tail,
            remaining: self.len,
        }
    }

    /// Removes every value, yielding them from least to most recently used.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        while let Some(value) = self.pop_back() {
            values.push(value);
        }
        self.slots.clear();
        self.free.clear();
        values
    }

    // == Length ==
    /// Returns the number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Internal Helpers ==
    fn node(&self, idx: usize) -> &Node<T> {
        self.slots[idx]
            .as_ref()
            .expect("linked slot must hold a node")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<T> {
        self.slots[idx]
            .as_mut()
            .expect("linked slot must hold a node")
    }

    /// Detaches a node from its neighbours, patching head/tail as needed.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }
}

/// Iterator over an [`LruList`], oldest first.
pub struct Iter<'a, T> {
    list: &'a LruList<T>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.list.node(idx);
        self.cursor = node.prev;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
