//! Free-list node pool
//!
//! A minimal arena that recycles fixed-shape nodes instead of allocating one
//! per task. Nodes live in a `Vec` and are addressed by [`NodeKey`]; released
//! nodes are chained through an intrusive `next` link into a free list and
//! handed out again before the arena grows.
//!
//! The same `next` link is available to callers for their own singly linked
//! lists of in-use nodes (the engine's pending list is one). A node is on at
//! most one list at a time: either the pool's free list, or whatever list
//! the current owner threads it onto.

use std::fmt;

/// Handle to a node owned by a [`NodePool`].
///
/// Keys are plain indices. They carry no identity beyond the slot they point
/// at, so a key must not be used after the node it refers to is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

impl NodeKey {
    /// The slot index backing this key
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Node pool misuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The key does not belong to this pool
    #[error("{0} does not belong to this pool")]
    UnknownNode(NodeKey),

    /// The node is already on the free list
    #[error("{0} was released twice")]
    DoubleRelease(NodeKey),
}

struct Slot<N> {
    node: N,
    next: Option<NodeKey>,
    in_use: bool,
}

/// Allocation-avoiding pool of recyclable nodes.
///
/// # Example
///
/// ```
/// use everruns_queue::pool::NodePool;
///
/// let mut pool: NodePool<Option<u32>> = NodePool::new();
///
/// let (key, node) = pool.get();
/// *node = Some(7);
/// pool.release(key).unwrap();
///
/// // The released node is reused, and comes back cleared.
/// let (again, node) = pool.get();
/// assert_eq!(again, key);
/// assert_eq!(*node, None);
/// assert_eq!(pool.allocated(), 1);
/// ```
pub struct NodePool<N> {
    slots: Vec<Slot<N>>,
    free_head: Option<NodeKey>,
    free_tail: Option<NodeKey>,
    free_len: usize,
}

impl<N: Default> NodePool<N> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            free_tail: None,
            free_len: 0,
        }
    }

    /// Create a pool pre-warmed with `capacity` free nodes
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            free_tail: None,
            free_len: 0,
        };

        for index in 0..capacity {
            pool.slots.push(Slot {
                node: N::default(),
                next: None,
                in_use: false,
            });
            pool.push_free(NodeKey(index));
        }

        pool
    }

    /// Take a node out of the pool, ready to populate.
    ///
    /// Reuses the head of the free list when there is one; only an exhausted
    /// pool allocates a new node.
    pub fn get(&mut self) -> (NodeKey, &mut N) {
        let key = match self.free_head {
            Some(key) => {
                let slot = &mut self.slots[key.0];
                self.free_head = slot.next.take();
                if self.free_head.is_none() {
                    self.free_tail = None;
                }
                self.free_len -= 1;
                key
            }
            None => {
                self.slots.push(Slot {
                    node: N::default(),
                    next: None,
                    in_use: false,
                });
                NodeKey(self.slots.len() - 1)
            }
        };

        let slot = &mut self.slots[key.0];
        slot.in_use = true;
        (key, &mut slot.node)
    }

    /// Return a node to the tail of the free list.
    ///
    /// The node is reset to `N::default()` so nothing from its previous use
    /// survives into the next one.
    pub fn release(&mut self, key: NodeKey) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(key.0)
            .ok_or(PoolError::UnknownNode(key))?;

        if !slot.in_use {
            return Err(PoolError::DoubleRelease(key));
        }

        slot.in_use = false;
        slot.next = None;
        drop(std::mem::take(&mut slot.node));

        self.push_free(key);
        Ok(())
    }

    fn push_free(&mut self, key: NodeKey) {
        match self.free_tail {
            Some(tail) => self.slots[tail.0].next = Some(key),
            None => self.free_head = Some(key),
        }
        self.free_tail = Some(key);
        self.free_len += 1;
    }
}

impl<N> NodePool<N> {
    /// Borrow an in-use node
    pub fn node(&self, key: NodeKey) -> Option<&N> {
        self.slots
            .get(key.0)
            .filter(|slot| slot.in_use)
            .map(|slot| &slot.node)
    }

    /// Mutably borrow an in-use node
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut N> {
        self.slots
            .get_mut(key.0)
            .filter(|slot| slot.in_use)
            .map(|slot| &mut slot.node)
    }

    /// The node linked after an in-use node
    pub fn next(&self, key: NodeKey) -> Option<NodeKey> {
        self.slots
            .get(key.0)
            .filter(|slot| slot.in_use)
            .and_then(|slot| slot.next)
    }

    /// Link an in-use node to `next`.
    ///
    /// Links on free nodes belong to the pool and are left untouched.
    pub fn set_next(&mut self, key: NodeKey, next: Option<NodeKey>) {
        if let Some(slot) = self.slots.get_mut(key.0).filter(|slot| slot.in_use) {
            slot.next = next;
        }
    }

    /// Total number of nodes ever allocated
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    /// Number of nodes on the free list
    pub fn available(&self) -> usize {
        self.free_len
    }

    /// Number of nodes currently handed out
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free_len
    }
}

impl<N: Default> Default for NodePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> fmt::Debug for NodePool<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("allocated", &self.allocated())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Payload {
        value: Option<String>,
        callback: Option<fn() -> u32>,
    }

    #[test]
    fn test_get_allocates_when_empty() {
        let mut pool: NodePool<Payload> = NodePool::new();
        assert_eq!(pool.allocated(), 0);

        let (a, _) = pool.get();
        let (b, _) = pool.get();

        assert_ne!(a, b);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_released_node_is_reused() {
        let mut pool: NodePool<Payload> = NodePool::new();

        let (a, _) = pool.get();
        pool.release(a).unwrap();
        let (b, _) = pool.get();

        assert_eq!(a, b);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_release_clears_previous_contents() {
        let mut pool: NodePool<Payload> = NodePool::new();

        let (key, node) = pool.get();
        node.value = Some("secret".to_string());
        node.callback = Some(|| 42);
        pool.release(key).unwrap();

        let (_, node) = pool.get();
        assert_eq!(*node, Payload::default());
    }

    #[test]
    fn test_free_list_is_fifo() {
        let mut pool: NodePool<Payload> = NodePool::new();

        let (a, _) = pool.get();
        let (b, _) = pool.get();
        let (c, _) = pool.get();

        pool.release(b).unwrap();
        pool.release(a).unwrap();
        pool.release(c).unwrap();

        // Released nodes join the tail, so they come back in release order.
        assert_eq!(pool.get().0, b);
        assert_eq!(pool.get().0, a);
        assert_eq!(pool.get().0, c);
        assert_eq!(pool.allocated(), 3);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let mut pool: NodePool<Payload> = NodePool::new();

        let (key, _) = pool.get();
        assert!(pool.release(key).is_ok());
        assert_eq!(pool.release(key), Err(PoolError::DoubleRelease(key)));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut pool: NodePool<Payload> = NodePool::new();
        let stray = NodeKey(9);
        assert_eq!(pool.release(stray), Err(PoolError::UnknownNode(stray)));
    }

    #[test]
    fn test_with_capacity_prewarms() {
        let mut pool: NodePool<Payload> = NodePool::with_capacity(4);
        assert_eq!(pool.allocated(), 4);
        assert_eq!(pool.available(), 4);

        for _ in 0..4 {
            pool.get();
        }
        assert_eq!(pool.allocated(), 4);

        pool.get();
        assert_eq!(pool.allocated(), 5);
    }

    #[test]
    fn test_links_only_apply_to_nodes_in_use() {
        let mut pool: NodePool<Payload> = NodePool::new();

        let (a, _) = pool.get();
        let (b, _) = pool.get();
        pool.set_next(a, Some(b));
        assert_eq!(pool.next(a), Some(b));

        pool.release(a).unwrap();
        assert_eq!(pool.next(a), None);
        assert!(pool.node(a).is_none());

        // A freed node's link belongs to the pool.
        pool.set_next(a, Some(b));
        let (reused, _) = pool.get();
        assert_eq!(reused, a);
        assert_eq!(pool.next(reused), None);
    }
}
