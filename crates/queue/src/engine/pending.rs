//! Pending-task list
//!
//! An intrusive singly linked FIFO threaded through the node pool's `next`
//! links. Only in-use nodes are ever linked here.

use crate::pool::{NodeKey, NodePool};

#[derive(Debug, Default)]
pub(crate) struct PendingList {
    head: Option<NodeKey>,
    tail: Option<NodeKey>,
    len: usize,
}

impl PendingList {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append at the tail
    pub(crate) fn push_back<N>(&mut self, nodes: &mut NodePool<N>, key: NodeKey) {
        nodes.set_next(key, None);
        match self.tail {
            Some(tail) => nodes.set_next(tail, Some(key)),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.len += 1;
    }

    /// Prepend at the head, ahead of everything already pending
    pub(crate) fn push_front<N>(&mut self, nodes: &mut NodePool<N>, key: NodeKey) {
        nodes.set_next(key, self.head);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
        self.head = Some(key);
        self.len += 1;
    }

    /// Detach the head
    pub(crate) fn pop_front<N>(&mut self, nodes: &mut NodePool<N>) -> Option<NodeKey> {
        let key = self.head?;
        self.head = nodes.next(key);
        nodes.set_next(key, None);
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(key)
    }

    /// Detach every node, in dispatch order
    pub(crate) fn drain<N>(&mut self, nodes: &mut NodePool<N>) -> Vec<NodeKey> {
        let mut keys = Vec::with_capacity(self.len);
        while let Some(key) = self.pop_front(nodes) {
            keys.push(key);
        }
        keys
    }

    /// Walk the list in dispatch order without detaching anything
    pub(crate) fn keys<'a, N>(&self, nodes: &'a NodePool<N>) -> impl Iterator<Item = NodeKey> + 'a {
        std::iter::successors(self.head, move |key| nodes.next(*key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &PendingList, nodes: &NodePool<u32>) -> Vec<u32> {
        list.keys(nodes)
            .map(|key| *nodes.node(key).unwrap())
            .collect()
    }

    fn node(nodes: &mut NodePool<u32>, value: u32) -> NodeKey {
        let (key, slot) = nodes.get();
        *slot = value;
        key
    }

    #[test]
    fn test_push_back_is_fifo() {
        let mut nodes = NodePool::new();
        let mut list = PendingList::default();

        for value in 1..=3 {
            let key = node(&mut nodes, value);
            list.push_back(&mut nodes, key);
        }

        assert_eq!(list.len(), 3);
        assert_eq!(keys(&list, &nodes), vec![1, 2, 3]);
    }

    #[test]
    fn test_push_front_jumps_the_line() {
        let mut nodes = NodePool::new();
        let mut list = PendingList::default();

        let one = node(&mut nodes, 1);
        let four = node(&mut nodes, 4);
        let three = node(&mut nodes, 3);
        let two = node(&mut nodes, 2);

        list.push_back(&mut nodes, one);
        list.push_back(&mut nodes, four);
        list.push_front(&mut nodes, three);
        list.push_front(&mut nodes, two);

        assert_eq!(keys(&list, &nodes), vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_push_front_on_empty_sets_tail() {
        let mut nodes = NodePool::new();
        let mut list = PendingList::default();

        let first = node(&mut nodes, 1);
        list.push_front(&mut nodes, first);
        let second = node(&mut nodes, 2);
        list.push_back(&mut nodes, second);

        assert_eq!(keys(&list, &nodes), vec![1, 2]);
    }

    #[test]
    fn test_pop_front_until_empty() {
        let mut nodes = NodePool::new();
        let mut list = PendingList::default();

        let a = node(&mut nodes, 1);
        let b = node(&mut nodes, 2);
        list.push_back(&mut nodes, a);
        list.push_back(&mut nodes, b);

        assert_eq!(list.pop_front(&mut nodes), Some(a));
        assert_eq!(nodes.next(a), None);
        assert_eq!(list.pop_front(&mut nodes), Some(b));
        assert_eq!(list.pop_front(&mut nodes), None);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);

        // The list is reusable once emptied.
        list.push_back(&mut nodes, a);
        assert_eq!(keys(&list, &nodes), vec![1]);
    }

    #[test]
    fn test_drain_detaches_everything() {
        let mut nodes = NodePool::new();
        let mut list = PendingList::default();

        let keys_in: Vec<_> = (0..4).map(|v| node(&mut nodes, v)).collect();
        for key in &keys_in {
            list.push_back(&mut nodes, *key);
        }

        assert_eq!(list.drain(&mut nodes), keys_in);
        assert!(list.is_empty());
        assert!(keys_in.iter().all(|key| nodes.next(*key).is_none()));
    }
}
