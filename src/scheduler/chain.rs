//! Lock-free MPSC submission chain.
//!
//! An intrusive singly linked list with an atomically swapped tail. Any
//! thread may push; only the dispatch thread pops, during the per-tick drain.
//! The publish is two-step (swap the tail, then link the predecessor), so a
//! drain walking forward can observe a node whose successor is not yet
//! linked. The drain simply stops there; the remaining nodes become visible
//! once the lagging producer stores its link, and are picked up on a later
//! drain. Correctness of the dispatch loop depends on exactly this
//! stop-early behavior, so don't "fix" it.

use crate::owner::Owner;
use crate::scheduler::command::Command;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<O: Owner> {
    /// `None` only for the stub node the chain starts with (and for each
    /// consumed node, which becomes the new stub).
    cmd: UnsafeCell<Option<Command<O>>>,
    next: AtomicPtr<Node<O>>,
}

impl<O: Owner> Node<O> {
    fn boxed(cmd: Option<Command<O>>) -> *mut Self {
        Box::into_raw(Box::new(Node {
            cmd: UnsafeCell::new(cmd),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

pub(crate) struct Chain<O: Owner> {
    /// Consumer side. Only ever touched while holding the scheduler's core
    /// lock, which is what makes `pop` single-consumer.
    head: AtomicPtr<Node<O>>,
    tail: AtomicPtr<Node<O>>,
}

// Safety: nodes are heap-allocated and reached only through the two atomic
// pointers; producers touch `tail` and a predecessor's `next`, the single
// consumer owns everything from `head` forward.
unsafe impl<O: Owner> Send for Chain<O> {}
unsafe impl<O: Owner> Sync for Chain<O> {}

impl<O: Owner> Chain<O> {
    pub(crate) fn new() -> Self {
        let stub = Node::boxed(None);
        Self {
            head: AtomicPtr::new(stub),
            tail: AtomicPtr::new(stub),
        }
    }

    /// Append a command. Never blocks; safe from any thread.
    pub(crate) fn push(&self, cmd: Command<O>) {
        let node = Node::boxed(Some(cmd));
        let prev = self.tail.swap(node, Ordering::AcqRel);
        // Between the swap above and the store below the chain is split: the
        // consumer stops at `prev` until the link is published.
        unsafe {
            (*prev).next.store(node, Ordering::Release);
        }
    }

    /// Take the oldest fully published command, or `None` if the chain is
    /// empty or its head's successor is not yet linked.
    ///
    /// Must only be called by the dispatch thread (serialized by the core
    /// lock); concurrent `pop` calls would race on `head`.
    pub(crate) fn pop(&self) -> Option<Command<O>> {
        let head = self.head.load(Ordering::Relaxed);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        // The old stub is consumed; its successor becomes the new stub once
        // its command is moved out.
        self.head.store(next, Ordering::Relaxed);
        let cmd = unsafe { (*(*next).cmd.get()).take() };
        drop(unsafe { Box::from_raw(head) });

        debug_assert!(cmd.is_some(), "non-stub node must carry a command");
        cmd
    }
}

impl<O: Owner> Drop for Chain<O> {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;
    use crate::test_utils::TestOwner;
    use std::sync::Arc;

    fn cancel_ids(chain: &Chain<TestOwner>) -> Vec<i32> {
        let mut ids = Vec::new();
        while let Some(cmd) = chain.pop() {
            match cmd {
                Command::CancelById(id) => ids.push(id.as_i32()),
                other => panic!("unexpected command: {:?}", other),
            }
        }
        ids
    }

    #[test]
    fn test_empty_chain_pops_none() {
        let chain: Chain<TestOwner> = Chain::new();
        assert!(chain.pop().is_none());
        assert!(chain.pop().is_none());
    }

    #[test]
    fn test_fifo_single_producer() {
        let chain: Chain<TestOwner> = Chain::new();
        for id in 1..=5 {
            chain.push(Command::CancelById(TaskId(id)));
        }
        assert_eq!(cancel_ids(&chain), vec![1, 2, 3, 4, 5]);
        assert!(chain.pop().is_none());
    }

    #[test]
    fn test_interleaved_push_pop() {
        let chain: Chain<TestOwner> = Chain::new();
        chain.push(Command::CancelById(TaskId(1)));
        assert_eq!(cancel_ids(&chain), vec![1]);

        chain.push(Command::CancelById(TaskId(2)));
        chain.push(Command::CancelById(TaskId(3)));
        assert_eq!(cancel_ids(&chain), vec![2, 3]);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let chain: Arc<Chain<TestOwner>> = Arc::new(Chain::new());
        let producers = 8;
        let per_producer = 500;

        let threads: Vec<_> = (0..producers)
            .map(|p| {
                let chain = Arc::clone(&chain);
                std::thread::spawn(move || {
                    for i in 0..per_producer {
                        chain.push(Command::CancelById(TaskId(p * per_producer + i)));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let mut ids = cancel_ids(&chain);
        assert_eq!(ids.len(), (producers * per_producer) as usize);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), (producers * per_producer) as usize);
    }

    #[test]
    fn test_per_producer_order_is_preserved() {
        let chain: Arc<Chain<TestOwner>> = Arc::new(Chain::new());
        let a = {
            let chain = Arc::clone(&chain);
            std::thread::spawn(move || {
                for i in 0..200 {
                    chain.push(Command::CancelById(TaskId(i)));
                }
            })
        };
        let b = {
            let chain = Arc::clone(&chain);
            std::thread::spawn(move || {
                for i in 1000..1200 {
                    chain.push(Command::CancelById(TaskId(i)));
                }
            })
        };
        a.join().unwrap();
        b.join().unwrap();

        let ids = cancel_ids(&chain);
        let low: Vec<_> = ids.iter().copied().filter(|id| *id < 1000).collect();
        let high: Vec<_> = ids.iter().copied().filter(|id| *id >= 1000).collect();
        assert!(low.is_sorted());
        assert!(high.is_sorted());
    }

    #[test]
    fn test_drop_frees_unconsumed_nodes() {
        let chain: Chain<TestOwner> = Chain::new();
        for id in 0..16 {
            chain.push(Command::CancelById(TaskId(id)));
        }
        // Nodes (and their commands) are reclaimed by Drop; mostly meaningful
        // under sanitizers/Miri.
        drop(chain);
    }
}
