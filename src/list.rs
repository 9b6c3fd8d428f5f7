use std::{marker::PhantomData, ptr::NonNull};

use crate::block::{Block, Link};

/// Doubly linked list of every block carved out of the arena.
///
/// The list is intrusive: links live inside the [`Block`] headers, so the
/// list itself never allocates. Blocks are only ever appended at the break
/// or inserted right after the block they were split from, which keeps the
/// list sorted by address without ever comparing addresses.
///
/// ```text
///  head (global_base)                                  tail (last)
///        |                                                  |
///  +-----v-----+    +-----------+    +-----------+    +-----v-----+
///  | Allocated | <> |   Free    | <> | Allocated | <> |   Free    | -> program break
///  +-----------+    +-----------+    +-----------+    +-----------+
/// ```
///
/// [`Status::Mapped`](crate::block::Status::Mapped) blocks are never linked here.
pub(crate) struct BlockList {
    head: Link,
    tail: Link,
    len: usize,
}

pub(crate) struct Iter<'a> {
    current: Link,
    marker: PhantomData<&'a Block>,
}

// The list owns its blocks exclusively, nothing else points into them.
unsafe impl Send for BlockList {}

impl BlockList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Link {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `block` after the current tail.
    ///
    /// **SAFETY**: `block` must be a valid, unlinked header placed above every
    /// block already in the list.
    pub unsafe fn append(&mut self, mut block: NonNull<Block>) {
        unsafe {
            block.as_mut().prev = self.tail;
            block.as_mut().next = None;

            if let Some(mut tail) = self.tail {
                tail.as_mut().next = Some(block);
            } else {
                self.head = Some(block);
            }
        }

        self.tail = Some(block);
        self.len += 1;
    }

    /// Links `block` right after `anchor`, moving the tail if needed.
    ///
    /// **SAFETY**: `anchor` must be linked in this list and `block` must be a
    /// valid, unlinked header placed between `anchor` and its successor.
    pub unsafe fn insert_after(&mut self, mut anchor: NonNull<Block>, mut block: NonNull<Block>) {
        unsafe {
            let next = anchor.as_ref().next;

            block.as_mut().prev = Some(anchor);
            block.as_mut().next = next;
            anchor.as_mut().next = Some(block);

            match next {
                Some(mut next) => next.as_mut().prev = Some(block),
                None => self.tail = Some(block),
            }
        }

        self.len += 1;
    }

    /// Unlinks `node` from the list. Its header is left untouched otherwise.
    ///
    /// **SAFETY**: `node` must be linked in this list.
    pub unsafe fn remove(&mut self, node: NonNull<Block>) {
        unsafe {
            let prev = node.as_ref().prev;
            let next = node.as_ref().next;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => self.tail = prev,
            }
        }

        self.len -= 1;
    }

    /// Iterates over the headers in address order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = NonNull<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }

        Some(node)
    }
}

impl<'a> IntoIterator for &'a BlockList {
    type Item = NonNull<Block>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
