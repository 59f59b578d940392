//! Cursor over the kernel's circular intrusive lists.
//!
//! A `list_head` embeds `next`/`prev` pointers inside the element it
//! threads; iteration starts just past the head node and yields element
//! addresses (node address minus the link field's offset) until the walk
//! returns to the head.

use crate::error::{Error, Result};
use crate::image::ReadImage;

/// Upper bound on nodes followed before a list is declared corrupt.
const MAX_LIST_NODES: usize = 1 << 20;

/// Iterate a circular list rooted at `head`, yielding the address of each
/// element whose link field lives at `link_offset` bytes into it.
///
/// The cursor is lazy and restartable: build a new one to walk again.
pub fn list_entries<R: ReadImage>(image: &R, head: u64, link_offset: u64) -> ListCursor<'_, R> {
    ListCursor {
        image,
        head,
        link_offset,
        node: head,
        steps: 0,
        fused: false,
    }
}

pub struct ListCursor<'a, R: ReadImage> {
    image: &'a R,
    head: u64,
    link_offset: u64,
    node: u64,
    steps: usize,
    fused: bool,
}

impl<R: ReadImage> Iterator for ListCursor<'_, R> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        // list_head.next is the first field of the node.
        let next = match self.image.read_u64(self.node) {
            Ok(next) => next,
            Err(e) => {
                self.fused = true;
                return Some(Err(e));
            }
        };
        if next == self.head {
            self.fused = true;
            return None;
        }
        self.steps += 1;
        if next == 0 || self.steps > MAX_LIST_NODES {
            self.fused = true;
            return Some(Err(Error::CorruptList { head: self.head }));
        }
        self.node = next;
        Some(Ok(next.wrapping_sub(self.link_offset)))
    }
}
