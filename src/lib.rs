//! Red-black trees for use as ordered maps, in two memory layouts.
//!
//! [`RbTree`] is the classic layout: every node carries a parent link, so
//! stepping to the in-order successor or predecessor needs no external state.
//!
//! [`CompactTree`] stores its nodes in an index-based arena and keeps no
//! parent links at all; the colour bit is packed into the left-child index
//! word, so a node costs exactly two `u32` words of linkage on top of its key
//! and value. Ancestor context is rebuilt on demand with an explicit path
//! stack, exposed through [`compact::Cursor`] for bidirectional traversal.
//!
//! Both layouts keep the same contract: logarithmic worst-case insertion,
//! lookup and removal, strictly increasing in-order key sequence, and no
//! duplicate keys (inserting an existing key hands the pair back untouched).

#![no_std]
#![deny(missing_docs)]

extern crate alloc;

pub mod compact;
pub mod map;

pub use compact::CompactTree;
pub use map::RbTree;

/// A direction for a node to be in, in a binary tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Get the opposite of a direction.
    pub(crate) fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// The colour of a tree node. Every node has a colour for balancing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Colour {
    Red,
    Black,
}
