//! The compact layout. Nodes live in an index-based arena and store no
//! parent link: just two `u32` child words, with the colour bit packed into
//! the low bit of the left-child word. Ancestor context is reconstructed on
//! demand by recording (ancestor, descent-direction) pairs on an explicit
//! path stack while walking down from the root.
//!
//! The arena hands slots out from an intrusive free list, so a removal
//! followed by an insertion reuses storage instead of growing the backing
//! vector. Indices are 31 bits wide; [`CompactTree`] therefore holds at most
//! 2³¹ − 1 entries, and a path of [`MAX_HEIGHT`] entries covers any tree the
//! arena can address.

use alloc::vec::Vec;
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt::Debug;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

use crate::{Colour, Direction};

/// The index denoting a missing child, the largest value a 31-bit child
/// field can hold.
const NIL: u32 = 0x7fff_ffff;

/// An upper bound on the depth of any tree the arena can address: a
/// red-black tree with n nodes is at most 2·log2(n + 1) deep, and n < 2³¹.
const MAX_HEIGHT: usize = 64;

/// A node of the compact layout. `lc` holds the left child index shifted up
/// by one with the colour in the low bit; `rc` holds the right child index
/// directly.
#[derive(Clone)]
struct Node<K: Ord, V> {
    key: K,
    val: V,
    lc: u32,
    rc: u32,
}

impl<K: Ord, V> Node<K, V> {
    fn child(&self, dir: Direction) -> u32 {
        match dir {
            Direction::Left => self.lc >> 1,
            Direction::Right => self.rc,
        }
    }

    fn set_child(&mut self, dir: Direction, child: u32) {
        match dir {
            Direction::Left => self.lc = (child << 1) | (self.lc & 1),
            Direction::Right => self.rc = child,
        }
    }

    fn colour(&self) -> Colour {
        match self.lc & 1 {
            0 => Colour::Red,
            _ => Colour::Black,
        }
    }

    fn set_colour(&mut self, colour: Colour) {
        match colour {
            Colour::Red => self.lc &= !1,
            Colour::Black => self.lc |= 1,
        }
    }
}

/// An arena slot: either a live node or a link in the free list.
#[derive(Clone)]
enum Slot<K: Ord, V> {
    Occupied(Node<K, V>),
    Vacant(u32),
}

/// One recorded descent step: the ancestor we stepped out of and the
/// direction we took.
#[derive(Clone, Copy)]
struct PathEntry {
    node: u32,
    dir: Direction,
}

/// The explicit ancestor stack substituting for stored parent pointers.
#[derive(Clone)]
struct Path {
    entries: [PathEntry; MAX_HEIGHT],
    len: usize,
}

impl Path {
    fn new() -> Self {
        Path {
            entries: [PathEntry {
                node: NIL,
                dir: Direction::Left,
            }; MAX_HEIGHT],
            len: 0,
        }
    }

    fn push(&mut self, node: u32, dir: Direction) {
        self.entries[self.len] = PathEntry { node, dir };
        self.len += 1;
    }

    fn pop(&mut self) -> Option<PathEntry> {
        self.len = self.len.checked_sub(1)?;
        Some(self.entries[self.len])
    }

    fn top(&self) -> Option<PathEntry> {
        self.len.checked_sub(1).map(|i| self.entries[i])
    }
}

/// A Red-Black tree storing its nodes in an index-based arena without parent
/// pointers. See the crate level documentation for how it compares to
/// [`crate::RbTree`].
#[derive(Clone)]
pub struct CompactTree<K: Ord, V> {
    slots: Vec<Slot<K, V>>,
    /// Index of the root node, or `NIL` for an empty tree.
    root: u32,
    /// Head of the intrusive free list threaded through vacant slots.
    free: u32,
    len: usize,
}

impl<K: Ord, V> CompactTree<K, V> {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty tree with room for `capacity` entries before the
    /// arena reallocates.
    pub fn with_capacity(capacity: usize) -> Self {
        CompactTree {
            slots: Vec::with_capacity(capacity),
            root: NIL,
            free: NIL,
            len: 0,
        }
    }

    /// Returns the amount of elements stored in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every entry, keeping the arena's capacity for reuse.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.root = NIL;
        self.free = NIL;
        self.len = 0;
    }

    fn node(&self, index: u32) -> &Node<K, V> {
        match &self.slots[index as usize] {
            Slot::Occupied(node) => node,
            // A live index never points at a vacant slot.
            Slot::Vacant(_) => unreachable!(),
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<K, V> {
        match &mut self.slots[index as usize] {
            Slot::Occupied(node) => node,
            Slot::Vacant(_) => unreachable!(),
        }
    }

    /// Place a fresh red leaf in the arena, reusing a vacant slot if any.
    fn alloc(&mut self, key: K, val: V) -> u32 {
        let node = Node {
            key,
            val,
            lc: NIL << 1,
            rc: NIL,
        };
        match self.free {
            NIL => {
                let index = self.slots.len();
                assert!(index < NIL as usize, "arena index space exhausted");
                self.slots.push(Slot::Occupied(node));
                index as u32
            }
            index => {
                match self.slots[index as usize] {
                    Slot::Vacant(next) => self.free = next,
                    Slot::Occupied(_) => unreachable!(),
                }
                self.slots[index as usize] = Slot::Occupied(node);
                index
            }
        }
    }

    /// Return a slot to the free list and hand back the node it held.
    fn dealloc(&mut self, index: u32) -> Node<K, V> {
        let slot = mem::replace(&mut self.slots[index as usize], Slot::Vacant(self.free));
        self.free = index;
        match slot {
            Slot::Occupied(node) => node,
            Slot::Vacant(_) => unreachable!(),
        }
    }

    /// Rotate the subtree under `node` in `dir`, promoting the child on the
    /// opposite side, and return the index of the new subtree root. The
    /// caller relinks the result; nothing above `node` is touched here.
    fn rotate(&mut self, node: u32, dir: Direction) -> u32 {
        let pivot = self.node(node).child(dir.opposite());
        let middle = self.node(pivot).child(dir);
        self.node_mut(node).set_child(dir.opposite(), middle);
        self.node_mut(pivot).set_child(dir, node);
        pivot
    }

    /// Descend looking for `key`, recording every step on `path`. Returns
    /// the index of the matching node or `NIL`; on a miss the path describes
    /// the would-be insertion point.
    fn find_with_path<Q>(&self, key: &Q, path: &mut Path) -> u32
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root;
        while cur != NIL {
            let node = self.node(cur);
            let dir = match key.cmp(node.key.borrow()) {
                Ordering::Less => Direction::Left,
                Ordering::Equal => break,
                Ordering::Greater => Direction::Right,
            };
            path.push(cur, dir);
            cur = node.child(dir);
        }
        cur
    }

    /// Get a value if it exists.
    ///
    /// ```rust
    /// # use redblack::CompactTree;
    ///
    /// let mut map = CompactTree::default();
    ///
    /// map.insert(4, 6).unwrap();
    /// map.insert(5, 7).unwrap();
    ///
    /// assert!(map.get(&4) == Some(&6));
    /// assert!(map.get(&5) == Some(&7));
    /// assert!(map.get(&6) == None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root;
        while cur != NIL {
            let node = self.node(cur);
            match key.cmp(node.key.borrow()) {
                Ordering::Less => cur = node.child(Direction::Left),
                Ordering::Equal => return Some(&node.val),
                Ordering::Greater => cur = node.child(Direction::Right),
            }
        }
        None
    }

    /// Get a mutable reference to a value if it exists.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut path = Path::new();
        match self.find_with_path(key, &mut path) {
            NIL => None,
            index => Some(&mut self.node_mut(index).val),
        }
    }

    /// Returns whether a key is present in the map.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Insert a key value pair into the map.
    ///
    /// If an equal key is already present the tree is left untouched and the
    /// rejected pair is handed back, so the caller keeps ownership of it and
    /// can still observe the original entry through [`CompactTree::get`].
    ///
    /// ```rust
    /// # use redblack::CompactTree;
    ///
    /// let mut map = CompactTree::default();
    ///
    /// assert!(map.insert(4, 6).is_ok());
    /// assert!(map.insert(4, 8) == Err((4, 8)));
    /// assert!(map.get(&4) == Some(&6));
    /// ```
    pub fn insert(&mut self, key: K, val: V) -> Result<(), (K, V)> {
        let mut path = Path::new();
        let mut cur = self.root;
        while cur != NIL {
            let node = self.node(cur);
            let dir = match key.cmp(&node.key) {
                Ordering::Less => Direction::Left,
                Ordering::Equal => return Err((key, val)),
                Ordering::Greater => Direction::Right,
            };
            path.push(cur, dir);
            cur = node.child(dir);
        }

        let index = self.alloc(key, val);
        match path.top() {
            Some(PathEntry { node, dir }) => self.node_mut(node).set_child(dir, index),
            None => self.root = index,
        }
        self.len += 1;
        self.insert_fixup(&mut path);
        Ok(())
    }

    /// Restore the red-black invariants after attaching a red leaf below the
    /// ancestor chain described by `path`. Entering each iteration the only
    /// possible violation is a red node directly under the red parent on top
    /// of the path.
    fn insert_fixup(&mut self, path: &mut Path) {
        while let Some(PathEntry {
            node: parent,
            dir: pdir,
        }) = path.top()
        {
            if self.node(parent).colour() == Colour::Black {
                break;
            }
            // A red parent is never the root, so its own path entry exists
            // below the top.
            let PathEntry { node: gparent, dir } = path.entries[path.len - 2];
            let uncle = self.node(gparent).child(dir.opposite());
            if uncle != NIL && self.node(uncle).colour() == Colour::Red {
                // Case 1: the uncle is red (noting that NIL nodes are
                // black). Recolour the parent and uncle black and the
                // grandparent red, then continue from the grandparent by
                // dropping two path entries.
                self.node_mut(parent).set_colour(Colour::Black);
                self.node_mut(uncle).set_colour(Colour::Black);
                self.node_mut(gparent).set_colour(Colour::Red);
                path.len -= 2;
            } else {
                let mut parent = parent;
                if pdir != dir {
                    // Case 2: the uncle is black and the grandparent, parent
                    // and node form a zig-zag. Rotate the parent so the
                    // three line up; the old node is now the one on top.
                    parent = self.rotate(parent, dir);
                    self.node_mut(gparent).set_child(dir, parent);
                }
                // Case 3: the uncle is black and the path from the
                // grandparent is straight. Swap the colours of parent and
                // grandparent, rotate the grandparent away and hang the
                // result off the great-grandparent (or the root); the
                // subtree root is black again so the loop is done.
                self.node_mut(parent).set_colour(Colour::Black);
                self.node_mut(gparent).set_colour(Colour::Red);
                let top = self.rotate(gparent, dir.opposite());
                if path.len >= 3 {
                    let PathEntry {
                        node: ggparent,
                        dir: ggdir,
                    } = path.entries[path.len - 3];
                    self.node_mut(ggparent).set_child(ggdir, top);
                } else {
                    self.root = top;
                }
                break;
            }
        }
        // Finally we correct the root node to be black.
        let root = self.root;
        self.node_mut(root).set_colour(Colour::Black);
    }

    /// Remove a key from the map, returning the stored pair (if it exists).
    ///
    /// ```rust
    /// # use redblack::CompactTree;
    ///
    /// let mut map = CompactTree::default();
    ///
    /// map.insert(4, 6).unwrap();
    /// assert!(map.remove(&4) == Some((4, 6)));
    /// assert!(map.remove(&4) == None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut path = Path::new();
        let node = self.find_with_path(key, &mut path);
        if node == NIL {
            return None;
        }
        let node = self.remove_at(node, path);
        Some((node.key, node.val))
    }

    /// Unlink the node at `node` (whose ancestor chain is described by
    /// `path`), rebalance, and hand the node back. Any other path recorded
    /// before this call is stale afterwards.
    fn remove_at(&mut self, node: u32, mut path: Path) -> Node<K, V> {
        // Entries below this depth lead from the root to the node's parent.
        let parent_depth = path.len;
        // The colour of the node physically removed from its position: the
        // node itself, or its in-order successor in the two-children case.
        let mut deleted_colour = self.node(node).colour();
        let node_lc = self.node(node).lc;
        let node_rc = self.node(node).rc;
        let transplanter;
        let replacement;

        if self.node(node).child(Direction::Left) == NIL {
            // At most one right child, which replaces the node directly.
            transplanter = self.node(node).child(Direction::Right);
            replacement = transplanter;
        } else if self.node(node).child(Direction::Right) == NIL {
            transplanter = self.node(node).child(Direction::Left);
            replacement = transplanter;
        } else {
            // Two children: walk to the in-order successor (the leftmost
            // node of the right subtree), recording the walk on the path.
            // The entry pushed for the node itself is patched to the
            // successor below, since the successor takes the node's
            // position in the tree and in the ancestor chain alike.
            let node_entry = path.len;
            path.push(node, Direction::Right);
            let mut successor = self.node(node).child(Direction::Right);
            loop {
                let left = self.node(successor).child(Direction::Left);
                if left == NIL {
                    break;
                }
                path.push(successor, Direction::Left);
                successor = left;
            }
            deleted_colour = self.node(successor).colour();
            let child = self.node(successor).child(Direction::Right);
            replacement = child;

            // The top of the path is now the successor's parent.
            let PathEntry {
                node: sparent,
                dir: sdir,
            } = path.entries[path.len - 1];
            if sparent != node {
                self.node_mut(sparent).set_child(sdir, child);
                // The successor adopts the node's right subtree.
                self.node_mut(successor).rc = node_rc;
            }
            // The successor adopts the node's left subtree and its colour in
            // a single word copy.
            self.node_mut(successor).lc = node_lc;
            path.entries[node_entry].node = successor;
            transplanter = successor;
        }

        if parent_depth > 0 {
            let PathEntry {
                node: nparent,
                dir: ndir,
            } = path.entries[parent_depth - 1];
            self.node_mut(nparent).set_child(ndir, transplanter);
        } else {
            self.root = transplanter;
        }
        self.len -= 1;
        let removed = self.dealloc(node);

        if deleted_colour == Colour::Black {
            self.remove_fixup(replacement, &mut path);
        }
        removed
    }

    /// Resolve the "double-black" deficit left at `node` (possibly `NIL`)
    /// after a black node was physically removed there; the top of `path`
    /// names the parent of the vacated position.
    fn remove_fixup(&mut self, mut node: u32, path: &mut Path) {
        while (node == NIL || self.node(node).colour() == Colour::Black) && node != self.root {
            let Some(PathEntry { node: parent, dir }) = path.top() else {
                break;
            };
            // The deficient side is one black node short, so the sibling
            // subtree cannot be empty.
            let mut sibling = self.node(parent).child(dir.opposite());
            if self.node(sibling).colour() == Colour::Red {
                // Case 1: the sibling is red. Rotate it above the parent,
                // swapping their colours, and splice it into the path where
                // the parent used to be; the new sibling is one of its old
                // children and is black.
                self.node_mut(sibling).set_colour(Colour::Black);
                self.node_mut(parent).set_colour(Colour::Red);
                let top = self.rotate(parent, dir);
                if path.len >= 2 {
                    let PathEntry {
                        node: gparent,
                        dir: gdir,
                    } = path.entries[path.len - 2];
                    self.node_mut(gparent).set_child(gdir, top);
                } else {
                    self.root = top;
                }
                path.entries[path.len] = path.entries[path.len - 1];
                path.entries[path.len - 1] = PathEntry { node: top, dir };
                path.len += 1;
                sibling = self.node(parent).child(dir.opposite());
            }

            // From this point the sibling is black.
            let mut far = self.node(sibling).child(dir.opposite());
            if far == NIL || self.node(far).colour() == Colour::Black {
                let near = self.node(sibling).child(dir);
                if near == NIL || self.node(near).colour() == Colour::Black {
                    // Case 2: both of the sibling's children are black.
                    // Recolouring the sibling red evens out the two sides
                    // under the parent, moving the deficit up to it.
                    self.node_mut(sibling).set_colour(Colour::Red);
                    node = parent;
                    path.len -= 1;
                    continue;
                }
                // Case 3: the near child is red and the far child is black.
                // Rotate the sibling away from the deficit so the red ends
                // up on the far side (the old sibling), then fall through to
                // case 4.
                self.node_mut(near).set_colour(Colour::Black);
                self.node_mut(sibling).set_colour(Colour::Red);
                far = sibling;
                let top = self.rotate(sibling, dir.opposite());
                self.node_mut(parent).set_child(dir.opposite(), top);
                sibling = top;
            }

            // Case 4: the sibling's far child is red. Rotating the parent
            // toward the deficit adds a black node to the deficient side
            // without changing the count on the other side, which settles
            // the deficit for good.
            let parent_colour = self.node(parent).colour();
            self.node_mut(sibling).set_colour(parent_colour);
            self.node_mut(parent).set_colour(Colour::Black);
            self.node_mut(far).set_colour(Colour::Black);
            let top = self.rotate(parent, dir);
            if path.len >= 2 {
                let PathEntry {
                    node: gparent,
                    dir: gdir,
                } = path.entries[path.len - 2];
                self.node_mut(gparent).set_child(gdir, top);
            } else {
                self.root = top;
            }
            node = self.root;
            break;
        }
        if node != NIL {
            self.node_mut(node).set_colour(Colour::Black);
        }
    }

    /// Walk from `cur` to its in-order neighbour in `dir`, maintaining
    /// `path` as the recorded ancestor chain of the returned node. Shared by
    /// the cursor and the iterators.
    fn step_from(&self, cur: u32, path: &mut Path, dir: Direction) -> u32 {
        if cur == NIL {
            return NIL;
        }
        let child = self.node(cur).child(dir);
        if child != NIL {
            // The neighbour is the opposite-most descendant of the child on
            // the traversal side.
            path.push(cur, dir);
            let mut next = child;
            loop {
                let beyond = self.node(next).child(dir.opposite());
                if beyond == NIL {
                    break;
                }
                path.push(next, dir.opposite());
                next = beyond;
            }
            next
        } else {
            // Climb until we find an ancestor we entered by stepping away
            // from the traversal direction; running out of ancestors is the
            // end of the sequence.
            loop {
                match path.pop() {
                    None => return NIL,
                    Some(PathEntry { node, dir: d }) if d == dir.opposite() => return node,
                    Some(_) => {}
                }
            }
        }
    }

    fn extreme_with_path(&self, dir: Direction) -> (u32, Path) {
        let mut path = Path::new();
        let mut cur = self.root;
        if cur != NIL {
            loop {
                let next = self.node(cur).child(dir);
                if next == NIL {
                    break;
                }
                path.push(cur, dir);
                cur = next;
            }
        }
        (cur, path)
    }

    /// The entry with the smallest key, or `None` for an empty tree.
    pub fn first(&self) -> Option<(&K, &V)> {
        let (cur, _) = self.extreme_with_path(Direction::Left);
        match cur {
            NIL => None,
            index => {
                let node = self.node(index);
                Some((&node.key, &node.val))
            }
        }
    }

    /// The entry with the largest key, or `None` for an empty tree.
    pub fn last(&self) -> Option<(&K, &V)> {
        let (cur, _) = self.extreme_with_path(Direction::Right);
        match cur {
            NIL => None,
            index => {
                let node = self.node(index);
                Some((&node.key, &node.val))
            }
        }
    }

    /// A cursor positioned at the smallest entry (or nowhere, for an empty
    /// tree).
    pub fn cursor_first(&self) -> Cursor<'_, K, V> {
        let (cur, path) = self.extreme_with_path(Direction::Left);
        Cursor {
            tree: self,
            path,
            cur,
        }
    }

    /// A cursor positioned at the largest entry (or nowhere, for an empty
    /// tree).
    pub fn cursor_last(&self) -> Cursor<'_, K, V> {
        let (cur, path) = self.extreme_with_path(Direction::Right);
        Cursor {
            tree: self,
            path,
            cur,
        }
    }

    /// A cursor positioned at `key`, or positioned nowhere if the key is
    /// absent.
    pub fn cursor<Q>(&self, key: &Q) -> Cursor<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut path = Path::new();
        match self.find_with_path(key, &mut path) {
            NIL => Cursor {
                tree: self,
                path: Path::new(),
                cur: NIL,
            },
            index => Cursor {
                tree: self,
                path,
                cur: index,
            },
        }
    }

    /// Return a borrowing iterator over the key value pairs in the tree, in
    /// increasing key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cursor: self.cursor_first(),
            remaining: self.len,
        }
    }

    /// Return an in-order iterator over pairs of keys and mutable references
    /// to values in the tree.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let (cur, path) = self.extreme_with_path(Direction::Left);
        IterMut {
            slots: NonNull::new(self.slots.as_mut_ptr()).unwrap_or(NonNull::dangling()),
            path,
            cur,
            remaining: self.len,
            _lifetime: PhantomData,
        }
    }

    // Validates the red-black invariants and returns the black height.
    // Test support, not part of the public contract.
    #[doc(hidden)]
    pub fn black_height(&self) -> usize {
        match self.root {
            NIL => 0,
            root => {
                assert!(self.node(root).colour() == Colour::Black, "red root");
                self.black_height_at(root)
            }
        }
    }

    fn black_height_at(&self, index: u32) -> usize {
        let node = self.node(index);
        let colour = node.colour();
        let mut heights = [0; 2];
        for (i, dir) in [Direction::Left, Direction::Right].into_iter().enumerate() {
            let child = node.child(dir);
            if child != NIL {
                assert!(
                    colour == Colour::Black || self.node(child).colour() == Colour::Black,
                    "red node with red child"
                );
                heights[i] = self.black_height_at(child);
            }
        }
        assert_eq!(heights[0], heights[1], "unequal black heights");
        heights[0] + usize::from(colour == Colour::Black)
    }
}

impl<K: Ord, V> Default for CompactTree<K, V> {
    fn default() -> Self {
        CompactTree {
            slots: Vec::new(),
            root: NIL,
            free: NIL,
            len: 0,
        }
    }
}

impl<K: Ord + Debug, V: Debug> Debug for CompactTree<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self).finish()
    }
}

impl<K: Ord + PartialEq, V: PartialEq> PartialEq for CompactTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other)
    }
}

impl<K: Ord + Eq, V: Eq> Eq for CompactTree<K, V> {}

impl<K: Ord, V: PartialOrd> PartialOrd for CompactTree<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other)
    }
}

impl<K: Ord, V: Ord> Ord for CompactTree<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other)
    }
}

impl<K: Ord + Hash, V: Hash> Hash for CompactTree<K, V> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (k, v) in self {
            (k, v).hash(state);
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for CompactTree<K, V> {
    /// Collect an iterator into a tree. When the iterator yields a key more
    /// than once, the first occurrence is kept.
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tree = CompactTree::default();
        for (k, v) in iter {
            let _ = tree.insert(k, v);
        }
        tree
    }
}

impl<K: Ord, V> Extend<(K, V)> for CompactTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            let _ = self.insert(k, v);
        }
    }
}

impl<'a, K: Ord + Copy, V: Copy> Extend<(&'a K, &'a V)> for CompactTree<K, V> {
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        for (&k, &v) in iter {
            let _ = self.insert(k, v);
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a CompactTree<K, V> {
    type Item = (&'a K, &'a V);

    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord, V> IntoIterator for CompactTree<K, V> {
    type Item = (K, V);

    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            cur: self.root,
            stack: Path::new(),
            remaining: self.len,
            slots: self.slots,
        }
    }
}

/// A position inside a [`CompactTree`], owning the path stack that stands in
/// for parent pointers.
///
/// A cursor borrows the tree, so the tree cannot be mutated while any cursor
/// is alive; a removal can therefore never invalidate a live path. Re-acquire
/// a cursor after mutating. A cursor that has moved past either end stays
/// exhausted.
pub struct Cursor<'a, K: Ord, V> {
    tree: &'a CompactTree<K, V>,
    path: Path,
    cur: u32,
}

impl<'a, K: Ord, V> Cursor<'a, K, V> {
    /// The entry under the cursor, or `None` if the cursor is exhausted.
    pub fn entry(&self) -> Option<(&'a K, &'a V)> {
        match self.cur {
            NIL => None,
            index => {
                let node = self.tree.node(index);
                Some((&node.key, &node.val))
            }
        }
    }

    /// The key under the cursor, or `None` if the cursor is exhausted.
    pub fn key(&self) -> Option<&'a K> {
        self.entry().map(|(k, _)| k)
    }

    /// The value under the cursor, or `None` if the cursor is exhausted.
    pub fn value(&self) -> Option<&'a V> {
        self.entry().map(|(_, v)| v)
    }

    /// Advance to the in-order successor.
    pub fn move_next(&mut self) {
        self.cur = self.tree.step_from(self.cur, &mut self.path, Direction::Right);
    }

    /// Step back to the in-order predecessor.
    pub fn move_prev(&mut self) {
        self.cur = self.tree.step_from(self.cur, &mut self.path, Direction::Left);
    }
}

/// A borrowing in-order iterator over the elements of a [`CompactTree`].
pub struct Iter<'a, K: Ord, V> {
    cursor: Cursor<'a, K, V>,
    remaining: usize,
}

impl<'a, K: Ord + 'a, V: 'a> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.entry()?;
        self.cursor.move_next();
        self.remaining -= 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K: Ord + 'a, V: 'a> ExactSizeIterator for Iter<'a, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<'a, K: Ord + 'a, V: 'a> FusedIterator for Iter<'a, K, V> {}

/// Resolve `index` inside the raw slot buffer. Splitting this off from the
/// tree lets the mutable iterator keep handing out `&mut V` items while it
/// walks.
///
/// ## Safety
/// - `slots` must point at a live slot buffer containing `index`, and the
///   caller must not create aliasing mutable references to the same node.
unsafe fn raw_node<'a, K: Ord, V>(slots: NonNull<Slot<K, V>>, index: u32) -> &'a mut Node<K, V> {
    match &mut *slots.as_ptr().add(index as usize) {
        Slot::Occupied(node) => node,
        Slot::Vacant(_) => unreachable!(),
    }
}

/// An in-order iterator over mutable references of the elements of a
/// [`CompactTree`].
pub struct IterMut<'a, K: Ord, V> {
    slots: NonNull<Slot<K, V>>,
    path: Path,
    cur: u32,
    remaining: usize,
    _lifetime: PhantomData<&'a mut V>,
}

impl<'a, K: Ord + 'a, V: 'a> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == NIL {
            return None;
        }
        let index = self.cur;

        // Advance to the successor before yielding, mirroring the borrowing
        // cursor's stepping rule.
        unsafe {
            let right = raw_node::<K, V>(self.slots, index).child(Direction::Right);
            if right != NIL {
                self.path.push(index, Direction::Right);
                let mut next = right;
                loop {
                    let left = raw_node::<K, V>(self.slots, next).child(Direction::Left);
                    if left == NIL {
                        break;
                    }
                    self.path.push(next, Direction::Left);
                    next = left;
                }
                self.cur = next;
            } else {
                loop {
                    match self.path.pop() {
                        None => {
                            self.cur = NIL;
                            break;
                        }
                        Some(PathEntry { node, dir }) if dir == Direction::Left => {
                            self.cur = node;
                            break;
                        }
                        Some(_) => {}
                    }
                }
            }
            self.remaining -= 1;

            let node = raw_node::<K, V>(self.slots, index);
            Some((&node.key, &mut node.val))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K: Ord + 'a, V: 'a> ExactSizeIterator for IterMut<'a, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<'a, K: Ord + 'a, V: 'a> FusedIterator for IterMut<'a, K, V> {}

/// An owning in-order iterator over the elements in a [`CompactTree`].
pub struct IntoIter<K: Ord, V> {
    slots: Vec<Slot<K, V>>,
    /// The left spine of nodes still to be yielded; only the node halves of
    /// the entries are meaningful here.
    stack: Path,
    /// The next subtree to descend into.
    cur: u32,
    remaining: usize,
}

impl<K: Ord, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cur != NIL {
            let left = match &self.slots[self.cur as usize] {
                Slot::Occupied(node) => node.child(Direction::Left),
                Slot::Vacant(_) => unreachable!(),
            };
            self.stack.push(self.cur, Direction::Left);
            self.cur = left;
        }
        let index = self.stack.pop()?.node;

        // In-order traversal never revisits a popped node, so its slot can
        // be vacated as it is yielded; the vector cleans up the rest.
        let slot = mem::replace(&mut self.slots[index as usize], Slot::Vacant(NIL));
        let node = match slot {
            Slot::Occupied(node) => node,
            Slot::Vacant(_) => unreachable!(),
        };
        self.cur = node.child(Direction::Right);
        self.remaining -= 1;

        Some((node.key, node.val))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Ord, V> ExactSizeIterator for IntoIter<K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K: Ord, V> FusedIterator for IntoIter<K, V> {}

#[cfg(test)]
mod test {
    use crate::CompactTree;
    use alloc::vec::Vec;

    #[test]
    fn test_ops() {
        let mut tree = CompactTree::default();

        const COUNT: usize = 10000;

        for key in 0..COUNT {
            assert!(tree.insert(key, key).is_ok());
            if key % 64 == 0 {
                tree.black_height();
            }
        }
        for key in 0..COUNT {
            assert!(tree.insert(key, key) == Err((key, key)));
        }
        assert!(tree.len() == COUNT);
        for key in 0..COUNT {
            assert!(tree.get(&key) == Some(&key));
        }
        for key in 0..COUNT {
            assert!(tree.remove(&key) == Some((key, key)));
            if key % 64 == 0 {
                tree.black_height();
            }
        }
        for key in 0..COUNT {
            assert!(tree.get(&key) == None);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_insert_balance() {
        // Black heights observed while inserting a sequence that exercises
        // all three insertion fixup cases on both sides.
        let keys = [8, 7, 2, 4, 1, 3, 6, 5];
        let expected_heights = [1, 1, 1, 2, 2, 2, 2, 2];

        let mut tree = CompactTree::default();
        for (key, expected) in keys.into_iter().zip(expected_heights) {
            tree.insert(key, ()).unwrap();
            assert_eq!(tree.black_height(), expected);
        }
        let inorder: Vec<i32> = tree.iter().map(|(&k, _)| k).collect();
        assert_eq!(inorder, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_remove_rebalance() {
        let mut tree = CompactTree::default();
        for key in [3, 1, 4, 2] {
            tree.insert(key, ()).unwrap();
        }
        assert_eq!(tree.black_height(), 2);

        assert!(tree.remove(&4).is_some());
        assert_eq!(tree.black_height(), 2);
        let inorder: Vec<i32> = tree.iter().map(|(&k, _)| k).collect();
        assert_eq!(inorder, [1, 2, 3]);
    }

    #[test]
    fn test_duplicate_and_absent() {
        let mut tree = CompactTree::new();
        tree.insert(1, "a").unwrap();
        tree.insert(2, "b").unwrap();

        // A colliding insert hands the pair back and keeps the old entry.
        assert_eq!(tree.insert(2, "c"), Err((2, "c")));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(&2), Some(&"b"));

        // Removing an absent key is a no-op.
        assert_eq!(tree.remove(&3), None);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.black_height(), 1);
    }

    #[test]
    fn test_slot_reuse() {
        let mut tree = CompactTree::with_capacity(8);
        for key in 0..8 {
            tree.insert(key, ()).unwrap();
        }
        for key in [1, 3, 5, 7] {
            assert!(tree.remove(&key).is_some());
        }
        for key in 8..12 {
            tree.insert(key, ()).unwrap();
        }

        // The freed slots were recycled before the arena grew.
        assert_eq!(tree.slots.len(), 8);
        assert_eq!(tree.len(), 8);
        tree.black_height();
        let inorder: Vec<i32> = tree.iter().map(|(&k, _)| k).collect();
        assert_eq!(inorder, [0, 2, 4, 6, 8, 9, 10, 11]);
    }

    #[test]
    fn test_cursor() {
        let tree: CompactTree<_, _> = [5, 1, 9, 3, 7].map(|k| (k, k * 10)).into_iter().collect();

        let mut cursor = tree.cursor_first();
        let mut forward = Vec::new();
        while let Some(&key) = cursor.key() {
            forward.push(key);
            cursor.move_next();
        }
        assert_eq!(forward, [1, 3, 5, 7, 9]);
        // Once exhausted a cursor stays exhausted.
        cursor.move_prev();
        assert_eq!(cursor.key(), None);

        let mut cursor = tree.cursor_last();
        let mut backward = Vec::new();
        while let Some(&key) = cursor.key() {
            backward.push(key);
            cursor.move_prev();
        }
        assert_eq!(backward, [9, 7, 5, 3, 1]);

        let mut cursor = tree.cursor(&5);
        assert_eq!(cursor.entry(), Some((&5, &50)));
        cursor.move_prev();
        assert_eq!(cursor.key(), Some(&3));
        cursor.move_next();
        assert_eq!(cursor.key(), Some(&5));

        let cursor = tree.cursor(&4);
        assert_eq!(cursor.entry(), None);
    }

    #[test]
    fn test_iter() {
        let mut tree = CompactTree::default();

        const COUNT: usize = 100;

        for key in (0..COUNT).rev() {
            tree.insert(key, key).unwrap();
        }

        let forward: Vec<usize> = tree.iter().map(|(&k, _)| k).collect();
        assert!(forward.iter().copied().eq(0..COUNT));

        assert_eq!(tree.first(), Some((&0, &0)));
        assert_eq!(tree.last(), Some((&(COUNT - 1), &(COUNT - 1))));

        for (key, val) in tree.iter_mut() {
            assert_eq!(key, val);
            *val += 1;
        }

        let mut expected = 0;
        for (key, val) in tree {
            assert_eq!(key, expected);
            assert_eq!(key + 1, val);
            expected += 1;
        }
    }

    #[test]
    fn test_traits() {
        let mut tree = CompactTree::from_iter((0..100).map(|x| (x, x)));

        let mut tree2 = CompactTree::new();
        for x in 0..100 {
            tree2.insert(x, x).unwrap();
        }
        assert_eq!(tree, tree2);

        tree.extend(tree2.into_iter().map(|(k, v)| (k + 100, v)));
        for x in 100..200 {
            assert!(tree.get(&x) == Some(&(x - 100)));
        }

        let tree2 = tree.clone();
        assert_eq!(tree, tree2);

        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.first(), None);
    }
}
