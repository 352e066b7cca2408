//! The parent-pointer layout. Every node carries a link back to its parent,
//! so the fixup loops and the iterators walk the ancestor chain directly.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt::Debug;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

use crate::{Colour, Direction};

/// A Red-Black tree for use as an ordered map. See the crate level
/// documentation for more info.
pub struct RbTree<K: Ord, V> {
    /// The root node of the tree.
    root: Option<NonNull<RbNode<K, V>>>,
    /// The amount of nodes in the tree.
    len: usize,
}

impl<K: Ord, V> RbTree<K, V> {
    /// Rotate a subtree of the tree in a direction, promoting the child on
    /// the opposite side of `dir` into `node`'s position. The in-order
    /// sequence of the subtree is unchanged.
    ///
    /// ## Safety
    /// - All pointers must be either valid or null
    /// - The child in the opposite direction of dir of node must be non null.
    unsafe fn rotate(&mut self, node: NonNull<RbNode<K, V>>, dir: Direction) {
        let parent = (*node.as_ptr()).parent;
        let pivot = (&(*node.as_ptr()))[dir.opposite()];
        debug_assert!(pivot.is_some());
        let pivot = pivot.unwrap_unchecked();
        let middle = (&(*pivot.as_ptr()))[dir];

        (&mut (*node.as_ptr()))[dir.opposite()] = middle;
        if let Some(middle) = middle {
            (*middle.as_ptr()).parent = Some(node);
        }
        (&mut (*pivot.as_ptr()))[dir] = Some(node);
        (*node.as_ptr()).parent = Some(pivot);
        (*pivot.as_ptr()).parent = parent;
        match parent {
            Some(parent) => {
                let parent_dir = match (&(*parent.as_ptr()))[Direction::Left] == Some(node) {
                    true => Direction::Left,
                    false => Direction::Right,
                };
                (&mut (*parent.as_ptr()))[parent_dir] = Some(pivot);
            }
            None => self.root = Some(pivot),
        }
    }

    /// Replace a node in the tree with a new node. The caller is responsible
    /// for freeing all memory after this operation.
    ///
    /// ## Safety
    /// - All pointers must be either valid or null
    unsafe fn transplant(
        &mut self,
        point: NonNull<RbNode<K, V>>,
        new: Option<NonNull<RbNode<K, V>>>,
    ) {
        match (*point.as_ptr()).parent {
            None => {
                self.root = new;
            }
            Some(parent) => {
                if Some(point) == (&(*parent.as_ptr()))[Direction::Left] {
                    (&mut (*parent.as_ptr()))[Direction::Left] = new;
                } else {
                    (&mut (*parent.as_ptr()))[Direction::Right] = new;
                }
            }
        }
        if let Some(new) = new {
            (*new.as_ptr()).parent = (*point.as_ptr()).parent;
        }
    }

    /// Find the node holding `key`, if any.
    fn find_node<Q>(&self, key: &Q) -> Option<NonNull<RbNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root;

        // SAFETY: all pointers should be kept valid in this data structure.
        while let Some(node) = cur {
            let (node_key, left, right) = unsafe {
                (
                    (*node.as_ptr()).key.borrow(),
                    (*node.as_ptr()).child[0],
                    (*node.as_ptr()).child[1],
                )
            };
            match key.cmp(node_key) {
                Ordering::Less => cur = left,
                Ordering::Equal => break,
                Ordering::Greater => cur = right,
            }
        }
        cur
    }

    /// Get a value if it exists.
    ///
    /// ```rust
    /// # use redblack::RbTree;
    ///
    /// let mut map = RbTree::default();
    ///
    /// map.insert(4, 6).unwrap();
    /// map.insert(5, 7).unwrap();
    /// map.insert(6, 8).unwrap();
    ///
    /// assert!(map.get(&4) == Some(&6));
    /// assert!(map.get(&5) == Some(&7));
    /// assert!(map.get(&6) == Some(&8));
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).map(|n| unsafe { &(*n.as_ptr()).val })
    }

    /// Get a mutable reference to a value if it exists.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key)
            .map(|n| unsafe { &mut (*n.as_ptr()).val })
    }

    /// Returns whether a key is present in the map.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).is_some()
    }

    /// Insert a key value pair into the map.
    ///
    /// If an equal key is already present the tree is left untouched and the
    /// rejected pair is handed back, so the caller keeps ownership of it and
    /// can still observe the original entry through [`RbTree::get`].
    ///
    /// ```rust
    /// # use redblack::RbTree;
    ///
    /// let mut map = RbTree::default();
    ///
    /// assert!(map.insert(4, 6).is_ok());
    /// assert!(map.insert(5, 7).is_ok());
    /// assert!(map.insert(4, 8) == Err((4, 8)));
    ///
    /// assert!(map.get(&5) == Some(&7));
    /// assert!(map.get(&4) == Some(&6));
    /// ```
    pub fn insert(&mut self, key: K, val: V) -> Result<(), (K, V)> {
        let mut parent = None;
        let mut cur = self.root;
        let mut dir = Direction::Left;
        // Traverse the BST to find the place to insert our key/value node. If
        // a node with the same key already exists, the pair goes back to the
        // caller unchanged. It is important that we keep track of the parent
        // and direction from the parent that the current node is in so that
        // we can attach the new leaf correctly.
        while let Some(node) = cur {
            let (node_key, left, right) = unsafe {
                (
                    &(*node.as_ptr()).key,
                    (*node.as_ptr()).child[0],
                    (*node.as_ptr()).child[1],
                )
            };
            match key.cmp(node_key) {
                Ordering::Less => {
                    parent = cur;
                    cur = left;
                    dir = Direction::Left;
                }
                Ordering::Equal => return Err((key, val)),
                Ordering::Greater => {
                    parent = cur;
                    cur = right;
                    dir = Direction::Right;
                }
            }
        }

        // cur must now be a None node that we want to insert into. We replace
        // it with a new node containing our key value pair, coloured red so
        // that no path's black height changes before the fixup runs.
        let node = Box::new(RbNode {
            key,
            val,
            colour: Colour::Red,
            parent,
            child: [None, None],
        });
        let node = unsafe { NonNull::new_unchecked(Box::into_raw(node)) };
        self.len += 1;
        match parent {
            None => self.root = Some(node),
            Some(parent) => {
                unsafe { (&mut (*parent.as_ptr()))[dir] = Some(node) };
            }
        }
        unsafe { self.insert_fixup(node) };
        Ok(())
    }

    /// Restore the red-black invariants after attaching `node` as a red
    /// leaf. Entering each iteration the only possible violation is a red
    /// node directly under a red parent at the current position.
    ///
    /// ## Safety
    /// - `node` must be a valid node freshly linked into this tree.
    unsafe fn insert_fixup(&mut self, mut node: NonNull<RbNode<K, V>>) {
        while let Some(parent) = (*node.as_ptr()).parent {
            if (*parent.as_ptr()).colour == Colour::Black {
                break;
            }
            debug_assert!((*node.as_ptr()).colour == Colour::Red);
            // A red parent is never the root, so the grandparent exists.
            let gparent = (*parent.as_ptr()).parent;
            debug_assert!(gparent.is_some());
            let gparent = gparent.unwrap_unchecked();
            let dir = match Some(parent) == (&(*gparent.as_ptr()))[Direction::Left] {
                true => Direction::Left,
                false => Direction::Right,
            };
            let uncle = (&(*gparent.as_ptr()))[dir.opposite()];
            if uncle.is_some_and(|u| (*u.as_ptr()).colour == Colour::Red) {
                // Case 1: the uncle is red (noting that None nodes are
                // black). Recolour the parent and uncle black and the
                // grandparent red, then continue from the grandparent, which
                // may now sit under a red parent itself.
                (*uncle.unwrap_unchecked().as_ptr()).colour = Colour::Black;
                (*parent.as_ptr()).colour = Colour::Black;
                (*gparent.as_ptr()).colour = Colour::Red;
                node = gparent;
            } else {
                let mut parent = parent;
                if Some(node) == (&(*parent.as_ptr()))[dir.opposite()] {
                    // Case 2: the uncle is black and the grandparent, parent
                    // and node form a zig-zag. Rotate the parent so the three
                    // line up; the old node is now the one on top.
                    self.rotate(parent, dir);
                    parent = node;
                }
                // Case 3: the uncle is black and the path from the
                // grandparent is straight. Swap the colours of parent and
                // grandparent and rotate the grandparent away; the subtree
                // root is black again so the loop is done.
                (*parent.as_ptr()).colour = Colour::Black;
                (*gparent.as_ptr()).colour = Colour::Red;
                self.rotate(gparent, dir.opposite());
                break;
            }
        }
        // Finally we correct the root node to be black.
        if let Some(root) = self.root {
            (*root.as_ptr()).colour = Colour::Black;
        }
    }

    /// Remove a key from the map, returning the stored pair (if it exists).
    ///
    /// ```rust
    /// # use redblack::RbTree;
    ///
    /// let mut map = RbTree::default();
    ///
    /// map.insert(4, 6).unwrap();
    /// assert!(map.remove(&4) == Some((4, 6)));
    /// assert!(map.get(&4) == None);
    /// assert!(map.remove(&4) == None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.find_node(key)?;
        let node = unsafe { self.detach(node) };
        Some((node.key, node.val))
    }

    /// Unlink `node` from the tree, rebalance, and hand its box back.
    ///
    /// ## Safety
    /// - `node` must be a valid node linked into this tree.
    unsafe fn detach(&mut self, node: NonNull<RbNode<K, V>>) -> Box<RbNode<K, V>> {
        // The colour of the node physically removed from its position: the
        // node itself, or its in-order successor in the two-children case.
        let mut deleted_colour = (*node.as_ptr()).colour;
        let replacement;
        let parent;

        if (&(*node.as_ptr()))[Direction::Left].is_none() {
            // At most one right child, which replaces the node directly.
            replacement = (&(*node.as_ptr()))[Direction::Right];
            parent = (*node.as_ptr()).parent;
            self.transplant(node, replacement);
        } else if (&(*node.as_ptr()))[Direction::Right].is_none() {
            replacement = (&(*node.as_ptr()))[Direction::Left];
            parent = (*node.as_ptr()).parent;
            self.transplant(node, replacement);
        } else {
            // Two children: splice the in-order successor (the leftmost node
            // of the right subtree) into the node's position. The successor
            // has no left child, so its own right child takes its old slot.
            let mut successor = (&(*node.as_ptr()))[Direction::Right].unwrap_unchecked();
            while let Some(left) = (&(*successor.as_ptr()))[Direction::Left] {
                successor = left;
            }
            deleted_colour = (*successor.as_ptr()).colour;
            replacement = (&(*successor.as_ptr()))[Direction::Right];
            let successor_parent = (*successor.as_ptr()).parent.unwrap_unchecked();
            if successor_parent == node {
                // The successor replaces its own parent, so it is also the
                // parent of the vacated position.
                parent = Some(successor);
            } else {
                parent = Some(successor_parent);
                self.transplant(successor, replacement);
                (&mut (*successor.as_ptr()))[Direction::Right] = (&(*node.as_ptr()))[Direction::Right];
                (*(&(*successor.as_ptr()))[Direction::Right]
                    .unwrap_unchecked()
                    .as_ptr())
                .parent = Some(successor);
            }
            self.transplant(node, Some(successor));
            (&mut (*successor.as_ptr()))[Direction::Left] = (&(*node.as_ptr()))[Direction::Left];
            (*(&(*successor.as_ptr()))[Direction::Left]
                .unwrap_unchecked()
                .as_ptr())
            .parent = Some(successor);
            // The successor inherits the node's colour so the black heights
            // around the old position are untouched.
            (*successor.as_ptr()).colour = (*node.as_ptr()).colour;
        }
        self.len -= 1;

        if deleted_colour == Colour::Black {
            self.remove_fixup(parent, replacement);
        }
        Box::from_raw(node.as_ptr())
    }

    /// Resolve the "double-black" deficit left at `node` (possibly None)
    /// under `parent` after a black node was physically removed there.
    ///
    /// ## Safety
    /// - All pointers must be either valid or null, and `parent` must be the
    ///   parent of the vacated position.
    unsafe fn remove_fixup(
        &mut self,
        mut parent: Option<NonNull<RbNode<K, V>>>,
        mut node: Option<NonNull<RbNode<K, V>>>,
    ) {
        while node != self.root && !node.is_some_and(|n| (*n.as_ptr()).colour == Colour::Red) {
            let Some(p) = parent else { break };
            let dir = match (&(*p.as_ptr()))[Direction::Left] == node {
                true => Direction::Left,
                false => Direction::Right,
            };
            // The deficient side is one black node short, so the sibling
            // subtree cannot be empty.
            let sibling = (&(*p.as_ptr()))[dir.opposite()];
            debug_assert!(sibling.is_some());
            let mut sibling = sibling.unwrap_unchecked();
            if (*sibling.as_ptr()).colour == Colour::Red {
                // Case 1: the sibling is red. Rotate it above the parent,
                // swapping their colours; the new sibling is one of its old
                // children and is black.
                (*sibling.as_ptr()).colour = Colour::Black;
                (*p.as_ptr()).colour = Colour::Red;
                self.rotate(p, dir);
                sibling = (&(*p.as_ptr()))[dir.opposite()].unwrap_unchecked();
            }

            // From this point the sibling is black.
            let far_is_black = match (&(*sibling.as_ptr()))[dir.opposite()] {
                None => true,
                Some(far) => (*far.as_ptr()).colour == Colour::Black,
            };
            if far_is_black {
                let near = (&(*sibling.as_ptr()))[dir];
                if !near.is_some_and(|n| (*n.as_ptr()).colour == Colour::Red) {
                    // Case 2: both of the sibling's children are black.
                    // Recolouring the sibling red evens out the two sides
                    // under the parent, moving the deficit up to it.
                    (*sibling.as_ptr()).colour = Colour::Red;
                    node = Some(p);
                    parent = (*p.as_ptr()).parent;
                    continue;
                }
                // Case 3: the near child is red and the far child is black.
                // Rotate the sibling away from the deficit so the red ends up
                // on the far side, then fall through to case 4.
                let near = near.unwrap_unchecked();
                (*near.as_ptr()).colour = Colour::Black;
                (*sibling.as_ptr()).colour = Colour::Red;
                self.rotate(sibling, dir.opposite());
                sibling = (&(*p.as_ptr()))[dir.opposite()].unwrap_unchecked();
            }

            // Case 4: the sibling's far child is red. Rotating the parent
            // toward the deficit adds a black node to the deficient side
            // without changing the count on the other side, which settles the
            // deficit for good.
            (*sibling.as_ptr()).colour = (*p.as_ptr()).colour;
            (*p.as_ptr()).colour = Colour::Black;
            let far = (&(*sibling.as_ptr()))[dir.opposite()];
            debug_assert!(far.is_some());
            (*far.unwrap_unchecked().as_ptr()).colour = Colour::Black;
            self.rotate(p, dir);
            node = self.root;
            break;
        }
        if let Some(node) = node {
            (*node.as_ptr()).colour = Colour::Black;
        }
    }

    /// The node furthest in `dir` from the root.
    fn extreme(&self, dir: Direction) -> Option<NonNull<RbNode<K, V>>> {
        let mut cur = self.root?;
        while let Some(next) = unsafe { (&(*cur.as_ptr()))[dir] } {
            cur = next;
        }
        Some(cur)
    }

    /// Step from `node` to its in-order neighbour in `dir`: either the
    /// `dir.opposite()`-most descendant of the `dir` child, or the first
    /// ancestor reached by stepping away from `dir`.
    ///
    /// ## Safety
    /// - `node` must be a valid node linked into a tree.
    unsafe fn step(
        mut node: NonNull<RbNode<K, V>>,
        dir: Direction,
    ) -> Option<NonNull<RbNode<K, V>>> {
        if let Some(mut cur) = (&(*node.as_ptr()))[dir] {
            while let Some(next) = (&(*cur.as_ptr()))[dir.opposite()] {
                cur = next;
            }
            return Some(cur);
        }
        while let Some(parent) = (*node.as_ptr()).parent {
            if (&(*parent.as_ptr()))[dir] != Some(node) {
                return Some(parent);
            }
            node = parent;
        }
        None
    }

    /// The entry with the smallest key, or `None` for an empty tree.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.extreme(Direction::Left)
            .map(|n| unsafe { (&(*n.as_ptr()).key, &(*n.as_ptr()).val) })
    }

    /// The entry with the largest key, or `None` for an empty tree.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.extreme(Direction::Right)
            .map(|n| unsafe { (&(*n.as_ptr()).key, &(*n.as_ptr()).val) })
    }

    /// Returns the amount of elements stored in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cursor positioned at the smallest entry (or nowhere, for an empty
    /// tree).
    pub fn cursor_first(&self) -> Cursor<'_, K, V> {
        Cursor {
            cur: self.extreme(Direction::Left),
            _lifetime: PhantomData,
        }
    }

    /// A cursor positioned at the largest entry (or nowhere, for an empty
    /// tree).
    pub fn cursor_last(&self) -> Cursor<'_, K, V> {
        Cursor {
            cur: self.extreme(Direction::Right),
            _lifetime: PhantomData,
        }
    }

    /// A cursor positioned at `key`, or positioned nowhere if the key is
    /// absent.
    pub fn cursor<Q>(&self, key: &Q) -> Cursor<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Cursor {
            cur: self.find_node(key),
            _lifetime: PhantomData,
        }
    }

    /// Return a borrowing iterator over the key value pairs in the tree, in
    /// increasing key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            front: self.extreme(Direction::Left),
            back: self.extreme(Direction::Right),
            len: self.len,
            _lifetime: PhantomData,
        }
    }

    /// Return an in-order iterator over pairs of keys and mutable references
    /// to values in the tree.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            front: self.extreme(Direction::Left),
            back: self.extreme(Direction::Right),
            len: self.len,
            _lifetime: PhantomData,
        }
    }

    // Validates the red-black invariants and returns the black height.
    // Test support, not part of the public contract.
    #[doc(hidden)]
    pub fn black_height(&self) -> usize {
        match self.root {
            None => 0,
            Some(root) => unsafe {
                assert!((*root.as_ptr()).colour == Colour::Black, "red root");
                assert!((*root.as_ptr()).parent.is_none());
                self.black_height_at(root)
            },
        }
    }

    unsafe fn black_height_at(&self, node: NonNull<RbNode<K, V>>) -> usize {
        let colour = (*node.as_ptr()).colour;
        let mut heights = [0; 2];
        for (i, child) in (*node.as_ptr()).child.into_iter().enumerate() {
            if let Some(child) = child {
                assert!((*child.as_ptr()).parent == Some(node), "broken parent link");
                assert!(
                    colour == Colour::Black || (*child.as_ptr()).colour == Colour::Black,
                    "red node with red child"
                );
                heights[i] = self.black_height_at(child);
            }
        }
        assert_eq!(heights[0], heights[1], "unequal black heights");
        heights[0] + usize::from(colour == Colour::Black)
    }
}

impl<K: Ord, V> Drop for RbTree<K, V> {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        if let Some(root) = self.root {
            stack.push(root);
        }
        while let Some(node) = stack.pop() {
            for child in unsafe { (*node.as_ptr()).child }.into_iter().flatten() {
                stack.push(child);
            }

            drop(unsafe { Box::from_raw(node.as_ptr()) });
        }
    }
}

impl<K: Ord, V> Default for RbTree<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K: Ord + Clone, V: Clone> Clone for RbTree<K, V> {
    fn clone(&self) -> Self {
        Self::from_iter(self.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}

impl<K: Ord + Debug, V: Debug> Debug for RbTree<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self).finish()
    }
}

impl<K: Ord + PartialEq, V: PartialEq> PartialEq for RbTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other)
    }
}

impl<K: Ord + Eq, V: Eq> Eq for RbTree<K, V> {}

impl<K: Ord, V> FromIterator<(K, V)> for RbTree<K, V> {
    /// Collect an iterator into a tree. When the iterator yields a key more
    /// than once, the first occurrence is kept.
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tree = RbTree::default();
        for (k, v) in iter {
            let _ = tree.insert(k, v);
        }
        tree
    }
}

impl<'a, K: Ord + Copy, V: Copy> Extend<(&'a K, &'a V)> for RbTree<K, V> {
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        for (&k, &v) in iter {
            let _ = self.insert(k, v);
        }
    }
}

impl<K: Ord, V: PartialOrd> PartialOrd for RbTree<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other)
    }
}

impl<K: Ord, V: Ord> Ord for RbTree<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other)
    }
}

impl<K: Ord + Hash, V: Hash> Hash for RbTree<K, V> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (k, v) in self {
            (k, v).hash(state);
        }
    }
}

impl<K: Ord, V> Extend<(K, V)> for RbTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            let _ = self.insert(k, v);
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a RbTree<K, V> {
    type Item = (&'a K, &'a V);

    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord, V> IntoIterator for RbTree<K, V> {
    type Item = (K, V);

    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let tree = ManuallyDrop::new(self);
        IntoIter {
            stack: Vec::new(),
            cur: tree.root,
            len: tree.len,
        }
    }
}

/// A position inside an [`RbTree`], stepping to the in-order successor or
/// predecessor through the parent links.
///
/// A cursor borrows the tree, so the tree cannot be mutated while any cursor
/// is alive; re-acquire a cursor after mutating. A cursor that has moved past
/// either end stays exhausted.
pub struct Cursor<'a, K: Ord, V> {
    cur: Option<NonNull<RbNode<K, V>>>,
    _lifetime: PhantomData<&'a RbTree<K, V>>,
}

impl<'a, K: Ord, V> Cursor<'a, K, V> {
    /// The entry under the cursor, or `None` if the cursor is exhausted.
    pub fn entry(&self) -> Option<(&'a K, &'a V)> {
        self.cur
            .map(|n| unsafe { (&(*n.as_ptr()).key, &(*n.as_ptr()).val) })
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
        self.cur = self
            .cur
            .and_then(|n| unsafe { RbTree::step(n, Direction::Right) });
    }

    /// Step back to the in-order predecessor.
    pub fn move_prev(&mut self) {
        self.cur = self
            .cur
            .and_then(|n| unsafe { RbTree::step(n, Direction::Left) });
    }
}

/// A borrowing iterator over the elements of an [`RbTree`], in increasing
/// key order from the front and decreasing key order from the back.
pub struct Iter<'a, K: Ord, V> {
    front: Option<NonNull<RbNode<K, V>>>,
    back: Option<NonNull<RbNode<K, V>>>,
    len: usize,
    _lifetime: PhantomData<&'a V>,
}

impl<'a, K: Ord + 'a, V: 'a> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }
        let cur = self.front?;
        self.len -= 1;
        self.front = match self.len {
            0 => None,
            _ => unsafe { RbTree::step(cur, Direction::Right) },
        };

        unsafe { Some((&(*cur.as_ptr()).key, &(*cur.as_ptr()).val)) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'a, K: Ord + 'a, V: 'a> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }
        let cur = self.back?;
        self.len -= 1;
        self.back = match self.len {
            0 => None,
            _ => unsafe { RbTree::step(cur, Direction::Left) },
        };

        unsafe { Some((&(*cur.as_ptr()).key, &(*cur.as_ptr()).val)) }
    }
}

impl<'a, K: Ord + 'a, V: 'a> ExactSizeIterator for Iter<'a, K, V> {
    fn len(&self) -> usize {
        self.len
    }
}

impl<'a, K: Ord + 'a, V: 'a> FusedIterator for Iter<'a, K, V> {}

/// An in-order iterator over mutable references of the elements of an
/// [`RbTree`].
pub struct IterMut<'a, K: Ord, V> {
    front: Option<NonNull<RbNode<K, V>>>,
    back: Option<NonNull<RbNode<K, V>>>,
    len: usize,
    _lifetime: PhantomData<&'a mut V>,
}

impl<'a, K: Ord + 'a, V: 'a> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }
        let cur = self.front?;
        self.len -= 1;
        self.front = match self.len {
            0 => None,
            _ => unsafe { RbTree::step(cur, Direction::Right) },
        };

        unsafe { Some((&(*cur.as_ptr()).key, &mut (*cur.as_ptr()).val)) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'a, K: Ord + 'a, V: 'a> DoubleEndedIterator for IterMut<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }
        let cur = self.back?;
        self.len -= 1;
        self.back = match self.len {
            0 => None,
            _ => unsafe { RbTree::step(cur, Direction::Left) },
        };

        unsafe { Some((&(*cur.as_ptr()).key, &mut (*cur.as_ptr()).val)) }
    }
}

impl<'a, K: Ord + 'a, V: 'a> ExactSizeIterator for IterMut<'a, K, V> {
    fn len(&self) -> usize {
        self.len
    }
}

impl<'a, K: Ord + 'a, V: 'a> FusedIterator for IterMut<'a, K, V> {}

/// An owning in-order iterator over the elements in an [`RbTree`].
pub struct IntoIter<K: Ord, V> {
    /// Nodes whose left spine has been descended but which have not been
    /// yielded yet. In-order traversal never revisits a popped node, so each
    /// one can be freed as it is yielded.
    stack: Vec<NonNull<RbNode<K, V>>>,
    /// The next subtree to descend into.
    cur: Option<NonNull<RbNode<K, V>>>,
    len: usize,
}

impl<K: Ord, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.cur {
            self.stack.push(node);
            self.cur = unsafe { (&(*node.as_ptr()))[Direction::Left] };
        }
        let node = self.stack.pop()?;

        let node = *unsafe { Box::from_raw(node.as_ptr()) };
        self.cur = node.child[1];
        self.len -= 1;

        Some((node.key, node.val))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<K: Ord, V> ExactSizeIterator for IntoIter<K, V> {
    fn len(&self) -> usize {
        self.len
    }
}

impl<K: Ord, V> FusedIterator for IntoIter<K, V> {}

impl<K: Ord, V> Drop for IntoIter<K, V> {
    fn drop(&mut self) {
        for _ in self {}
    }
}

/// An RbNode. Each node has a key value pair, and a colour used for
/// balancing.
struct RbNode<K: Ord, V> {
    key: K,
    val: V,
    /// The colour of this node. Every node has a colour for balancing
    /// purposes.
    colour: Colour,

    /// A raw pointer to the parent of this node. This pointer is None iff the
    /// node is the root node.
    parent: Option<NonNull<RbNode<K, V>>>,
    /// Our two child nodes.
    child: [Option<NonNull<RbNode<K, V>>>; 2],
}

impl<K: Ord, V> core::ops::Index<Direction> for RbNode<K, V> {
    type Output = Option<NonNull<RbNode<K, V>>>;

    fn index(&self, index: Direction) -> &Self::Output {
        match index {
            Direction::Left => &self.child[0],
            Direction::Right => &self.child[1],
        }
    }
}

impl<K: Ord, V> core::ops::IndexMut<Direction> for RbNode<K, V> {
    fn index_mut(&mut self, index: Direction) -> &mut Self::Output {
        match index {
            Direction::Left => &mut self.child[0],
            Direction::Right => &mut self.child[1],
        }
    }
}

#[cfg(test)]
mod test {
    use crate::RbTree;
    use alloc::vec::Vec;

    #[test]
    fn test_ops() {
        let mut tree = RbTree::default();

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

        let mut tree = RbTree::default();
        for (key, expected) in keys.into_iter().zip(expected_heights) {
            tree.insert(key, ()).unwrap();
            assert_eq!(tree.black_height(), expected);
        }
        let inorder: Vec<i32> = tree.iter().map(|(&k, _)| k).collect();
        assert_eq!(inorder, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_remove_rebalance() {
        let mut tree = RbTree::default();
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
        let mut tree = RbTree::new();
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
    fn test_cursor() {
        let tree: RbTree<_, _> = [5, 1, 9, 3, 7].map(|k| (k, k * 10)).into_iter().collect();

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
        let mut tree = RbTree::default();

        const COUNT: usize = 100;

        // Insert in an order that is not already sorted.
        for key in (0..COUNT).rev() {
            tree.insert(key, key).unwrap();
        }

        let forward: Vec<usize> = tree.iter().map(|(&k, _)| k).collect();
        assert!(forward.iter().copied().eq(0..COUNT));

        let backward: Vec<usize> = tree.iter().rev().map(|(&k, _)| k).collect();
        assert!(backward.iter().copied().eq((0..COUNT).rev()));

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
    fn test_iter_meet_in_middle() {
        let tree: RbTree<_, _> = (0..10).map(|x| (x, x)).collect();

        let mut iter = tree.iter();
        assert_eq!(iter.next(), Some((&0, &0)));
        assert_eq!(iter.next_back(), Some((&9, &9)));
        assert_eq!(iter.len(), 8);

        let rest: Vec<i32> = iter.map(|(&k, _)| k).collect();
        assert_eq!(rest, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_traits() {
        let mut tree = RbTree::from_iter((0..100).map(|x| (x, x)));

        let mut tree2 = RbTree::new();
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
        for (item, item2) in tree.iter().zip(tree2.iter()) {
            assert_eq!(item, item2);
        }
    }
}
