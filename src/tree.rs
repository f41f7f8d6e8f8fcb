//! Intrusive red-black tree (D1), keyed by `K: Ord`.
//!
//! The original design recovers a container from a node pointer via
//! `offsetof`; this crate instead puts the tree-structural fields
//! ([`Link`]) as the *first* field of [`Container`] (`#[repr(C)]`), so a
//! pointer to one is always a valid pointer to the other — the "index +
//! type-tag pattern... trait/interface-shaped node descriptor" the design
//! notes call for, minus the index indirection. Parent/color packing
//! (`parent_color`, low bit = color) is kept exactly as specified: it is a
//! property of the red-black algorithm, not of the offsetof trick being
//! replaced.
//!
//! Containers are carved out of a fixed-capacity arena built on
//! [`crate::freelist::FreeList`] (L2), matching "storage for containers
//! comes from a free-list-backed arena." A key's duplicate `puts` calls
//! stack their values (LIFO); `gets`/`cached_gets` pop the most recently
//! attached value and only unlink the node once its value stack empties —
//! this crate's concrete instantiation of the spec's caller-controlled
//! `attach`/`detach` policy.

use crate::error::{Error, Result};
use crate::freelist::FreeList;
use std::cmp::Ordering;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

const RED: usize = 0;
const BLACK: usize = 1;

/// Tree-structural fields, embedded as the first field of every
/// [`Container`]. A pointer to a `Container<K, V>` is always also a valid
/// pointer to its `Link`, and vice versa, because of `#[repr(C)]`.
#[repr(C)]
struct Link {
    /// `parent | color`; low bit is the color (0 = red, 1 = black).
    parent_color: usize,
    left: *mut Link,
    right: *mut Link,
}

impl Link {
    unsafe fn parent(ptr: *mut Link) -> *mut Link {
        unsafe { ((*ptr).parent_color & !1) as *mut Link }
    }

    unsafe fn set_parent(ptr: *mut Link, parent: *mut Link) {
        unsafe {
            (*ptr).parent_color = (parent as usize) | ((*ptr).parent_color & 1);
        }
    }

    unsafe fn color(ptr: *mut Link) -> usize {
        unsafe { (*ptr).parent_color & 1 }
    }

    unsafe fn set_color(ptr: *mut Link, color: usize) {
        unsafe {
            (*ptr).parent_color = ((*ptr).parent_color & !1) | color;
        }
    }

    unsafe fn set_parent_color(ptr: *mut Link, parent: *mut Link, color: usize) {
        unsafe {
            (*ptr).parent_color = (parent as usize) | color;
        }
    }
}

#[repr(C)]
struct Container<K, V> {
    link: Link,
    key: K,
    /// Values attached to this key, most recently attached last.
    values: Vec<V>,
}

/// Which cached extreme to pull from in [`Tree::cached_gets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cached {
    Smallest,
    Largest,
}

struct Location {
    node: *mut Link,
    parent: *mut Link,
    /// `cmp(key, parent)`: -1, 0, or 1. Only meaningful when `parent` isn't nil.
    parent_cmp: i32,
}

/// An intrusive red-black tree over a fixed-capacity container arena.
///
/// Single-threaded: the raw pointers inside make `Tree` neither `Send` nor
/// `Sync`, matching the spec's "the caller must serialize" requirement for
/// this component.
pub struct Tree<K, V> {
    root: *mut Link,
    nil: *mut Link,
    // Keeps the sentinel's heap address alive and stable; `nil` points into it.
    _nil_storage: Box<Link>,
    smallest: *mut Link,
    largest: *mut Link,
    arena: FreeList,
    // Keeps the arena's backing allocation alive; `arena` points into it.
    _storage: Vec<MaybeUninit<Container<K, V>>>,
    capacity: usize,
    len: usize,
}

impl<K: Ord, V> Tree<K, V> {
    /// Builds an empty tree with room for `capacity` distinct keys (each key
    /// may carry any number of stacked values).
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::BadConf);
        }

        let mut nil_storage = Box::new(Link {
            parent_color: 0,
            left: std::ptr::null_mut(),
            right: std::ptr::null_mut(),
        });
        let nil: *mut Link = nil_storage.as_mut();
        unsafe {
            (*nil).left = nil;
            (*nil).right = nil;
            (*nil).parent_color = (nil as usize) | BLACK;
        }

        let mut storage: Vec<MaybeUninit<Container<K, V>>> =
            (0..capacity).map(|_| MaybeUninit::uninit()).collect();
        let arena = unsafe {
            FreeList::init(
                storage.as_mut_ptr() as *mut u8,
                std::mem::size_of::<Container<K, V>>(),
                capacity,
            )
        };

        Ok(Self {
            root: nil,
            nil,
            _nil_storage: nil_storage,
            smallest: nil,
            largest: nil,
            arena,
            _storage: storage,
            capacity,
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts `value` under `key`. If `key` already exists, `value` is
    /// stacked onto its existing values (LIFO) rather than creating a
    /// second node. Fails with [`Error::Full`] when the arena is exhausted
    /// — always before any tree mutation.
    pub fn puts(&mut self, key: K, value: V) -> Result<()> {
        let slot = self.arena.alloc().ok_or(Error::Full)?;
        let container_ptr = slot.as_ptr() as *mut Container<K, V>;
        unsafe {
            container_ptr.write(Container {
                link: Link {
                    parent_color: 0,
                    left: self.nil,
                    right: self.nil,
                },
                key,
                values: vec![value],
            });
        }

        let location = unsafe { self.find(&(*container_ptr).key) };
        if !std::ptr::eq(location.node, self.nil) {
            // Duplicate key: merge the new container's value into the
            // existing node's stack and give the slot back to the arena.
            unsafe {
                let existing = location.node as *mut Container<K, V>;
                let mut discarded = std::ptr::read(container_ptr);
                (*existing).values.append(&mut discarded.values);
                // `discarded` drops here: empty `values`, and `key` runs its
                // own destructor since it was never moved into the tree.
                self.arena.free(NonNull::new_unchecked(container_ptr as *mut u8));
            }
        } else {
            let node = container_ptr as *mut Link;
            self.insert_link(node, &location);
            self.len += 1;
        }
        Ok(())
    }

    /// Removes and returns the most recently attached value for `key`.
    /// Fails with [`Error::Empty`] if the tree has no nodes, or
    /// [`Error::BadKey`] if `key` isn't present.
    pub fn gets(&mut self, key: &K) -> Result<V> {
        if std::ptr::eq(self.root, self.nil) {
            return Err(Error::Empty);
        }
        let location = self.find(key);
        if std::ptr::eq(location.node, self.nil) {
            return Err(Error::BadKey);
        }
        Ok(self.remove_one(location.node))
    }

    /// Removes and returns the most recently attached value on the cached
    /// smallest or largest key. Fails with [`Error::Empty`] if the tree is
    /// empty.
    pub fn cached_gets(&mut self, which: Cached) -> Result<V> {
        if std::ptr::eq(self.root, self.nil) {
            return Err(Error::Empty);
        }
        let node = match which {
            Cached::Smallest => self.smallest,
            Cached::Largest => self.largest,
        };
        Ok(self.remove_one(node))
    }

    fn remove_one(&mut self, node: *mut Link) -> V {
        unsafe {
            let container = node as *mut Container<K, V>;
            let value = (*container)
                .values
                .pop()
                .expect("a live node always holds at least one value");
            if (*container).values.is_empty() {
                self.delete_link(node);
                let owned = std::ptr::read(container);
                drop(owned); // drops `key`; `values` is already empty
                self.arena.free(NonNull::new_unchecked(container as *mut u8));
                self.len -= 1;
            }
            value
        }
    }

    fn find(&self, key: &K) -> Location {
        let mut node = self.root;
        let mut parent = self.nil;
        unsafe {
            while !std::ptr::eq(node, self.nil) {
                let container = node as *mut Container<K, V>;
                match key.cmp(&(*container).key) {
                    Ordering::Less => {
                        parent = node;
                        node = (*node).left;
                    }
                    Ordering::Greater => {
                        parent = node;
                        node = (*node).right;
                    }
                    Ordering::Equal => break,
                }
            }
        }
        let parent_cmp = if std::ptr::eq(parent, self.nil) {
            0
        } else {
            unsafe {
                let container = parent as *mut Container<K, V>;
                match key.cmp(&(*container).key) {
                    Ordering::Less => -1,
                    Ordering::Greater => 1,
                    Ordering::Equal => 0,
                }
            }
        };
        Location {
            node,
            parent,
            parent_cmp,
        }
    }

    fn insert_link(&mut self, node: *mut Link, location: &Location) {
        unsafe {
            (*node).left = self.nil;
            (*node).right = self.nil;
            Link::set_parent_color(node, location.parent, RED);

            if std::ptr::eq(location.parent, self.nil) {
                self.root = node;
            } else if location.parent_cmp == -1 {
                (*location.parent).left = node;
            } else {
                (*location.parent).right = node;
            }
        }

        self.fixup_cached_insert(location, node);
        self.fixup_insert(node);
    }

    fn fixup_cached_insert(&mut self, location: &Location, node: *mut Link) {
        if std::ptr::eq(location.parent, self.nil) {
            // First node in the tree: it is trivially both the smallest
            // and the largest.
            self.smallest = node;
            self.largest = node;
        } else if location.parent_cmp == -1 && std::ptr::eq(location.parent, self.smallest) {
            self.smallest = node;
        } else if location.parent_cmp == 1 && std::ptr::eq(location.parent, self.largest) {
            self.largest = node;
        }
    }

    fn fixup_insert(&mut self, mut node: *mut Link) {
        unsafe {
            while Link::color(Link::parent(node)) == RED {
                let mut parent = Link::parent(node);
                let grandparent = Link::parent(parent);
                debug_assert!(!std::ptr::eq(grandparent, self.nil));

                if std::ptr::eq(parent, (*grandparent).left) {
                    let uncle = (*grandparent).right;
                    if Link::color(uncle) == RED {
                        Link::set_color(parent, BLACK);
                        Link::set_color(uncle, BLACK);
                        Link::set_color(grandparent, RED);
                        node = grandparent;
                    } else {
                        if std::ptr::eq(node, (*parent).right) {
                            node = parent;
                            self.rotate_left(parent);
                            parent = Link::parent(node);
                        }
                        Link::set_color(parent, BLACK);
                        Link::set_color(grandparent, RED);
                        self.rotate_right(grandparent);
                        break;
                    }
                } else {
                    let uncle = (*grandparent).left;
                    if Link::color(uncle) == RED {
                        Link::set_color(parent, BLACK);
                        Link::set_color(uncle, BLACK);
                        Link::set_color(grandparent, RED);
                        node = grandparent;
                    } else {
                        if std::ptr::eq(node, (*parent).left) {
                            node = parent;
                            self.rotate_right(parent);
                            parent = Link::parent(node);
                        }
                        Link::set_color(parent, BLACK);
                        Link::set_color(grandparent, RED);
                        self.rotate_left(grandparent);
                        break;
                    }
                }
            }
            Link::set_color(self.root, BLACK);
        }
    }

    fn delete_link(&mut self, node: *mut Link) {
        self.fixup_cached_delete(node);

        unsafe {
            let replacement;
            let mut deleted_color = Link::color(node);

            if std::ptr::eq((*node).left, self.nil) {
                replacement = (*node).right;
                self.transplant(node, (*node).right);
            } else if std::ptr::eq((*node).right, self.nil) {
                replacement = (*node).left;
                self.transplant(node, (*node).left);
            } else {
                let next_largest = self.local_minimum((*node).right);
                deleted_color = Link::color(next_largest);
                let next_replacement = (*next_largest).right;

                if !std::ptr::eq(next_largest, (*node).right) {
                    self.transplant(next_largest, (*next_largest).right);
                    (*next_largest).right = (*node).right;
                    Link::set_parent((*next_largest).right, next_largest);
                } else {
                    Link::set_parent(next_replacement, next_largest);
                }

                self.transplant(node, next_largest);
                (*next_largest).left = (*node).left;
                Link::set_parent((*next_largest).left, next_largest);
                Link::set_color(next_largest, Link::color(node));
                replacement = next_replacement;
            }

            if deleted_color == BLACK {
                self.fixup_delete(replacement);
            }
        }
    }

    fn fixup_cached_delete(&mut self, node: *mut Link) {
        unsafe {
            if std::ptr::eq(self.smallest, self.largest) {
                debug_assert!(std::ptr::eq(node, self.root));
                self.smallest = self.nil;
                self.largest = self.nil;
            } else if std::ptr::eq(node, self.smallest) {
                debug_assert!(std::ptr::eq((*self.smallest).left, self.nil));
                if !std::ptr::eq((*self.smallest).right, self.nil) {
                    self.smallest = self.local_minimum((*self.smallest).right);
                } else {
                    self.smallest = Link::parent(self.smallest);
                }
            } else if std::ptr::eq(node, self.largest) {
                debug_assert!(std::ptr::eq((*self.largest).right, self.nil));
                if !std::ptr::eq((*self.largest).left, self.nil) {
                    self.largest = self.local_maximum((*self.largest).left);
                } else {
                    self.largest = Link::parent(self.largest);
                }
            }
        }
    }

    fn fixup_delete(&mut self, mut node: *mut Link) {
        unsafe {
            while !std::ptr::eq(node, self.root) && Link::color(node) == BLACK {
                let parent = Link::parent(node);
                if std::ptr::eq(node, (*parent).left) {
                    let mut sibling = (*parent).right;
                    if Link::color(sibling) == RED {
                        Link::set_color(sibling, BLACK);
                        Link::set_color(parent, RED);
                        self.rotate_left(parent);
                        sibling = (*parent).right;
                    }
                    if Link::color((*sibling).left) == BLACK && Link::color((*sibling).right) == BLACK {
                        Link::set_color(sibling, RED);
                        node = parent;
                    } else {
                        if Link::color((*sibling).right) == BLACK {
                            Link::set_color((*sibling).left, BLACK);
                            Link::set_color(sibling, RED);
                            self.rotate_right(sibling);
                            sibling = (*parent).right;
                        }
                        Link::set_color(sibling, Link::color(parent));
                        Link::set_color(parent, BLACK);
                        Link::set_color((*sibling).right, BLACK);
                        self.rotate_left(parent);
                        node = self.root;
                    }
                } else {
                    let mut sibling = (*parent).left;
                    if Link::color(sibling) == RED {
                        Link::set_color(sibling, BLACK);
                        Link::set_color(parent, RED);
                        self.rotate_right(parent);
                        sibling = (*parent).left;
                    }
                    if Link::color((*sibling).left) == BLACK && Link::color((*sibling).right) == BLACK {
                        Link::set_color(sibling, RED);
                        node = parent;
                    } else {
                        if Link::color((*sibling).left) == BLACK {
                            Link::set_color((*sibling).right, BLACK);
                            Link::set_color(sibling, RED);
                            self.rotate_left(sibling);
                            sibling = (*parent).left;
                        }
                        Link::set_color(sibling, Link::color(parent));
                        Link::set_color(parent, BLACK);
                        Link::set_color((*sibling).left, BLACK);
                        self.rotate_right(parent);
                        node = self.root;
                    }
                }
            }
            Link::set_color(node, BLACK);
        }
    }

    fn rotate_left(&mut self, x: *mut Link) {
        unsafe {
            debug_assert!(!std::ptr::eq(x, self.nil));
            let y = (*x).right;
            debug_assert!(!std::ptr::eq(y, self.nil));
            let x_parent = Link::parent(x);

            (*x).right = (*y).left;
            if !std::ptr::eq((*y).left, self.nil) {
                Link::set_parent((*y).left, x);
            }

            Link::set_parent(y, x_parent);
            if std::ptr::eq(x_parent, self.nil) {
                self.root = y;
            } else if std::ptr::eq(x, (*x_parent).left) {
                (*x_parent).left = y;
            } else {
                (*x_parent).right = y;
            }

            (*y).left = x;
            Link::set_parent(x, y);
        }
    }

    fn rotate_right(&mut self, x: *mut Link) {
        unsafe {
            debug_assert!(!std::ptr::eq(x, self.nil));
            let y = (*x).left;
            debug_assert!(!std::ptr::eq(y, self.nil));
            let x_parent = Link::parent(x);

            (*x).left = (*y).right;
            if !std::ptr::eq((*y).right, self.nil) {
                Link::set_parent((*y).right, x);
            }

            Link::set_parent(y, x_parent);
            if std::ptr::eq(x_parent, self.nil) {
                self.root = y;
            } else if std::ptr::eq(x, (*x_parent).left) {
                (*x_parent).left = y;
            } else {
                (*x_parent).right = y;
            }

            (*y).right = x;
            Link::set_parent(x, y);
        }
    }

    fn transplant(&mut self, old: *mut Link, new: *mut Link) {
        unsafe {
            let old_parent = Link::parent(old);
            if std::ptr::eq(old_parent, self.nil) {
                self.root = new;
            } else if std::ptr::eq((*old_parent).left, old) {
                (*old_parent).left = new;
            } else {
                (*old_parent).right = new;
            }
            Link::set_parent(new, old_parent);
        }
    }

    fn local_minimum(&self, mut start: *mut Link) -> *mut Link {
        unsafe {
            while !std::ptr::eq((*start).left, self.nil) {
                start = (*start).left;
            }
        }
        start
    }

    fn local_maximum(&self, mut start: *mut Link) -> *mut Link {
        unsafe {
            while !std::ptr::eq((*start).right, self.nil) {
                start = (*start).right;
            }
        }
        start
    }
}

impl<K, V> Drop for Tree<K, V> {
    fn drop(&mut self) {
        // Only reachable containers hold live `K`/`V` data; everything still
        // on the arena's free list is uninitialized bytes and must not be
        // touched.
        let mut stack = vec![self.root];
        while let Some(ptr) = stack.pop() {
            if std::ptr::eq(ptr, self.nil) {
                continue;
            }
            unsafe {
                stack.push((*ptr).left);
                stack.push((*ptr).right);
                std::ptr::drop_in_place(ptr as *mut Container<K, V>);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bst_min_max_scenario() {
        let mut tree: Tree<i32, i32> = Tree::new(4).unwrap();
        tree.puts(10, 10).unwrap();
        tree.puts(5, 5).unwrap();
        tree.puts(15, 15).unwrap();
        tree.puts(1, 1).unwrap();

        assert_eq!(tree.cached_gets(Cached::Smallest).unwrap(), 1);
        assert_eq!(tree.cached_gets(Cached::Smallest).unwrap(), 5);
        assert_eq!(tree.cached_gets(Cached::Largest).unwrap(), 15);
        assert_eq!(tree.cached_gets(Cached::Smallest).unwrap(), 10);
        assert!(tree.is_empty());
        assert!(matches!(
            tree.cached_gets(Cached::Smallest),
            Err(Error::Empty)
        ));
    }

    #[test]
    fn gets_missing_key_is_bad_key() {
        let mut tree: Tree<i32, i32> = Tree::new(4).unwrap();
        tree.puts(1, 1).unwrap();
        assert!(matches!(tree.gets(&2), Err(Error::BadKey)));
    }

    #[test]
    fn gets_on_empty_tree_is_empty() {
        let mut tree: Tree<i32, i32> = Tree::new(4).unwrap();
        assert!(matches!(tree.gets(&1), Err(Error::Empty)));
    }

    #[test]
    fn puts_stacks_duplicate_keys() {
        let mut tree: Tree<i32, &'static str> = Tree::new(4).unwrap();
        tree.puts(1, "first").unwrap();
        tree.puts(1, "second").unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.gets(&1).unwrap(), "second");
        assert_eq!(tree.len(), 1); // node still holds "first"
        assert_eq!(tree.gets(&1).unwrap(), "first");
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn puts_fails_full_before_mutation() {
        let mut tree: Tree<i32, i32> = Tree::new(2).unwrap();
        tree.puts(1, 1).unwrap();
        tree.puts(2, 2).unwrap();
        assert!(matches!(tree.puts(3, 3), Err(Error::Full)));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn inorder_traversal_is_sorted() {
        let mut tree: Tree<i32, i32> = Tree::new(64).unwrap();
        let keys = [50, 30, 70, 20, 40, 60, 80, 10, 25, 35, 45];
        for &k in &keys {
            tree.puts(k, k).unwrap();
        }
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        let mut popped = Vec::new();
        while !tree.is_empty() {
            popped.push(tree.cached_gets(Cached::Smallest).unwrap());
        }
        assert_eq!(popped, sorted);
    }

    #[test]
    fn drop_releases_values_without_leaking() {
        use std::rc::Rc;
        let marker = Rc::new(());
        {
            let mut tree: Tree<i32, Rc<()>> = Tree::new(4).unwrap();
            tree.puts(1, marker.clone()).unwrap();
            tree.puts(2, marker.clone()).unwrap();
            assert_eq!(Rc::strong_count(&marker), 3);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
