//! Binary split-tree layout (§3 "Layout"): leaves are tiled panes, each
//! internal node carries a splitting direction and a ratio between its
//! two children. Generic over the leaf payload so this module has no
//! dependency on the pane/backend machinery itself.
//!
//! Nodes live in a flat arena (`Vec<Slot<T>>`) addressed by index rather
//! than as a `Box`-linked tree, so splitting and closing panes is a
//! matter of reslotting indices instead of juggling ownership through
//! placeholder nodes.

use crate::types::{LayoutKind, Rect};

enum Slot<T> {
    Leaf(T),
    Split { kind: LayoutKind, ratio: u16, first: usize, second: usize },
    /// An index no longer reachable from the root. Left in place rather
    /// than compacted; the arena is bounded by split count, never large.
    Tombstone,
}

pub struct Layout<T> {
    nodes: Vec<Slot<T>>,
    root: usize,
    focused: usize,
}

impl<T> Layout<T> {
    pub fn new(initial: T) -> Self {
        Layout { nodes: vec![Slot::Leaf(initial)], root: 0, focused: 0 }
    }

    fn push(&mut self, slot: Slot<T>) -> usize {
        self.nodes.push(slot);
        self.nodes.len() - 1
    }

    pub fn focused_index(&self) -> usize {
        self.focused
    }

    pub fn get_focused_pane(&self) -> Option<&T> {
        self.leaf(self.focused)
    }

    pub fn get_focused_pane_mut(&mut self) -> Option<&mut T> {
        self.leaf_mut(self.focused)
    }

    fn leaf(&self, idx: usize) -> Option<&T> {
        match self.nodes.get(idx) {
            Some(Slot::Leaf(t)) => Some(t),
            _ => None,
        }
    }

    fn leaf_mut(&mut self, idx: usize) -> Option<&mut T> {
        match self.nodes.get_mut(idx) {
            Some(Slot::Leaf(t)) => Some(t),
            _ => None,
        }
    }

    /// Mutable access to the leaf at `idx`, if it is in fact a leaf.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.leaf_mut(idx)
    }

    /// Focuses the leaf at `idx`, if it is in fact a live leaf.
    pub fn focus(&mut self, idx: usize) -> bool {
        if self.leaf(idx).is_some() {
            self.focused = idx;
            true
        } else {
            false
        }
    }

    fn find_parent(&self, target: usize) -> Option<(usize, bool)> {
        self.nodes.iter().enumerate().find_map(|(i, n)| match n {
            Slot::Split { first, second, .. } if *first == target => Some((i, true)),
            Slot::Split { first, second, .. } if *second == target => Some((i, false)),
            _ => None,
        })
    }

    /// Splits the leaf at `at` in direction `kind`, at an even 50/50
    /// ratio, with `new_leaf` becoming the second child. Returns the new
    /// leaf's index and moves focus to it. `None` if `at` isn't a leaf.
    pub fn split(&mut self, at: usize, kind: LayoutKind, new_leaf: T) -> Option<usize> {
        if self.leaf(at).is_none() {
            return None;
        }
        let old = std::mem::replace(&mut self.nodes[at], Slot::Tombstone);
        let old_leaf = match old {
            Slot::Leaf(l) => l,
            _ => unreachable!("checked above"),
        };
        let first = self.push(Slot::Leaf(old_leaf));
        let second = self.push(Slot::Leaf(new_leaf));
        self.nodes[at] = Slot::Split { kind, ratio: 50, first, second };
        self.focused = second;
        Some(second)
    }

    /// Removes the leaf at `at`; its sibling is promoted into their
    /// parent's slot. Returns the removed leaf. Focus moves to the
    /// layout's first remaining leaf if it pointed at the removed one
    /// or anywhere under the collapsed parent.
    pub fn close_pane(&mut self, at: usize) -> Option<T> {
        if self.leaf(at).is_none() || self.nodes.len() == 1 {
            return None;
        }
        let (parent, is_first) = self.find_parent(at)?;
        let sibling = match &self.nodes[parent] {
            Slot::Split { first, second, .. } => if is_first { *second } else { *first },
            _ => return None,
        };
        let sibling_slot = std::mem::replace(&mut self.nodes[sibling], Slot::Tombstone);
        self.nodes[parent] = sibling_slot;
        let removed = match std::mem::replace(&mut self.nodes[at], Slot::Tombstone) {
            Slot::Leaf(t) => Some(t),
            _ => None,
        };
        if self.leaf(self.focused).is_none() {
            self.focused = self.first_leaf();
        }
        removed
    }

    pub fn split_count(&self) -> usize {
        self.split_iterator().len()
    }

    fn first_leaf(&self) -> usize {
        let mut cur = self.root;
        loop {
            match &self.nodes[cur] {
                Slot::Leaf(_) => return cur,
                Slot::Split { first, .. } => cur = *first,
                Slot::Tombstone => return cur,
            }
        }
    }

    /// Recomputes every leaf's rectangle from `area`, honoring each
    /// split's ratio, and calls `f(leaf, rect)` for each in tree order.
    pub fn resize(&mut self, area: Rect, mut f: impl FnMut(&mut T, Rect)) {
        fn rec<T>(nodes: &mut [Slot<T>], idx: usize, area: Rect, f: &mut impl FnMut(&mut T, Rect)) {
            match &nodes[idx] {
                Slot::Leaf(_) => {
                    if let Slot::Leaf(t) = &mut nodes[idx] {
                        f(t, area);
                    }
                }
                Slot::Split { kind, ratio, first, second } => {
                    let (kind, ratio, first, second) = (*kind, *ratio, *first, *second);
                    let (a, b) = split_rect(area, kind, ratio);
                    rec(nodes, first, a, f);
                    rec(nodes, second, b, f);
                }
                Slot::Tombstone => {}
            }
        }
        rec(&mut self.nodes, self.root, area, &mut f);
    }

    /// All (index, &T) pairs in left-to-right / top-to-bottom tree order.
    pub fn split_iterator(&self) -> Vec<(usize, &T)> {
        let mut out = Vec::new();
        fn rec<'a, T>(nodes: &'a [Slot<T>], idx: usize, out: &mut Vec<(usize, &'a T)>) {
            match &nodes[idx] {
                Slot::Leaf(t) => out.push((idx, t)),
                Slot::Split { first, second, .. } => {
                    rec(nodes, *first, out);
                    rec(nodes, *second, out);
                }
                Slot::Tombstone => {}
            }
        }
        rec(&self.nodes, self.root, &mut out);
        out
    }

    pub fn adjust_ratio(&mut self, parent_of: usize, ratio: u16) {
        if let Some((parent, _)) = self.find_parent(parent_of) {
            if let Slot::Split { ratio: r, .. } = &mut self.nodes[parent] {
                *r = ratio.clamp(5, 95);
            }
        }
    }
}

/// A structural snapshot of a [`Layout`]'s split tree with an arbitrary
/// serializable payload at each leaf, used by session-state round-
/// tripping (§8 "Round-trip frame") to carry tab geometry through a
/// detach/reattach without serializing live pane/backend state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum LayoutTree<S> {
    Leaf(S),
    Split { kind: LayoutKind, ratio: u16, first: Box<LayoutTree<S>>, second: Box<LayoutTree<S>> },
}

impl<T> Layout<T> {
    pub fn export_tree<S>(&self, leaf_map: &mut impl FnMut(&T) -> S) -> LayoutTree<S> {
        fn rec<T, S>(nodes: &[Slot<T>], idx: usize, leaf_map: &mut impl FnMut(&T) -> S) -> LayoutTree<S> {
            match &nodes[idx] {
                Slot::Leaf(t) => LayoutTree::Leaf(leaf_map(t)),
                Slot::Split { kind, ratio, first, second } => LayoutTree::Split {
                    kind: *kind,
                    ratio: *ratio,
                    first: Box::new(rec(nodes, *first, leaf_map)),
                    second: Box::new(rec(nodes, *second, leaf_map)),
                },
                Slot::Tombstone => unreachable!("tree walk never reaches a tombstone"),
            }
        }
        rec(&self.nodes, self.root, leaf_map)
    }

    /// Like [`Layout::export_tree`], but only keeps leaves for which
    /// `keep` returns true; a split whose child didn't survive collapses
    /// to the side that did, same as [`Layout::close_pane`]. Returns
    /// `None` if no leaf survives at all (§8 "local-only panes... are
    /// simply not included").
    pub fn export_tree_filtered<S>(
        &self,
        keep: &mut impl FnMut(&T) -> bool,
        leaf_map: &mut impl FnMut(&T) -> S,
    ) -> Option<LayoutTree<S>> {
        fn rec<T, S>(
            nodes: &[Slot<T>],
            idx: usize,
            keep: &mut impl FnMut(&T) -> bool,
            leaf_map: &mut impl FnMut(&T) -> S,
        ) -> Option<LayoutTree<S>> {
            match &nodes[idx] {
                Slot::Leaf(t) => keep(t).then(|| LayoutTree::Leaf(leaf_map(t))),
                Slot::Split { kind, ratio, first, second } => {
                    let a = rec(nodes, *first, keep, leaf_map);
                    let b = rec(nodes, *second, keep, leaf_map);
                    match (a, b) {
                        (Some(a), Some(b)) => {
                            Some(LayoutTree::Split { kind: *kind, ratio: *ratio, first: Box::new(a), second: Box::new(b) })
                        }
                        (Some(a), None) => Some(a),
                        (None, Some(b)) => Some(b),
                        (None, None) => None,
                    }
                }
                Slot::Tombstone => None,
            }
        }
        rec(&self.nodes, self.root, keep, leaf_map)
    }

    /// Rebuilds a `Layout` from an exported tree, focusing its first leaf.
    pub fn from_tree(tree: LayoutTree<T>) -> Self {
        fn rec<T>(nodes: &mut Vec<Slot<T>>, tree: LayoutTree<T>) -> usize {
            match tree {
                LayoutTree::Leaf(t) => {
                    nodes.push(Slot::Leaf(t));
                    nodes.len() - 1
                }
                LayoutTree::Split { kind, ratio, first, second } => {
                    let first = rec(nodes, *first);
                    let second = rec(nodes, *second);
                    nodes.push(Slot::Split { kind, ratio, first, second });
                    nodes.len() - 1
                }
            }
        }
        let mut nodes = Vec::new();
        let root = rec(&mut nodes, tree);
        let mut layout = Layout { nodes, root, focused: root };
        layout.focused = layout.first_leaf();
        layout
    }
}

fn split_rect(area: Rect, kind: LayoutKind, ratio: u16) -> (Rect, Rect) {
    let ratio = ratio.clamp(5, 95);
    match kind {
        LayoutKind::Horizontal => {
            let w1 = (area.w as u32 * ratio as u32 / 100) as u16;
            let a = Rect::new(area.x, area.y, w1, area.h);
            let b = Rect::new(area.x + w1, area.y, area.w - w1, area.h);
            (a, b)
        }
        LayoutKind::Vertical => {
            let h1 = (area.h as u32 * ratio as u32 / 100) as u16;
            let a = Rect::new(area.x, area.y, area.w, h1);
            let b = Rect::new(area.x, area.y + h1, area.w, area.h - h1);
            (a, b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_has_one_split() {
        let layout: Layout<i32> = Layout::new(1);
        assert_eq!(layout.split_count(), 1);
        assert_eq!(layout.get_focused_pane(), Some(&1));
    }

    #[test]
    fn split_doubles_leaf_count_and_focuses_new_leaf() {
        let mut layout = Layout::new(1);
        layout.split(0, LayoutKind::Horizontal, 2);
        assert_eq!(layout.split_count(), 2);
        assert_eq!(layout.get_focused_pane(), Some(&2));
    }

    #[test]
    fn resize_splits_rect_by_ratio() {
        let mut layout = Layout::new(1);
        layout.split(0, LayoutKind::Horizontal, 2);
        let mut seen = Vec::new();
        layout.resize(Rect::new(0, 0, 100, 10), |leaf, rect| seen.push((*leaf, rect)));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.w + seen[1].1.w, 100);
    }

    #[test]
    fn close_pane_collapses_to_sibling() {
        let mut layout = Layout::new(1);
        let second = layout.split(0, LayoutKind::Horizontal, 2).unwrap();
        let removed = layout.close_pane(second);
        assert_eq!(removed, Some(2));
        assert_eq!(layout.split_count(), 1);
        assert_eq!(layout.get_focused_pane(), Some(&1));
    }

    #[test]
    fn closing_last_pane_is_rejected() {
        let mut layout = Layout::new(1);
        assert_eq!(layout.close_pane(0), None);
        assert_eq!(layout.split_count(), 1);
    }

    #[test]
    fn nested_split_and_close_restores_parent_subtree() {
        let mut layout = Layout::new(1);
        let b = layout.split(0, LayoutKind::Horizontal, 2).unwrap();
        let c = layout.split(b, LayoutKind::Vertical, 3).unwrap();
        assert_eq!(layout.split_count(), 3);
        layout.close_pane(c);
        assert_eq!(layout.split_count(), 2);
        let leaves: Vec<i32> = layout.split_iterator().into_iter().map(|(_, v)| *v).collect();
        assert_eq!(leaves, vec![1, 2]);
    }

    #[test]
    fn export_then_from_tree_round_trips_structure_and_ratio() {
        let mut layout = Layout::new(1);
        let b = layout.split(0, LayoutKind::Horizontal, 2).unwrap();
        layout.adjust_ratio(b, 30);
        let tree = layout.export_tree(&mut |v| *v);
        let rebuilt = Layout::from_tree(tree);
        assert_eq!(rebuilt.split_count(), 2);
        let leaves: Vec<i32> = rebuilt.split_iterator().into_iter().map(|(_, v)| *v).collect();
        assert_eq!(leaves, vec![1, 2]);
        assert_eq!(rebuilt.get_focused_pane(), Some(&1));
    }

    #[test]
    fn export_tree_filtered_collapses_to_surviving_sibling() {
        let mut layout = Layout::new(1);
        layout.split(0, LayoutKind::Horizontal, 2);
        let tree = layout.export_tree_filtered(&mut |v| *v != 2, &mut |v| *v).unwrap();
        assert!(matches!(tree, LayoutTree::Leaf(1)));
    }

    #[test]
    fn export_tree_filtered_returns_none_when_nothing_survives() {
        let layout: Layout<i32> = Layout::new(1);
        assert!(layout.export_tree_filtered(&mut |_| false, &mut |v| *v).is_none());
    }

    #[test]
    fn export_tree_filtered_keeps_both_when_all_survive() {
        let mut layout = Layout::new(1);
        layout.split(0, LayoutKind::Horizontal, 2);
        let tree = layout.export_tree_filtered(&mut |_| true, &mut |v| *v).unwrap();
        assert!(matches!(tree, LayoutTree::Split { .. }));
    }
}
