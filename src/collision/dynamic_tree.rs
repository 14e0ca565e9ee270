//! Dynamic AABB tree.
//!
//! Self-balancing binary tree of fattened AABBs. Leaves are proxies handed out
//! to the broad-phase; internal nodes bound their children. Moving a proxy only
//! touches the tree when its tight box escapes the fat box, so slow bodies
//! rarely cause re-insertion.

use glam::Vec2;

use crate::{
    collision::aabb::{Aabb, RayCastInput},
    config::{AABB_EXTENSION, AABB_MULTIPLIER},
    utils::math::cross_sv,
};

/// Null node sentinel.
pub const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fat AABB for leaves, enclosing AABB for internal nodes.
    aabb: Aabb,
    user_data: Option<T>,
    /// Parent index, or next free node while on the free list.
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
    moved: bool,
}

impl<T> TreeNode<T> {
    fn empty() -> Self {
        Self {
            aabb: Aabb::default(),
            user_data: None,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            moved: false,
        }
    }

    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree storing a `T` per proxy.
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: usize,
    proxy_count: usize,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            proxy_count: 0,
        }
    }

    /// Inserts a proxy for `aabb` and returns its id.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> usize {
        debug_assert!(aabb.is_valid(), "proxy AABB must be finite and ordered");
        let proxy_id = self.allocate_node();
        {
            let node = &mut self.nodes[proxy_id];
            node.aabb = aabb.fattened(AABB_EXTENSION);
            node.user_data = Some(user_data);
            node.height = 0;
            node.moved = true;
        }
        self.insert_leaf(proxy_id);
        self.proxy_count += 1;
        proxy_id
    }

    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        debug_assert!(self.is_proxy(proxy_id));
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Updates a proxy with a new tight AABB and predicted displacement.
    ///
    /// Returns `true` when the proxy was re-inserted; the caller should then
    /// buffer it for pair finding.
    pub fn move_proxy(&mut self, proxy_id: usize, aabb: &Aabb, displacement: Vec2) -> bool {
        debug_assert!(aabb.is_valid(), "proxy AABB must be finite and ordered");
        debug_assert!(self.is_proxy(proxy_id));

        let mut fat = aabb.fattened(AABB_EXTENSION);
        let d = AABB_MULTIPLIER * displacement;
        if d.x < 0.0 {
            fat.lower.x += d.x;
        } else {
            fat.upper.x += d.x;
        }
        if d.y < 0.0 {
            fat.lower.y += d.y;
        } else {
            fat.upper.y += d.y;
        }

        let tree_aabb = self.nodes[proxy_id].aabb;
        if tree_aabb.contains(aabb) {
            // Shrink boxes that have grown far larger than the motion needs.
            let huge = fat.fattened(4.0 * AABB_EXTENSION);
            if huge.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id].aabb = fat;
        self.insert_leaf(proxy_id);
        self.nodes[proxy_id].moved = true;
        true
    }

    pub fn user_data(&self, proxy_id: usize) -> Option<T> {
        self.nodes.get(proxy_id).and_then(|n| n.user_data)
    }

    pub fn fat_aabb(&self, proxy_id: usize) -> Aabb {
        self.nodes[proxy_id].aabb
    }

    pub fn was_moved(&self, proxy_id: usize) -> bool {
        self.nodes[proxy_id].moved
    }

    pub fn clear_moved(&mut self, proxy_id: usize) {
        self.nodes[proxy_id].moved = false;
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Height of the root, zero for an empty tree.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Largest height difference between two siblings.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of node perimeters over the root perimeter; a tree quality metric.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        if root_area <= 0.0 {
            return 0.0;
        }
        let total: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        total / root_area
    }

    /// Calls `callback` for each proxy whose fat AABB overlaps `aabb`.
    /// Returning `false` from the callback stops the query.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Casts a ray against the proxies.
    ///
    /// The callback returns the new max fraction: `0` terminates, a value
    /// between `0` and the current max clips the ray, and the current max
    /// (or anything negative) continues unchanged.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, usize) -> f32,
    {
        if self.root == NULL_NODE {
            return;
        }
        let p1 = input.p1;
        let p2 = input.p2;
        let r = p2 - p1;
        if r.length_squared() <= 0.0 {
            return;
        }
        let r = r.normalize();

        // Separating axis for segment: |dot(v, p1 - c)| > dot(|v|, h)
        let v = cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |fraction: f32| {
            let t = p1 + fraction * (p2 - p1);
            Aabb::new(p1.min(t), p1.max(t))
        };
        let mut segment = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(&segment) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, node_id);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 && value < max_fraction {
                    max_fraction = value;
                    segment = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Translates every node; used when the world origin shifts.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for node in &mut self.nodes {
            node.aabb.lower -= new_origin;
            node.aabb.upper -= new_origin;
        }
    }

    /// Checks structural invariants. Only meant for tests and debug builds.
    pub fn validate(&self) -> bool {
        if self.root != NULL_NODE && self.nodes[self.root].parent != NULL_NODE {
            return false;
        }
        if !self.validate_node(self.root) {
            return false;
        }

        let mut free_count = 0;
        let mut free = self.free_list;
        while free != NULL_NODE {
            free_count += 1;
            free = self.nodes[free].parent;
        }
        let live = self.nodes.iter().filter(|n| n.height >= 0).count();
        live + free_count == self.nodes.len()
    }

    fn validate_node(&self, index: usize) -> bool {
        if index == NULL_NODE {
            return true;
        }
        let node = &self.nodes[index];
        if node.is_leaf() {
            return node.child2 == NULL_NODE && node.height == 0 && node.user_data.is_some();
        }
        let (c1, c2) = (node.child1, node.child2);
        let child1 = &self.nodes[c1];
        let child2 = &self.nodes[c2];
        let bounds = child1.aabb.union(&child2.aabb);
        node.height == 1 + child1.height.max(child2.height)
            && child1.parent == index
            && child2.parent == index
            && bounds.lower == node.aabb.lower
            && bounds.upper == node.aabb.upper
            && self.validate_node(c1)
            && self.validate_node(c2)
    }

    fn is_proxy(&self, id: usize) -> bool {
        id < self.nodes.len() && self.nodes[id].height == 0 && self.nodes[id].is_leaf()
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list == NULL_NODE {
            self.nodes.push(TreeNode::empty());
            return self.nodes.len() - 1;
        }
        let id = self.free_list;
        self.free_list = self.nodes[id].parent;
        self.nodes[id] = TreeNode::empty();
        id
    }

    fn free_node(&mut self, id: usize) {
        let node = &mut self.nodes[id];
        *node = TreeNode::empty();
        node.parent = self.free_list;
        self.free_list = id;
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Surface area heuristic descent.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            let cost = 2.0 * combined_area;
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb, inheritance_cost);
            let cost2 = self.descend_cost(child2, &leaf_aabb, inheritance_cost);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }
        let sibling = index;

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_aabb = self.nodes[sibling].aabb;
            let sibling_height = self.nodes[sibling].height;
            let node = &mut self.nodes[new_parent];
            node.parent = old_parent;
            node.aabb = leaf_aabb.union(&sibling_aabb);
            node.height = sibling_height + 1;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].child1 == sibling {
            self.nodes[old_parent].child1 = new_parent;
        } else {
            self.nodes[old_parent].child2 = new_parent;
        }

        self.refit_from(self.nodes[leaf].parent);
    }

    fn descend_cost(&self, child: usize, leaf_aabb: &Aabb, inheritance_cost: f32) -> f32 {
        let node = &self.nodes[child];
        let combined = leaf_aabb.union(&node.aabb).perimeter();
        if node.is_leaf() {
            combined + inheritance_cost
        } else {
            combined - node.aabb.perimeter() + inheritance_cost
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
            return;
        }

        if self.nodes[grand_parent].child1 == parent {
            self.nodes[grand_parent].child1 = sibling;
        } else {
            self.nodes[grand_parent].child2 = sibling;
        }
        self.nodes[sibling].parent = grand_parent;
        self.free_node(parent);

        self.refit_from(grand_parent);
    }

    /// Walks to the root, rebalancing and refitting bounds.
    fn refit_from(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            let height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            let aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);
            self.nodes[index].height = height;
            self.nodes[index].aabb = aabb;

            index = self.nodes[index].parent;
        }
    }

    /// Rotates `a` left or right if its subtree is imbalanced.
    /// Returns the index of the new subtree root.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }

        let b = self.nodes[a].child1;
        let c = self.nodes[a].child2;
        let balance = self.nodes[c].height - self.nodes[b].height;

        if balance > 1 {
            return self.rotate_up(a, c, b, false);
        }
        if balance < -1 {
            return self.rotate_up(a, b, c, true);
        }
        a
    }

    /// Promotes `child` above `a`; `other` stays under `a`.
    /// `child_is_first` tells which slot of `a` held `child`.
    fn rotate_up(&mut self, a: usize, child: usize, other: usize, child_is_first: bool) -> usize {
        let f = self.nodes[child].child1;
        let g = self.nodes[child].child2;

        // Swap a and child.
        let a_parent = self.nodes[a].parent;
        self.nodes[child].child1 = a;
        self.nodes[child].parent = a_parent;
        self.nodes[a].parent = child;

        if a_parent == NULL_NODE {
            self.root = child;
        } else if self.nodes[a_parent].child1 == a {
            self.nodes[a_parent].child1 = child;
        } else {
            self.nodes[a_parent].child2 = child;
        }

        // Keep the taller grandchild above.
        let (keep, lower) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[child].child2 = keep;
        if child_is_first {
            self.nodes[a].child1 = lower;
        } else {
            self.nodes[a].child2 = lower;
        }
        self.nodes[lower].parent = a;

        let a_aabb = self.nodes[other].aabb.union(&self.nodes[lower].aabb);
        let a_height = 1 + self.nodes[other].height.max(self.nodes[lower].height);
        self.nodes[a].aabb = a_aabb;
        self.nodes[a].height = a_height;

        let child_aabb = a_aabb.union(&self.nodes[keep].aabb);
        let child_height = 1 + a_height.max(self.nodes[keep].height);
        self.nodes[child].aabb = child_aabb;
        self.nodes[child].height = child_height;

        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32) -> Aabb {
        Aabb::from_center(Vec2::new(x, y), Vec2::splat(0.5))
    }

    #[test]
    fn tree_stays_balanced_under_many_inserts() {
        let mut tree = DynamicTree::new();
        for i in 0..256 {
            tree.create_proxy(&unit_box(i as f32 * 2.0, 0.0), i);
        }
        assert!(tree.validate());
        assert_eq!(tree.proxy_count(), 256);
        assert!(tree.max_balance() <= 1);
        // A perfectly balanced tree of 256 leaves has height 8.
        assert!(tree.height() <= 12, "height {}", tree.height());
    }

    #[test]
    fn query_finds_overlapping_proxies_only() {
        let mut tree = DynamicTree::new();
        let a = tree.create_proxy(&unit_box(0.0, 0.0), 'a');
        let _b = tree.create_proxy(&unit_box(10.0, 0.0), 'b');
        let mut hits = Vec::new();
        tree.query(&unit_box(0.5, 0.5), |id| {
            hits.push(id);
            true
        });
        assert_eq!(hits, vec![a]);
        assert_eq!(tree.user_data(a), Some('a'));
    }

    #[test]
    fn small_moves_stay_inside_fat_box() {
        let mut tree = DynamicTree::new();
        let id = tree.create_proxy(&unit_box(0.0, 0.0), 0u32);
        tree.clear_moved(id);
        assert!(!tree.move_proxy(id, &unit_box(0.01, 0.0), Vec2::new(0.01, 0.0)));
        assert!(!tree.was_moved(id));
        assert!(tree.move_proxy(id, &unit_box(3.0, 0.0), Vec2::new(3.0, 0.0)));
        assert!(tree.was_moved(id));
        assert!(tree.fat_aabb(id).contains(&unit_box(3.0, 0.0)));
        assert!(tree.validate());
    }

    #[test]
    fn destroyed_nodes_are_recycled() {
        let mut tree = DynamicTree::new();
        let ids: Vec<_> = (0..16)
            .map(|i| tree.create_proxy(&unit_box(i as f32, i as f32), i))
            .collect();
        for id in &ids[..8] {
            tree.destroy_proxy(*id);
        }
        assert!(tree.validate());
        assert_eq!(tree.proxy_count(), 8);
        let reused = tree.create_proxy(&unit_box(50.0, 0.0), 99);
        assert!(reused < 31);
        assert!(tree.validate());
    }

    #[test]
    fn ray_cast_clips_to_closest_hit() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(&unit_box(5.0, 0.0), 5.0_f32);
        tree.create_proxy(&unit_box(2.0, 0.0), 2.0_f32);
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        let mut visited = Vec::new();
        tree.ray_cast(&input, |sub, id| {
            let x = tree.user_data(id).unwrap_or_default();
            visited.push(x);
            let fraction = (x - 0.5) / 10.0;
            if fraction < sub.max_fraction {
                fraction
            } else {
                sub.max_fraction
            }
        });
        assert!(visited.contains(&2.0));
    }
}
