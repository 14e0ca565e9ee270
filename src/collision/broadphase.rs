use glam::Vec2;

use crate::collision::{
    aabb::{Aabb, RayCastInput},
    dynamic_tree::DynamicTree,
};

/// Potentially overlapping pair reported by [`BroadPhase::update_pairs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyPair<T> {
    pub proxy_a: usize,
    pub proxy_b: usize,
    pub data_a: T,
    pub data_b: T,
}

/// Pair finder over a dynamic AABB tree.
///
/// Proxies that were created or escaped their fat box are buffered; only
/// those are queried when looking for new pairs.
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<usize>,
    pair_buffer: Vec<(usize, usize)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::new(),
            pair_buffer: Vec::new(),
        }
    }

    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> usize {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.buffer_move(proxy_id);
        proxy_id
    }

    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        self.unbuffer_move(proxy_id);
        self.tree.destroy_proxy(proxy_id);
    }

    pub fn move_proxy(&mut self, proxy_id: usize, aabb: &Aabb, displacement: Vec2) {
        if self.tree.move_proxy(proxy_id, aabb, displacement) {
            self.buffer_move(proxy_id);
        }
    }

    /// Forces the proxy to be re-paired on the next update.
    pub fn touch_proxy(&mut self, proxy_id: usize) {
        self.buffer_move(proxy_id);
    }

    pub fn fat_aabb(&self, proxy_id: usize) -> Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    pub fn user_data(&self, proxy_id: usize) -> Option<T> {
        self.tree.user_data(proxy_id)
    }

    pub fn test_overlap(&self, proxy_a: usize, proxy_b: usize) -> bool {
        self.tree
            .fat_aabb(proxy_a)
            .overlaps(&self.tree.fat_aabb(proxy_b))
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn move_count(&self) -> usize {
        self.move_buffer.len()
    }

    /// Reports each new overlapping pair exactly once, in ascending id order.
    pub fn update_pairs<F>(&mut self, mut callback: F)
    where
        F: FnMut(ProxyPair<T>),
    {
        self.pair_buffer.clear();

        for &query_proxy in &self.move_buffer {
            if query_proxy == usize::MAX {
                continue;
            }
            let fat = self.tree.fat_aabb(query_proxy);
            let tree = &self.tree;
            let pairs = &mut self.pair_buffer;
            let query_moved = tree.was_moved(query_proxy);
            tree.query(&fat, |proxy_id| {
                if proxy_id == query_proxy {
                    return true;
                }
                // Both moved: only the lower id reports the pair.
                if query_moved && tree.was_moved(proxy_id) && proxy_id > query_proxy {
                    return true;
                }
                pairs.push((proxy_id.min(query_proxy), proxy_id.max(query_proxy)));
                true
            });
        }

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(proxy_a, proxy_b) in &self.pair_buffer {
            let (Some(data_a), Some(data_b)) =
                (self.tree.user_data(proxy_a), self.tree.user_data(proxy_b))
            else {
                continue;
            };
            callback(ProxyPair {
                proxy_a,
                proxy_b,
                data_a,
                data_b,
            });
        }

        for &proxy_id in &self.move_buffer {
            if proxy_id != usize::MAX {
                self.tree.clear_moved(proxy_id);
            }
        }
        self.move_buffer.clear();
    }

    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, usize) -> f32,
    {
        self.tree.ray_cast(input, callback);
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    pub fn tree_quality(&self) -> f32 {
        self.tree.area_ratio()
    }

    pub fn validate(&self) -> bool {
        self.tree.validate()
    }

    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
    }

    fn buffer_move(&mut self, proxy_id: usize) {
        self.move_buffer.push(proxy_id);
    }

    fn unbuffer_move(&mut self, proxy_id: usize) {
        for slot in self.move_buffer.iter_mut().filter(|p| **p == proxy_id) {
            *slot = usize::MAX;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::from_center(Vec2::new(x, y), Vec2::splat(half))
    }

    fn collect_pairs(bp: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        bp.update_pairs(|pair| out.push((pair.data_a.min(pair.data_b), pair.data_a.max(pair.data_b))));
        out.sort_unstable();
        out
    }

    #[test]
    fn overlapping_pairs_reported_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&square(0.0, 0.0, 1.0), 0u32);
        bp.create_proxy(&square(1.0, 0.0, 1.0), 1);
        bp.create_proxy(&square(1.5, 0.5, 1.0), 2);
        bp.create_proxy(&square(50.0, 0.0, 1.0), 3);

        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(bp.move_count(), 0);

        // Nothing moved: nothing new to report.
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn moved_proxy_is_re_paired() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&square(0.0, 0.0, 0.5), 0u32);
        let b = bp.create_proxy(&square(10.0, 0.0, 0.5), 1);
        assert!(collect_pairs(&mut bp).is_empty());
        assert!(!bp.test_overlap(a, b));

        bp.move_proxy(a, &square(9.5, 0.0, 0.5), Vec2::new(9.5, 0.0));
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
        assert!(bp.test_overlap(a, b));
    }

    #[test]
    fn destroyed_proxy_is_not_reported() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&square(0.0, 0.0, 1.0), 0u32);
        let b = bp.create_proxy(&square(0.5, 0.0, 1.0), 1);
        bp.destroy_proxy(b);
        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 1);
        assert!(bp.validate());
    }
}
