//! 2D k-d tree over projected coordinates
//!
//! Points are `[x, y]` pairs in a local metric projection and are referred
//! to by their index in the slice the tree was built from, so callers keep
//! their own per-point state (chosen, excluded, ...) in parallel vectors.
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

/// A 2D k-d tree for nearest and radius queries.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<[f64; 2]>,
}

#[derive(Debug)]
struct KdNode {
    /// Index into `points`
    point_idx: usize,
    /// Split dimension: 0 = x, 1 = y
    split_dim: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// A point returned by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index in the slice the tree was built from
    pub index: usize,
    pub distance_sq: f64,
}

impl Neighbor {
    pub fn distance(&self) -> f64 {
        self.distance_sq.sqrt()
    }
}

impl KdTree {
    /// Build a k-d tree with median splits, O(n log² n).
    pub fn build(points: &[[f64; 2]]) -> Self {
        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            build_recursive(points, &mut indices, 0, &mut nodes);
        }
        Self {
            nodes,
            points: points.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Nearest point to (qx, qy).
    pub fn nearest(&self, qx: f64, qy: f64) -> Option<Neighbor> {
        self.nearest_where(qx, qy, |_| true)
    }

    /// Nearest point to (qx, qy) among indices accepted by `accept`.
    ///
    /// Rejected points still guide the descent, so the cost grows with the
    /// number of rejected points near the query.
    pub fn nearest_where<F>(&self, qx: f64, qy: f64, accept: F) -> Option<Neighbor>
    where
        F: Fn(usize) -> bool,
    {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<Neighbor> = None;
        self.nearest_recursive(0, qx, qy, &accept, &mut best);
        best
    }

    /// All points within `radius` of (qx, qy), in no particular order.
    pub fn within_radius(&self, qx: f64, qy: f64, radius: f64) -> Vec<Neighbor> {
        let mut results = Vec::new();
        if self.nodes.is_empty() || radius < 0.0 {
            return results;
        }
        self.radius_recursive(0, qx, qy, radius * radius, &mut results);
        results
    }

    fn nearest_recursive<F>(
        &self,
        node_idx: usize,
        qx: f64,
        qy: f64,
        accept: &F,
        best: &mut Option<Neighbor>,
    ) where
        F: Fn(usize) -> bool,
    {
        let node = &self.nodes[node_idx];
        let [px, py] = self.points[node.point_idx];
        let (dx, dy) = (qx - px, qy - py);
        let dist_sq = dx * dx + dy * dy;

        let best_sq = best.map_or(f64::INFINITY, |b| b.distance_sq);
        if dist_sq < best_sq && accept(node.point_idx) {
            *best = Some(Neighbor {
                index: node.point_idx,
                distance_sq: dist_sq,
            });
        }

        let diff = if node.split_dim == 0 { dx } else { dy };
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = first {
            self.nearest_recursive(child, qx, qy, accept, best);
        }

        let best_sq = best.map_or(f64::INFINITY, |b| b.distance_sq);
        if diff * diff < best_sq {
            if let Some(child) = second {
                self.nearest_recursive(child, qx, qy, accept, best);
            }
        }
    }

    fn radius_recursive(
        &self,
        node_idx: usize,
        qx: f64,
        qy: f64,
        radius_sq: f64,
        results: &mut Vec<Neighbor>,
    ) {
        let node = &self.nodes[node_idx];
        let [px, py] = self.points[node.point_idx];
        let (dx, dy) = (qx - px, qy - py);
        let dist_sq = dx * dx + dy * dy;

        if dist_sq <= radius_sq {
            results.push(Neighbor {
                index: node.point_idx,
                distance_sq: dist_sq,
            });
        }

        let diff = if node.split_dim == 0 { dx } else { dy };

        if let Some(left) = node.left {
            if diff > 0.0 || diff * diff <= radius_sq {
                self.radius_recursive(left, qx, qy, radius_sq, results);
            }
        }
        if let Some(right) = node.right {
            if diff < 0.0 || diff * diff <= radius_sq {
                self.radius_recursive(right, qx, qy, radius_sq, results);
            }
        }
    }
}

fn build_recursive(
    points: &[[f64; 2]],
    indices: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let split_dim = depth % 2;
    indices.sort_by(|&a, &b| points[a][split_dim].total_cmp(&points[b][split_dim]));

    let median = indices.len() / 2;
    let node_idx = nodes.len();
    nodes.push(KdNode {
        point_idx: indices[median],
        split_dim,
        left: None,
        right: None,
    });

    let (left, rest) = indices.split_at_mut(median);
    let right = &mut rest[1..];

    if !left.is_empty() {
        let child = build_recursive(points, left, depth + 1, nodes);
        nodes[node_idx].left = Some(child);
    }
    if !right.is_empty() {
        let child = build_recursive(points, right, depth + 1, nodes);
        nodes[node_idx].right = Some(child);
    }

    node_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<[f64; 2]> {
        vec![
            [2.0, 3.0],
            [5.0, 4.0],
            [9.0, 6.0],
            [4.0, 7.0],
            [8.0, 1.0],
            [7.0, 2.0],
            [1.0, 8.0],
            [6.0, 5.0],
        ]
    }

    fn brute_force(pts: &[[f64; 2]], qx: f64, qy: f64, accept: impl Fn(usize) -> bool) -> Option<f64> {
        pts.iter()
            .enumerate()
            .filter(|(i, _)| accept(*i))
            .map(|(_, p)| (p[0] - qx).powi(2) + (p[1] - qy).powi(2))
            .min_by(|a, b| a.total_cmp(b))
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.nearest(0.0, 0.0).is_none());
        assert!(tree.within_radius(0.0, 0.0, 10.0).is_empty());
    }

    #[test]
    fn test_nearest_exact() {
        let tree = KdTree::build(&sample_points());
        let n = tree.nearest(5.0, 4.0).unwrap();
        assert_eq!(n.index, 1);
        assert!(n.distance_sq < 1e-12);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);
        for qx in 0..10 {
            for qy in 0..10 {
                let (qx, qy) = (qx as f64 + 0.5, qy as f64 + 0.5);
                let got = tree.nearest(qx, qy).unwrap().distance_sq;
                let want = brute_force(&pts, qx, qy, |_| true).unwrap();
                assert!((got - want).abs() < 1e-10, "mismatch at ({qx}, {qy})");
            }
        }
    }

    #[test]
    fn nearest_where_skips_rejected_points() {
        let pts = sample_points();
        let tree = KdTree::build(&pts);
        let taken = [1usize, 7];
        for qx in 0..10 {
            for qy in 0..10 {
                let (qx, qy) = (qx as f64, qy as f64);
                let got = tree.nearest_where(qx, qy, |i| !taken.contains(&i)).unwrap();
                assert!(!taken.contains(&got.index));
                let want = brute_force(&pts, qx, qy, |i| !taken.contains(&i)).unwrap();
                assert!((got.distance_sq - want).abs() < 1e-10);
            }
        }
        assert!(tree.nearest_where(0.0, 0.0, |_| false).is_none());
    }

    #[test]
    fn test_within_radius() {
        let tree = KdTree::build(&sample_points());
        let mut found: Vec<usize> = tree.within_radius(5.5, 4.5, 1.0).iter().map(|n| n.index).collect();
        found.sort_unstable();
        // (5, 4) and (6, 5) are both ~0.707 away
        assert_eq!(found, vec![1, 7]);
    }
}
