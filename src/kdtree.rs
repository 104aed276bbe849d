//! The `kdtree` module builds the packed k-d tree over the localisation table and runs the
//! branch-and-bound nearest-neighbour search over it.
//!
//! The tree is balanced without ever re-sorting on the latitude axis: points are inserted in
//! the pre-order schedule of a longitude-sorted array, so every level of the tree receives
//! the median of the index interval that remains for its subtree.
use crate::error::GeocodeResult;
use crate::geo::{
    FRANCE_EAST, FRANCE_NORTH, FRANCE_SOUTH, FRANCE_WEST, degree, int_to_degree, radian,
    spherical,
};
use crate::paths::{Paths, TableKind};
use crate::table::{KdNode, Localisation, Table, TableWriter};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use tracing::info;

/// The `pre_order` function lists the integers `0..size` in the order a balanced binary tree
/// over that interval enumerates its nodes: recursive half-open bisection, midpoints first.
pub fn pre_order(size: usize) -> Vec<usize> {
    let mut schedule = Vec::with_capacity(size);
    let mut intervals = VecDeque::with_capacity(size);
    if size > 0 {
        intervals.push_back((0, size));
    }

    while let Some((start, end)) = intervals.pop_front() {
        let mid = (start + end) / 2;
        schedule.push(mid);
        if mid > start {
            intervals.push_back((start, mid));
        }
        if mid + 1 < end {
            intervals.push_back((mid + 1, end));
        }
    }
    schedule
}

/// In-memory tree under construction. Node ids are allocation order, which is also the order
/// the serialized table is laid out in; node 0 is the root.
struct KdTree {
    nodes: Vec<KdNode>,
}

impl KdTree {
    fn with_capacity(capacity: usize) -> Self {
        KdTree {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a point by iterative descent. The new node inherits its parent's region with
    /// the parent's coordinate closing the side it descended to, and splits on the next axis.
    fn insert(&mut self, longitude: i32, latitude: i32, ref_id: i32) {
        if self.nodes.is_empty() {
            self.nodes.push(KdNode::new(
                longitude,
                latitude,
                FRANCE_WEST,
                FRANCE_EAST,
                FRANCE_SOUTH,
                FRANCE_NORTH,
                0,
                -1,
                -1,
                ref_id,
            ));
            return;
        }

        let mut current = 0;
        loop {
            let parent = self.nodes[current];
            let (coordinate, split) = match parent.dimension {
                0 => (longitude, parent.longitude),
                _ => (latitude, parent.latitude),
            };
            let goes_left = coordinate < split;
            let next = if goes_left { parent.left } else { parent.right };
            if next != -1 {
                current = next as usize;
                continue;
            }

            let mut node = KdNode::new(
                longitude,
                latitude,
                parent.limit_left,
                parent.limit_right,
                parent.limit_bottom,
                parent.limit_top,
                (parent.dimension + 1) % 2,
                -1,
                -1,
                ref_id,
            );
            match (parent.dimension, goes_left) {
                (0, true) => node.limit_right = parent.longitude,
                (0, false) => node.limit_left = parent.longitude,
                (_, true) => node.limit_top = parent.latitude,
                (_, false) => node.limit_bottom = parent.latitude,
            }

            let id = self.nodes.len() as i32;
            if goes_left {
                self.nodes[current].left = id;
            } else {
                self.nodes[current].right = id;
            }
            self.nodes.push(node);
            return;
        }
    }
}

/// The `create_kdtree` method reads the localisation table and writes the `kdtree` table: one
/// node per localisation row, in allocation order, with `ref_id` pointing back at the row.
pub fn create_kdtree(paths: &Paths) -> GeocodeResult<()> {
    let localisation: Table<Localisation> = Table::open(paths.table(TableKind::Localisation))?;
    let size = localisation.len();

    let longitudes: Vec<i32> = localisation.iter().map(|row| row.longitude).collect();
    let mut indices: Vec<i32> = (0..size as i32).collect();
    indices.sort_by_key(|&row| longitudes[row as usize]);

    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
    )
    .unwrap();
    let bar = ProgressBar::new(size as u64)
        .with_style(style)
        .with_message("Loading kd-tree.");

    let mut tree = KdTree::with_capacity(size);
    for i in pre_order(size) {
        let row = indices[i];
        let point = localisation.get(row);
        tree.insert(point.longitude, point.latitude, row);
        bar.inc(1);
    }
    bar.finish();

    let mut writer = TableWriter::create(paths.table(TableKind::Kdtree))?;
    for node in &tree.nodes {
        writer.push(node)?;
    }
    let count = writer.finish()?;
    info!("Kd-tree table written: {} nodes.", count);
    Ok(())
}

/// The `nearest` function returns the node id and great-circle distance (in degrees of arc)
/// of the tree point closest to `query`, or `None` on an empty tree.
pub fn nearest(kdtree: &Table<KdNode>, query: (f64, f64)) -> Option<(i32, f64)> {
    if kdtree.is_empty() {
        return None;
    }
    let mut best = None;
    descend(kdtree, 0, query, &mut best);
    best
}

fn descend(kdtree: &Table<KdNode>, id: i32, query: (f64, f64), best: &mut Option<(i32, f64)>) {
    let node = kdtree.get(id);
    let (coordinate, split) = match node.dimension {
        0 => (query.0, int_to_degree(node.longitude)),
        _ => (query.1, int_to_degree(node.latitude)),
    };
    let (near, far) = if coordinate < split {
        (node.left, node.right)
    } else {
        (node.right, node.left)
    };

    if near != -1 {
        descend(kdtree, near, query, best);
    }

    let point = (int_to_degree(node.longitude), int_to_degree(node.latitude));
    let distance = spherical(query, point);
    if best.is_none_or(|(_, d)| distance < d) {
        *best = Some((id, distance));
    }

    // The far half is worth a look only if no point of its region can beat the best distance.
    if far != -1
        && let Some((_, radius)) = *best
    {
        let node = kdtree.get(far);
        if region_distance(query, &node) <= radius {
            descend(kdtree, far, query, best);
        }
    }
}

/// Smallest great-circle distance from `query` to any point of the node's region, in degrees
/// of arc.
///
/// With the query's longitude clamped into the region, the nearest point sits on the query's
/// meridian. Otherwise it sits on the nearest meridian edge, at the latitude maximizing
/// closeness for the residual longitude gap; a per-axis degree comparison would overestimate
/// here, since a degree of longitude spans less arc than a degree of latitude.
fn region_distance(query: (f64, f64), node: &KdNode) -> f64 {
    let longitude = query
        .0
        .clamp(int_to_degree(node.limit_left), int_to_degree(node.limit_right));
    let (bottom, top) = (int_to_degree(node.limit_bottom), int_to_degree(node.limit_top));
    let latitude = if longitude == query.0 {
        query.1.clamp(bottom, top)
    } else {
        let gap = radian((query.0 - longitude).abs());
        let closest = radian(query.1).sin().atan2(radian(query.1).cos() * gap.cos());
        degree(closest).clamp(bottom, top)
    };
    spherical(query, (longitude, latitude))
}
