//! Node split heuristics.
//!
//! Both strategies divide an overflowing entry list into two lists of at
//! least `min` entries each. They only influence the tree's shape; any split
//! that keeps both halves within the fanout bounds keeps the tree valid.

use super::rtree_types::{ChildEntry, LeafEntry};
use crate::bounding_box::BoundingBox;
use crate::options::SplitStrategy;
use std::cmp::Ordering;

/// An entry with a box and a position on the Hilbert curve.
pub(crate) trait Bounded {
    fn bbox(&self) -> BoundingBox;
    fn hilbert(&self) -> u128;
}

impl Bounded for LeafEntry {
    fn bbox(&self) -> BoundingBox {
        BoundingBox::point(&self.point)
    }

    fn hilbert(&self) -> u128 {
        self.hilbert
    }
}

impl Bounded for ChildEntry {
    fn bbox(&self) -> BoundingBox {
        self.bbox.clone()
    }

    fn hilbert(&self) -> u128 {
        self.largest_hilbert
    }
}

/// Divides `entries` into two groups of at least `min` entries.
///
/// # Arguments
/// * `entries` - At least `2 * min` entries
/// * `min` - Minimum fanout
/// * `strategy` - The heuristic to apply
///
/// # Returns
/// The two groups; the first one keeps the id of the node being split.
pub(crate) fn split_entries<T: Bounded>(
    entries: Vec<T>,
    min: usize,
    strategy: SplitStrategy,
) -> (Vec<T>, Vec<T>) {
    debug_assert!(entries.len() >= 2 * min);
    match strategy {
        SplitStrategy::Hilbert => hilbert_split(entries, min),
        SplitStrategy::Quadratic => quadratic_split(entries, min),
    }
}

/// Cuts the Hilbert-ordered sequence where the halves overlap least,
/// breaking ties by total area.
fn hilbert_split<T: Bounded>(mut entries: Vec<T>, min: usize) -> (Vec<T>, Vec<T>) {
    entries.sort_by_key(|e| e.hilbert());
    let boxes: Vec<BoundingBox> = entries.iter().map(|e| e.bbox()).collect();
    let n = boxes.len();

    let mut prefix: Vec<BoundingBox> = Vec::with_capacity(n);
    for bbox in &boxes {
        let next = match prefix.last() {
            Some(last) => last.union(bbox),
            None => bbox.clone(),
        };
        prefix.push(next);
    }
    let mut suffix: Vec<BoundingBox> = boxes.clone();
    for i in (0..n.saturating_sub(1)).rev() {
        suffix[i] = suffix[i].union(&suffix[i + 1]);
    }

    let mut best = (min, f64::INFINITY, f64::INFINITY);
    for k in min..=(n - min) {
        let left = &prefix[k - 1];
        let right = &suffix[k];
        let overlap = left.overlap(right);
        let area = left.area() + right.area();
        let better = overlap
            .total_cmp(&best.1)
            .then(area.total_cmp(&best.2))
            == Ordering::Less;
        if better {
            best = (k, overlap, area);
        }
    }

    let right = entries.split_off(best.0);
    (entries, right)
}

fn waste(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let d = a.union(b).area() - a.area() - b.area();
    if d.is_nan() {
        0.0
    } else {
        d
    }
}

/// Guttman's quadratic split: seed with the most wasteful pair, then assign
/// the entry with the strongest preference first.
fn quadratic_split<T: Bounded>(entries: Vec<T>, min: usize) -> (Vec<T>, Vec<T>) {
    let boxes: Vec<BoundingBox> = entries.iter().map(|e| e.bbox()).collect();
    let n = boxes.len();

    let (mut seed_a, mut seed_b, mut worst) = (0, 1, f64::NEG_INFINITY);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = waste(&boxes[i], &boxes[j]);
            if d > worst {
                (seed_a, seed_b, worst) = (i, j, d);
            }
        }
    }

    let mut groups: [Vec<usize>; 2] = [vec![seed_a], vec![seed_b]];
    let mut covers = [boxes[seed_a].clone(), boxes[seed_b].clone()];
    let mut remaining: Vec<usize> = (0..n).filter(|i| *i != seed_a && *i != seed_b).collect();

    while !remaining.is_empty() {
        if let Some(g) = (0..2).find(|g| groups[*g].len() + remaining.len() <= min) {
            groups[g].append(&mut remaining);
            break;
        }

        let mut pick = (0, 0.0, 0.0);
        let mut strongest = f64::NEG_INFINITY;
        for (pos, &i) in remaining.iter().enumerate() {
            let d0 = covers[0].enlargement(&boxes[i]);
            let d1 = covers[1].enlargement(&boxes[i]);
            let preference = (d0 - d1).abs();
            if preference.is_nan() || preference > strongest {
                strongest = if preference.is_nan() { f64::INFINITY } else { preference };
                pick = (pos, d0, d1);
            }
        }
        let (pos, d0, d1) = pick;
        let i = remaining.remove(pos);

        let target = match d0.total_cmp(&d1) {
            Ordering::Less => 0,
            Ordering::Greater => 1,
            Ordering::Equal => match covers[0].area().total_cmp(&covers[1].area()) {
                Ordering::Less => 0,
                Ordering::Greater => 1,
                Ordering::Equal => usize::from(groups[1].len() < groups[0].len()),
            },
        };
        covers[target].expand(&boxes[i]);
        groups[target].push(i);
    }

    let mut slots: Vec<Option<T>> = entries.into_iter().map(Some).collect();
    let [mut first, mut second] = groups;
    first.sort_unstable();
    second.sort_unstable();
    let left = first.into_iter().filter_map(|i| slots[i].take()).collect();
    let right = second.into_iter().filter_map(|i| slots[i].take()).collect();
    (left, right)
}
