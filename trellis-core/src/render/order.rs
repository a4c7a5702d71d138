//! Sequence helpers for the child-list diff.

/// Positions in `values` of one longest strictly increasing subsequence.
///
/// Runs in `O(n log n)`. Among equally long runs, the one ending on the
/// smallest values wins.
pub(crate) fn longest_increasing(values: &[usize]) -> Vec<usize> {
    // tails[k]: position of the smallest tail of any increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];

    for (position, &value) in values.iter().enumerate() {
        let length = tails.partition_point(|&tail| values[tail] < value);
        if length > 0 {
            previous[position] = Some(tails[length - 1]);
        }
        if length == tails.len() {
            tails.push(position);
        } else {
            tails[length] = position;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        run.push(position);
        cursor = previous[position];
    }
    run.reverse();
    run
}

/// Weighted slots with `O(log n)` prefix sums (a Fenwick tree).
#[derive(Debug)]
pub(crate) struct PrefixSums {
    tree: Vec<isize>,
    weights: Vec<usize>,
}

impl PrefixSums {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            tree: vec![0; len + 1],
            weights: vec![0; len],
        }
    }

    pub(crate) fn set(&mut self, slot: usize, weight: usize) {
        let delta = weight as isize - self.weights[slot] as isize;
        self.weights[slot] = weight;
        let mut i = slot + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    /// Total weight of the slots before `slot`.
    pub(crate) fn prefix(&self, slot: usize) -> usize {
        let mut sum = 0;
        let mut i = slot;
        while i > 0 {
            sum += self.tree[i];
            i -= i & i.wrapping_neg();
        }
        sum.max(0) as usize
    }
}
