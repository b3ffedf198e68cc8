use bit_set::BitSet;

/// Working cluster state for one agglomeration run: one slot per input taxon,
/// each holding the set of taxon indices currently grouped under it, plus a
/// retired set for slots whose contents have been merged away.
///
/// Active slots always hold pairwise-disjoint member sets whose union is the
/// full taxon set.
#[derive(Debug, Clone)]
pub struct ClusterSet {
    members: Vec<BitSet>,
    retired: BitSet,
    n: usize,
}

impl ClusterSet {
    /// One singleton cluster per taxon, all active.
    pub fn singletons(n: usize) -> Self {
        let members = (0..n)
            .map(|i| {
                let mut bs = BitSet::with_capacity(n);
                bs.insert(i);
                bs
            })
            .collect();

        ClusterSet {
            members,
            retired: BitSet::with_capacity(n),
            n,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn is_active(&self, i: usize) -> bool {
        !self.retired.contains(i)
    }

    /// Taxon count of the cluster at slot `i`.
    pub fn cardinality(&self, i: usize) -> usize {
        self.members[i].len()
    }

    pub fn members(&self, i: usize) -> &BitSet {
        &self.members[i]
    }

    /// Moves the members of slot `j` into slot `i` and retires `j` for good.
    pub fn merge(&mut self, i: usize, j: usize) {
        let other = std::mem::take(&mut self.members[j]);
        self.members[i].union_with(&other);
        self.retired.insert(j);
    }

    /// First active slot at or after `from`. Panics if none remains, which
    /// violates the loop invariant.
    pub fn next_active(&self, from: usize) -> usize {
        (from..self.n)
            .find(|&i| self.is_active(i))
            .expect("an active cluster slot remains")
    }
}
