use crate::error::{TreeError, TreeResult};

use super::cluster::ClusterSet;
use super::matrix::DistanceMatrix;
use super::model::TreeModel;
use super::node::TreeNode;
use super::taxon::Taxon;

/// The two supported agglomeration strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Size-weighted average distance (UPGMA); yields an ultrametric tree.
    AverageDistance,
    /// Saitou-Nei style neighbour joining with rate correction.
    NeighbourJoining,
}

/// Output of the agglomeration loop: the node arena and the index of the
/// root created by the final merge.
#[derive(Debug)]
pub struct BuiltTree {
    pub nodes: Vec<TreeNode>,
    pub root: usize,
}

/// Turns N singleton clusters plus a distance matrix into one root node via
/// N-1 merges. The matrix and cluster sets are working state owned by the
/// builder and are discarded when `cluster` returns.
pub struct TreeBuilder {
    linkage: Linkage,
    noseqs: usize,
    noclus: usize,
    distances: DistanceMatrix,
    clusters: ClusterSet,
    nodes: Vec<TreeNode>,
    /// Cluster slot -> arena index of the node currently standing for it.
    slot: Vec<usize>,
    mini: usize,
    minj: usize,
    ri: f64,
    rj: f64,
}

impl TreeBuilder {
    pub fn new(
        distances: DistanceMatrix,
        taxa: &[Taxon],
        linkage: Linkage,
    ) -> TreeResult<Self> {
        let n = taxa.len();
        if n < 2 {
            return Err(TreeError::TooFewTaxa { n });
        }
        if distances.n() != n {
            return Err(TreeError::MatrixSizeMismatch {
                len: distances.n(),
                n,
            });
        }

        let nodes = taxa
            .iter()
            .map(|t| TreeNode::leaf(t.name.clone(), Some(t.id)))
            .collect();

        Ok(TreeBuilder {
            linkage,
            noseqs: n,
            noclus: n,
            distances,
            clusters: ClusterSet::singletons(n),
            nodes,
            slot: (0..n).collect(),
            mini: 0,
            minj: 0,
            ri: 0.0,
            rj: 0.0,
        })
    }

    /// Runs the full agglomeration. While more than two clusters remain the
    /// best pair under the linkage criterion is merged; the last two are
    /// merged unconditionally to form the root.
    pub fn cluster(mut self) -> BuiltTree {
        while self.noclus > 2 {
            self.find_min_distance();
            self.join_clusters(self.mini, self.minj);
            self.noclus -= 1;
        }

        let right_child = self.clusters.next_active(0);
        let left_child = self.clusters.next_active(right_child + 1);

        self.join_clusters(left_child, right_child);
        let root = self.slot[left_child];

        BuiltTree {
            nodes: self.nodes,
            root,
        }
    }

    /// Scans all active pairs (i, j), i < j, in row-major order for the pair
    /// minimising the linkage criterion. Strict `<` against the running
    /// minimum, so the first minimal pair encountered wins.
    fn find_min_distance(&mut self) -> f64 {
        let mut min = f64::MAX;

        match self.linkage {
            Linkage::AverageDistance => {
                for i in 0..self.noseqs - 1 {
                    if !self.clusters.is_active(i) {
                        continue;
                    }
                    for j in (i + 1)..self.noseqs {
                        if !self.clusters.is_active(j) {
                            continue;
                        }
                        let tmp = self.distances.get(i, j);
                        if tmp < min {
                            self.mini = i;
                            self.minj = j;
                            min = tmp;
                        }
                    }
                }
            }
            Linkage::NeighbourJoining => {
                // Per-row sums over active slots give each r term in O(1),
                // keeping the scan quadratic per iteration.
                let mut rowsum = vec![0.0; self.noseqs];
                for i in 0..self.noseqs {
                    if !self.clusters.is_active(i) {
                        continue;
                    }
                    for k in 0..self.noseqs {
                        if k != i && self.clusters.is_active(k) {
                            rowsum[i] += self.distances.get(i, k);
                        }
                    }
                }

                let div = (self.noclus - 2) as f64;
                for i in 0..self.noseqs - 1 {
                    if !self.clusters.is_active(i) {
                        continue;
                    }
                    for j in (i + 1)..self.noseqs {
                        if !self.clusters.is_active(j) {
                            continue;
                        }
                        let d = self.distances.get(i, j);
                        let ri = (1.0 + rowsum[i] - d) / div;
                        let rj = (1.0 + rowsum[j] - d) / div;
                        let tmp = d - (ri + rj);
                        if tmp < min {
                            self.mini = i;
                            self.minj = j;
                            min = tmp;
                        }
                    }
                }
            }
        }

        min
    }

    /// Rate term for cluster i with j excluded: 1 plus the summed distance
    /// from i to every other active cluster, averaged over the remaining
    /// cluster count when more than two clusters are left.
    ///
    /// The accumulator starts at 1, not 0. A textbook rate correction has no
    /// additive constant; changing this changes pair selection and branch
    /// lengths, so it stays.
    fn findr(&self, i: usize, j: usize) -> f64 {
        let mut tmp = 1.0;
        for k in 0..self.noseqs {
            if k != i && k != j && self.clusters.is_active(k) {
                tmp += self.distances.get(i, k);
            }
        }

        if self.noclus > 2 {
            tmp /= (self.noclus - 2) as f64;
        }

        tmp
    }

    /// Merges cluster j into cluster i: recomputes row i of the matrix,
    /// creates the internal node over both slots' current nodes, assigns the
    /// children's branch lengths, and retires slot j.
    fn join_clusters(&mut self, i: usize, j: usize) {
        let dist = self.distances.get(i, j);

        self.ri = self.findr(i, j);
        self.rj = self.findr(j, i);

        self.find_cluster_distance(i, j);

        let ni = self.slot[i];
        let nj = self.slot[j];

        let sn = self.nodes.len();
        self.nodes.push(TreeNode::internal(ni, nj));

        self.find_new_distances(ni, nj, dist);

        self.nodes[ni].parent = Some(sn);
        self.nodes[nj].parent = Some(sn);
        self.slot[i] = sn;

        self.clusters.merge(i, j);
    }

    /// Recomputes the distance from the merged cluster (slot i) to every
    /// other active cluster.
    fn find_cluster_distance(&mut self, i: usize, j: usize) {
        match self.linkage {
            Linkage::AverageDistance => {
                // Sizes are read before the membership merge.
                let ci = self.clusters.cardinality(i) as f64;
                let cj = self.clusters.cardinality(j) as f64;

                for k in 0..self.noseqs {
                    if k == i || k == j || !self.clusters.is_active(k) {
                        continue;
                    }
                    let v = (self.distances.get(i, k) * ci
                        + self.distances.get(j, k) * cj)
                        / (ci + cj);
                    self.distances.set(i, k, v);
                }
            }
            Linkage::NeighbourJoining => {
                let dij = self.distances.get(i, j);

                for k in 0..self.noseqs {
                    if k == i || k == j || !self.clusters.is_active(k) {
                        continue;
                    }
                    let v =
                        (self.distances.get(i, k) + self.distances.get(j, k) - dij) / 2.0;
                    self.distances.set(i, k, v);
                }
            }
        }
    }

    /// Assigns branch lengths to the two nodes just placed under a new
    /// parent, given the distance the merge happened at.
    fn find_new_distances(&mut self, ni: usize, nj: usize, dist: f64) {
        match self.linkage {
            Linkage::AverageDistance => {
                // Each child's subtree already reaches some height below it;
                // both subtrees must end up at dist/2 below the new parent.
                let ih = self.left_spine_height(ni);
                let jh = self.left_spine_height(nj);
                self.nodes[ni].dist = dist / 2.0 - ih;
                self.nodes[nj].dist = dist / 2.0 - jh;
            }
            Linkage::NeighbourJoining => {
                let di = (dist + self.ri - self.rj) / 2.0;
                let dj = dist - di;
                self.nodes[ni].dist = if di < 0.0 { 0.0 } else { di };
                self.nodes[nj].dist = if dj < 0.0 { 0.0 } else { dj };
            }
        }
    }

    /// Sum of branch lengths down the left-child spine from `start`.
    fn left_spine_height(&self, start: usize) -> f64 {
        let mut h = 0.0;
        let mut cur = Some(start);
        while let Some(ix) = cur {
            h += self.nodes[ix].dist;
            cur = self.nodes[ix].left;
        }
        h
    }
}

/// Builds a finished average-distance (UPGMA) tree model.
pub fn average_distance(
    distances: DistanceMatrix,
    taxa: &[Taxon],
) -> TreeResult<TreeModel> {
    let built = TreeBuilder::new(distances, taxa, Linkage::AverageDistance)?.cluster();
    Ok(TreeModel::from_built(built, taxa.to_vec()))
}

/// Builds a finished neighbour-joining tree model.
pub fn neighbour_joining(
    distances: DistanceMatrix,
    taxa: &[Taxon],
) -> TreeResult<TreeModel> {
    let built = TreeBuilder::new(distances, taxa, Linkage::NeighbourJoining)?.cluster();
    Ok(TreeModel::from_built(built, taxa.to_vec()))
}
