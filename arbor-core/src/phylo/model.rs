use tracing::{debug, warn};

use crate::error::TreeResult;

use super::builder::BuiltTree;
use super::idmatch::IdMatcher;
use super::newick::{self, WriteFlags};
use super::node::{self, TreeNode};
use super::taxon::Taxon;

/// A finished tree, either computed by the builder or loaded from a Newick
/// string, wrapped with cached derived metrics and association state.
///
/// Derived data (`height`, `count`, `ycount`, `max_height`, the max-branch
/// record) is valid until a structural edit such as `swap_children`; re-run
/// `re_count` and `find_height` afterwards. Externally supplied trees are
/// not shape-checked: a cyclic node graph would recurse without bound.
#[derive(Debug, Clone)]
pub struct TreeModel {
    nodes: Vec<TreeNode>,
    root: usize,
    taxa: Vec<Taxon>,
    max_height: f64,
    max_dist_node: Option<usize>,
    max_dist_value: f64,
    has_distances: bool,
    has_bootstrap: bool,
    has_root_distance: bool,
}

impl TreeModel {
    /// Wraps the output of an agglomeration run. Computed trees always carry
    /// real distances and a root distance, never bootstrap values.
    pub fn from_built(built: BuiltTree, taxa: Vec<Taxon>) -> Self {
        let mut model = TreeModel {
            nodes: built.nodes,
            root: built.root,
            taxa,
            max_height: 0.0,
            max_dist_node: None,
            max_dist_value: 0.0,
            has_distances: true,
            has_bootstrap: false,
            has_root_distance: true,
        };
        model.finalise();
        model
    }

    /// Parses a Newick string, associates its leaves with `taxa`, adopts any
    /// stray taxa the tree is missing, and derives the metrics. Capability
    /// flags come from what the parse actually saw.
    pub fn from_newick(text: &str, taxa: &[Taxon]) -> TreeResult<Self> {
        let parsed = newick::parse_newick(text)?;

        let mut model = TreeModel {
            nodes: parsed.nodes,
            root: parsed.root,
            taxa: Vec::new(),
            max_height: 0.0,
            max_dist_node: None,
            max_dist_value: 0.0,
            has_distances: parsed.has_distances,
            has_bootstrap: parsed.has_bootstrap,
            has_root_distance: parsed.has_root_distance,
        };
        model.associate_leaves(taxa);
        model.adopt_strays(taxa);
        model.finalise();
        Ok(model)
    }

    fn finalise(&mut self) {
        self.re_count();
        self.find_height();
        self.find_max_dist();
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Node carrying the single longest leaf branch, with its length.
    pub fn max_dist(&self) -> (Option<usize>, f64) {
        (self.max_dist_node, self.max_dist_value)
    }

    pub fn has_distances(&self) -> bool {
        self.has_distances
    }

    pub fn has_bootstrap(&self) -> bool {
        self.has_bootstrap
    }

    pub fn has_root_distance(&self) -> bool {
        self.has_root_distance
    }

    /// Recomputes every node's cumulative height from the root and returns
    /// the new maximum leaf height.
    pub fn find_height(&mut self) -> f64 {
        self.max_height = 0.0;
        self.height_below(self.root);
        self.max_height
    }

    fn height_below(&mut self, idx: usize) {
        self.nodes[idx].height = match self.nodes[idx].parent {
            Some(p) => self.nodes[p].height + self.nodes[idx].dist,
            None => 0.0,
        };

        if self.nodes[idx].is_leaf() {
            if self.nodes[idx].height > self.max_height {
                self.max_height = self.nodes[idx].height;
            }
            return;
        }
        if let Some(l) = self.nodes[idx].left {
            self.height_below(l);
        }
        if let Some(r) = self.nodes[idx].right {
            self.height_below(r);
        }
    }

    /// Reassigns draw indices: leaves get 0..N-1 left to right, internal
    /// nodes the mean of their children; leaf counts are refreshed along
    /// the way. Idempotent.
    pub fn re_count(&mut self) {
        let mut ycount = 0;
        self.recount_below(self.root, &mut ycount);
    }

    fn recount_below(&mut self, idx: usize, ycount: &mut usize) {
        if let (Some(l), Some(r)) = (self.nodes[idx].left, self.nodes[idx].right) {
            self.recount_below(l, ycount);
            self.recount_below(r, ycount);

            self.nodes[idx].count = self.nodes[l].count + self.nodes[r].count;
            self.nodes[idx].ycount = (self.nodes[l].ycount + self.nodes[r].ycount) / 2.0;
        } else {
            self.nodes[idx].count = 1;
            self.nodes[idx].ycount = *ycount as f64;
            *ycount += 1;
        }
    }

    /// Records the leaf with the single longest branch.
    pub fn find_max_dist(&mut self) {
        self.max_dist_node = None;
        self.max_dist_value = 0.0;
        self.max_dist_below(self.root);
    }

    fn max_dist_below(&mut self, idx: usize) {
        if self.nodes[idx].is_leaf() {
            let dist = self.nodes[idx].dist;
            if dist > self.max_dist_value {
                self.max_dist_node = Some(idx);
                self.max_dist_value = dist;
            }
            return;
        }
        if let Some(l) = self.nodes[idx].left {
            self.max_dist_below(l);
        }
        if let Some(r) = self.nodes[idx].right {
            self.max_dist_below(r);
        }
    }

    /// Nodes whose height exceeds the given fraction of the tree height,
    /// left to right; descent stops at each selected node, so the result is
    /// the set of maximal subtrees to the right of the cut line.
    pub fn group_nodes(&self, threshold: f64) -> Vec<usize> {
        let mut groups = Vec::new();
        self.group_below(&mut groups, self.root, threshold);
        groups
    }

    fn group_below(&self, groups: &mut Vec<usize>, idx: usize, threshold: f64) {
        if self.nodes[idx].height / self.max_height > threshold {
            groups.push(idx);
            return;
        }
        if let Some(l) = self.nodes[idx].left {
            self.group_below(groups, l, threshold);
        }
        if let Some(r) = self.nodes[idx].right {
            self.group_below(groups, r, threshold);
        }
    }

    /// Leaf indices at or below `idx`, left to right.
    pub fn find_leaves(&self, idx: usize) -> Vec<usize> {
        node::leaves(&self.nodes, idx)
    }

    pub fn leaf_labels(&self) -> Vec<String> {
        self.find_leaves(self.root)
            .into_iter()
            .map(|l| self.nodes[l].name.as_deref().unwrap_or("").to_string())
            .collect()
    }

    /// Exchanges a node's children. Invalidates the derived metrics.
    pub fn swap_children(&mut self, idx: usize) {
        let tmp = self.nodes[idx].left;
        self.nodes[idx].left = self.nodes[idx].right;
        self.nodes[idx].right = tmp;
    }

    /// Resolves every leaf's label against the taxon list through the fuzzy
    /// matcher. Unmatched leaves keep their label as a stand-in and are
    /// flagged as placeholders; several leaves may resolve to one taxon.
    pub fn associate_leaves(&mut self, taxa: &[Taxon]) {
        let matcher = IdMatcher::new(taxa);
        let leaves = self.find_leaves(self.root);
        let mut bound: Vec<u64> = Vec::new();

        for l in leaves {
            let label = self.nodes[l].name.as_deref().unwrap_or("");
            match matcher.find_match(label) {
                Some(t) => {
                    self.nodes[l].taxon = Some(t.id);
                    self.nodes[l].placeholder = false;
                    if bound.contains(&t.id) {
                        debug!(taxon = &*t.name, "several leaves resolved to one taxon");
                    } else {
                        bound.push(t.id);
                    }
                }
                None => {
                    self.nodes[l].taxon = None;
                    self.nodes[l].placeholder = true;
                }
            }
        }

        self.taxa = taxa.to_vec();
    }

    /// Re-resolves leaves against a changed taxon list. Leaves whose bound
    /// taxon is still present are left untouched; everything else goes back
    /// through the matcher, and still-unmatched leaves stay placeholders.
    pub fn update_placeholders(&mut self, taxa: &[Taxon]) {
        let leaves = self.find_leaves(self.root);
        // built on first use only
        let mut matcher: Option<IdMatcher<'_>> = None;

        for l in leaves {
            let still_present = self.nodes[l]
                .taxon
                .map(|id| taxa.iter().any(|t| t.id == id))
                .unwrap_or(false);
            if still_present {
                self.nodes[l].placeholder = false;
                continue;
            }

            let m = matcher.get_or_insert_with(|| IdMatcher::new(taxa));
            let label = self.nodes[l].name.as_deref().unwrap_or("");
            match m.find_match(label) {
                Some(t) => {
                    self.nodes[l].taxon = Some(t.id);
                    self.nodes[l].placeholder = false;
                }
                None => {
                    self.nodes[l].taxon = None;
                    self.nodes[l].placeholder = true;
                }
            }
        }

        self.taxa = taxa.to_vec();
    }

    /// Appends taxa that no leaf is bound to as extra leaves under a new
    /// root, then reports a persisting count mismatch as a diagnostic.
    fn adopt_strays(&mut self, taxa: &[Taxon]) {
        let leaves = self.find_leaves(self.root);
        if leaves.len() == taxa.len() {
            return;
        }

        let bound: Vec<u64> = leaves
            .iter()
            .filter_map(|&l| self.nodes[l].taxon)
            .collect();

        for t in taxa.iter().filter(|t| !bound.contains(&t.id)) {
            let leaf = self.nodes.len();
            self.nodes.push(TreeNode::leaf(t.name.clone(), Some(t.id)));

            let new_root = self.nodes.len();
            self.nodes.push(TreeNode::internal(self.root, leaf));
            self.nodes[self.root].parent = Some(new_root);
            self.nodes[leaf].parent = Some(new_root);
            self.root = new_root;
        }

        let remaining = self.find_leaves(self.root).len();
        if remaining != taxa.len() {
            warn!(
                leaves = remaining,
                taxa = taxa.len(),
                "tree and taxon list still disagree after adopting strays"
            );
        }
    }

    /// Applies a transform to every node in the tree.
    pub fn apply_to_nodes(&mut self, mut f: impl FnMut(&mut TreeNode)) {
        for nd in &mut self.nodes {
            f(nd);
        }
    }

    /// Rewrites each associated node's label from its taxon's display name.
    /// Modifies the tree's label data.
    pub fn rename_associated_nodes(&mut self) {
        let names: Vec<(u64, Box<str>)> = self
            .taxa
            .iter()
            .map(|t| (t.id, t.name.clone()))
            .collect();

        self.apply_to_nodes(|nd| {
            if let Some(id) = nd.taxon {
                if let Some((_, name)) = names.iter().find(|(tid, _)| *tid == id) {
                    nd.name = Some(name.clone());
                }
            }
        });
    }

    /// Newick text with all the data this tree's capability flags allow.
    pub fn to_newick(&self) -> String {
        newick::write_newick(
            &self.nodes,
            self.root,
            &WriteFlags {
                bootstrap: self.has_bootstrap,
                distances: self.has_distances,
                root_distance: self.has_root_distance,
            },
        )
    }
}
