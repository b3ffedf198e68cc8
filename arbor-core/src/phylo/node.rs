/// A node in the flat tree arena. Leaves have neither child; internal nodes
/// always have both. `parent` is a non-owning back-reference used for height
/// propagation and structural edits only.
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    /// Display label; for computed trees this is the taxon name.
    pub name: Option<Box<str>>,
    /// Id of the associated taxon, if the leaf resolved to one.
    pub taxon: Option<u64>,
    /// Leaf could not be resolved against the taxon list; the label stands
    /// in for the missing entry.
    pub placeholder: bool,
    /// Branch length to the parent.
    pub dist: f64,
    /// Only meaningful for trees loaded from external sources.
    pub bootstrap: Option<f64>,
    /// Cumulative distance from the root; derived.
    pub height: f64,
    /// Leaves in this subtree; derived.
    pub count: usize,
    /// Left-to-right draw index; mean of the children for internal nodes.
    pub ycount: f64,
    pub parent: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

impl TreeNode {
    pub fn leaf(name: Box<str>, taxon: Option<u64>) -> Self {
        TreeNode {
            name: Some(name),
            taxon,
            ..Default::default()
        }
    }

    pub fn internal(left: usize, right: usize) -> Self {
        TreeNode {
            left: Some(left),
            right: Some(right),
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Leaf indices at or below `start`, left to right.
pub fn leaves(nodes: &[TreeNode], start: usize) -> Vec<usize> {
    let mut out = Vec::new();
    collect_leaves(nodes, start, &mut out);
    out
}

fn collect_leaves(nodes: &[TreeNode], idx: usize, out: &mut Vec<usize>) {
    if nodes[idx].is_leaf() {
        out.push(idx);
        return;
    }
    if let Some(l) = nodes[idx].left {
        collect_leaves(nodes, l, out);
    }
    if let Some(r) = nodes[idx].right {
        collect_leaves(nodes, r, out);
    }
}
