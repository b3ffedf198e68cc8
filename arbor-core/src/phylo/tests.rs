use super::*;

use crate::error::TreeError;

fn taxa(names: &[&str]) -> Vec<Taxon> {
    taxa_from_names(names)
}

/// Builds a symmetric matrix from the strict upper triangle in row-major
/// order: (0,1), (0,2), ..., (1,2), ...
fn dm(n: usize, upper: &[f64]) -> DistanceMatrix {
    let mut m = DistanceMatrix::zeroed(n);
    let mut vals = upper.iter();
    for i in 0..n {
        for j in (i + 1)..n {
            m.set(i, j, *vals.next().unwrap());
        }
    }
    assert!(vals.next().is_none());
    m
}

fn is_ancestor(model: &TreeModel, anc: usize, mut nd: usize) -> bool {
    while let Some(p) = model.node(nd).parent {
        if p == anc {
            return true;
        }
        nd = p;
    }
    false
}

// ─── distance matrix ────────────────────────────────────────

#[test]
fn matrix_set_is_symmetric() {
    let mut m = DistanceMatrix::zeroed(3);
    m.set(0, 2, 5.0);
    assert!((m.get(0, 2) - 5.0).abs() < 1e-10);
    assert!((m.get(2, 0) - 5.0).abs() < 1e-10);
    assert_eq!(m.n(), 3);
    assert_eq!(m.data().len(), 9);
}

#[test]
#[should_panic]
fn matrix_rejects_wrong_length() {
    DistanceMatrix::new(3, vec![0.0; 8]);
}

// ─── construction errors ────────────────────────────────────

#[test]
fn too_few_taxa() {
    let err = average_distance(DistanceMatrix::zeroed(1), &taxa(&["a"])).unwrap_err();
    assert!(matches!(err, TreeError::TooFewTaxa { n: 1 }));
}

#[test]
fn matrix_taxa_mismatch() {
    let err =
        TreeBuilder::new(DistanceMatrix::zeroed(3), &taxa(&["a", "b"]), Linkage::NeighbourJoining)
            .err()
            .unwrap();
    assert!(matches!(err, TreeError::MatrixSizeMismatch { len: 3, n: 2 }));
}

// ─── average distance (UPGMA) ───────────────────────────────

#[test]
fn upgma_three_taxa_worked_example() {
    // 0 and 1 are closest (2); they merge at height 1, the root at height 2
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();

    assert_eq!(tree.num_leaves(), 3);
    assert_eq!(tree.num_nodes(), 5);

    // first internal node created joins leaves 0 and 1
    assert_eq!(tree.node(3).left, Some(0));
    assert_eq!(tree.node(3).right, Some(1));
    assert!((tree.node(0).dist - 1.0).abs() < 1e-10);
    assert!((tree.node(1).dist - 1.0).abs() < 1e-10);

    // root height is half the final two-cluster merge distance
    assert!((tree.max_height() - 2.0).abs() < 1e-10);
    for leaf in tree.find_leaves(tree.root()) {
        assert!((tree.node(leaf).height - 2.0).abs() < 1e-10);
    }
}

#[test]
fn upgma_two_taxa() {
    let m = dm(2, &[6.0]);
    let tree = average_distance(m, &taxa(&["x", "y"])).unwrap();
    assert_eq!(tree.num_leaves(), 2);
    assert_eq!(tree.num_nodes(), 3);
    for leaf in tree.find_leaves(tree.root()) {
        assert!((tree.node(leaf).dist - 3.0).abs() < 1e-10);
    }
}

#[test]
fn upgma_weighted_update() {
    // After (0,1) merge, D(01,2) = (2*1 + 8*1)/2 = 5; root splits at 2.5
    let m = dm(3, &[1.0, 2.0, 8.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();
    assert!((tree.max_height() - 2.5).abs() < 1e-10);
}

#[test]
fn pair_selection_prefers_first_in_scan_order() {
    // (0,1) and (2,3) are both minimal; the row-major scan must take (0,1)
    let m = dm(4, &[1.0, 5.0, 5.0, 5.0, 5.0, 1.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c", "d"])).unwrap();
    assert_eq!(tree.node(4).left, Some(0));
    assert_eq!(tree.node(4).right, Some(1));
    assert_eq!(tree.node(5).left, Some(2));
    assert_eq!(tree.node(5).right, Some(3));
}

// ─── neighbour joining ──────────────────────────────────────

#[test]
fn nj_four_taxa_joins_closest_pair_first() {
    let m = dm(4, &[7.0, 11.0, 14.0, 12.0, 15.0, 9.0]);
    let tree = neighbour_joining(m, &taxa(&["A", "B", "C", "D"])).unwrap();

    assert_eq!(tree.num_leaves(), 4);
    assert_eq!(tree.num_nodes(), 7);

    // A and B joined first
    assert_eq!(tree.node(4).left, Some(0));
    assert_eq!(tree.node(4).right, Some(1));

    for nd in tree.nodes() {
        assert!(nd.dist >= 0.0, "negative branch length {}", nd.dist);
    }
}

#[test]
fn nj_branch_length_split() {
    // For the worked 4-taxon example the first merge distance is 7 with
    // r(A excl B) = 13 and r(B excl A) = 14, so A gets 3 and B gets 4
    let m = dm(4, &[7.0, 11.0, 14.0, 12.0, 15.0, 9.0]);
    let tree = neighbour_joining(m, &taxa(&["A", "B", "C", "D"])).unwrap();
    assert!((tree.node(0).dist - 3.0).abs() < 1e-10);
    assert!((tree.node(1).dist - 4.0).abs() < 1e-10);
}

#[test]
fn nj_two_taxa() {
    let m = dm(2, &[3.0]);
    let tree = neighbour_joining(m, &taxa(&["x", "y"])).unwrap();
    assert_eq!(tree.num_leaves(), 2);
    for leaf in tree.find_leaves(tree.root()) {
        assert!((tree.node(leaf).dist - 1.5).abs() < 1e-10);
    }
}

#[test]
fn nj_clamps_negative_branches() {
    // First merge is (0,1) at distance 0.1 with r0 = 1.1 and r1 = 10, so
    // node 0's raw share is -4.4: clamped to zero, node 1 keeps 4.5
    let m = dm(3, &[0.1, 0.1, 9.0]);
    let tree = neighbour_joining(m, &taxa(&["a", "b", "c"])).unwrap();
    assert_eq!(tree.node(0).dist, 0.0);
    assert!((tree.node(1).dist - 4.5).abs() < 1e-10);
    for nd in tree.nodes() {
        assert!(nd.dist >= 0.0);
    }
}

// ─── derived metrics ────────────────────────────────────────

#[test]
fn recount_assigns_leaf_order() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();

    let leaves = tree.find_leaves(tree.root());
    for (expect, &leaf) in leaves.iter().enumerate().map(|(i, l)| (i as f64, l)) {
        assert_eq!(tree.node(leaf).ycount, expect);
        assert_eq!(tree.node(leaf).count, 1);
    }

    for (idx, nd) in tree.nodes().iter().enumerate() {
        if let (Some(l), Some(r)) = (nd.left, nd.right) {
            let mean = (tree.node(l).ycount + tree.node(r).ycount) / 2.0;
            assert_eq!(nd.ycount, mean, "node {} ycount", idx);
            assert_eq!(nd.count, tree.node(l).count + tree.node(r).count);
        }
    }
    assert_eq!(tree.node(tree.root()).count, 3);
}

#[test]
fn recount_is_idempotent() {
    let m = dm(4, &[7.0, 11.0, 14.0, 12.0, 15.0, 9.0]);
    let mut tree = neighbour_joining(m, &taxa(&["A", "B", "C", "D"])).unwrap();
    let before: Vec<f64> = tree.nodes().iter().map(|n| n.ycount).collect();
    tree.re_count();
    let after: Vec<f64> = tree.nodes().iter().map(|n| n.ycount).collect();
    assert_eq!(before, after);
}

#[test]
fn max_dist_tracks_longest_leaf_branch() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();
    let (node, value) = tree.max_dist();
    assert_eq!(node, Some(2));
    assert!((value - 2.0).abs() < 1e-10);
}

#[test]
fn swap_children_reverses_leaf_order() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let mut tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();
    assert_eq!(tree.leaf_labels(), ["c", "a", "b"]);

    let root = tree.root();
    tree.swap_children(root);
    tree.re_count();
    tree.find_height();

    assert_eq!(tree.leaf_labels(), ["a", "b", "c"]);
    let leaves = tree.find_leaves(tree.root());
    for (i, &leaf) in leaves.iter().enumerate() {
        assert_eq!(tree.node(leaf).ycount, i as f64);
    }
}

// ─── grouping by threshold ──────────────────────────────────

#[test]
fn group_nodes_cuts_at_threshold() {
    // Heights: leaf c = 10, internal (a,b) = 8, leaves a and b = 10
    let m = dm(3, &[4.0, 20.0, 20.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();
    assert!((tree.max_height() - 10.0).abs() < 1e-10);

    let groups = tree.group_nodes(0.5);
    assert_eq!(groups.len(), 2);
    for &g in &groups {
        assert!(tree.node(g).height > 5.0);
    }

    // selected nodes are an antichain
    for &a in &groups {
        for &b in &groups {
            if a != b {
                assert!(!is_ancestor(&tree, a, b));
            }
        }
    }

    // leaves of the groups partition the leaf set
    let total: usize = groups.iter().map(|&g| tree.find_leaves(g).len()).sum();
    assert_eq!(total, tree.num_leaves());
}

#[test]
fn group_nodes_tightens_with_threshold() {
    let m = dm(3, &[4.0, 20.0, 20.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();

    // above 0.9 the (a,b) node at 0.8 no longer qualifies; its leaves do
    assert_eq!(tree.group_nodes(0.9).len(), 3);
    // nothing exceeds the whole tree height
    assert!(tree.group_nodes(1.1).is_empty());
}

// ─── newick output ──────────────────────────────────────────

#[test]
fn newick_worked_example() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let tree = average_distance(m, &taxa(&["a", "b", "c"])).unwrap();
    assert_eq!(
        tree.to_newick(),
        "(c:2.000000,(a:1.000000,b:1.000000):1.000000):0.000000;"
    );
}

#[test]
fn newick_quotes_awkward_labels() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let tree = average_distance(m, &taxa(&["A B", "C:D", "E'F"])).unwrap();
    let nwk = tree.to_newick();
    assert!(nwk.contains("'A B'"));
    assert!(nwk.contains("'C:D'"));
    assert!(nwk.contains("'E''F'"));
}

#[test]
fn newick_omits_distances_without_flag() {
    let tree = TreeModel::from_newick("(a,b);", &taxa(&["a", "b"])).unwrap();
    assert!(!tree.has_distances());
    assert!(!tree.has_root_distance());
    assert_eq!(tree.to_newick(), "(a,b);");
}

#[test]
fn newick_omits_root_distance_without_flag() {
    let tree = TreeModel::from_newick("(a:1,b:2);", &taxa(&["a", "b"])).unwrap();
    assert!(tree.has_distances());
    assert!(!tree.has_root_distance());
    assert_eq!(tree.to_newick(), "(a:1.000000,b:2.000000);");
}

#[test]
fn newick_carries_bootstrap() {
    let tree = TreeModel::from_newick("(a:1,b:2)95:0.5;", &taxa(&["a", "b"])).unwrap();
    assert!(tree.has_bootstrap());
    assert!(tree.has_root_distance());
    assert_eq!(tree.node(tree.root()).bootstrap, Some(95.0));
    assert_eq!(tree.to_newick(), "(a:1.000000,b:2.000000)95:0.500000;");
}

// ─── newick input ───────────────────────────────────────────

#[test]
fn parse_round_trips_computed_tree() {
    let m = dm(4, &[7.0, 11.0, 14.0, 12.0, 15.0, 9.0]);
    let names = ["A", "B", "C", "D"];
    let tree = neighbour_joining(m, &taxa(&names)).unwrap();

    let text = tree.to_newick();
    let reread = TreeModel::from_newick(&text, &taxa(&names)).unwrap();

    assert_eq!(reread.leaf_labels(), tree.leaf_labels());
    assert_eq!(reread.num_nodes(), tree.num_nodes());
    assert_eq!(reread.to_newick(), text);
}

#[test]
fn parse_folds_multifurcations() {
    let tree = TreeModel::from_newick("(a,b,c);", &taxa(&["a", "b", "c"])).unwrap();
    assert_eq!(tree.num_leaves(), 3);
    assert_eq!(tree.num_nodes(), 5);
    assert_eq!(tree.to_newick(), "((a,b),c);");
}

#[test]
fn parse_skips_comments_and_space() {
    let tree =
        TreeModel::from_newick(" ( a [left] : 1 , b : 2 ) ; ", &taxa(&["a", "b"])).unwrap();
    assert_eq!(tree.leaf_labels(), ["a", "b"]);
    assert!(tree.has_distances());
}

#[test]
fn parse_reads_quoted_labels() {
    let tree = TreeModel::from_newick("('A B':1,'it''s':2);", &taxa(&["A B", "it's"])).unwrap();
    assert_eq!(tree.leaf_labels(), ["A B", "it's"]);
}

#[test]
fn parse_reports_syntax_errors() {
    for bad in ["", "(a,b)", "(a);", "(a,b);junk", "('oops;", "(a[,b);"] {
        let err = parse_newick(bad).unwrap_err();
        assert!(matches!(err, TreeError::NewickSyntax { .. }), "{:?}", bad);
    }
}

// ─── leaf association ───────────────────────────────────────

#[test]
fn association_marks_missing_taxon_as_placeholder() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let names = ["Mouse", "Rat", "Human"];
    let text = average_distance(m, &taxa(&names)).unwrap().to_newick();

    let tree = TreeModel::from_newick(&text, &taxa(&["Mouse", "Rat"])).unwrap();
    let placeholders: Vec<usize> = tree
        .find_leaves(tree.root())
        .into_iter()
        .filter(|&l| tree.node(l).placeholder)
        .collect();

    assert_eq!(placeholders.len(), 1);
    assert_eq!(tree.node(placeholders[0]).name.as_deref(), Some("Human"));
    assert_eq!(tree.node(placeholders[0]).taxon, None);
}

#[test]
fn update_placeholders_resolves_new_taxa() {
    let m = dm(3, &[2.0, 4.0, 4.0]);
    let names = ["Mouse", "Rat", "Human"];
    let text = average_distance(m, &taxa(&names)).unwrap().to_newick();

    let mut tree = TreeModel::from_newick(&text, &taxa(&["Mouse", "Rat"])).unwrap();
    tree.update_placeholders(&taxa(&names));

    for leaf in tree.find_leaves(tree.root()) {
        assert!(!tree.node(leaf).placeholder);
        assert!(tree.node(leaf).taxon.is_some());
    }
}

#[test]
fn strays_are_adopted_as_extra_leaves() {
    let m = dm(2, &[3.0]);
    let text = average_distance(m, &taxa(&["A", "B"])).unwrap().to_newick();

    let tree = TreeModel::from_newick(&text, &taxa(&["A", "B", "C"])).unwrap();
    assert_eq!(tree.num_leaves(), 3);

    let c = tree
        .find_leaves(tree.root())
        .into_iter()
        .find(|&l| tree.node(l).name.as_deref() == Some("C"))
        .unwrap();
    assert!(!tree.node(c).placeholder);
    assert_eq!(tree.node(c).taxon, Some(2));
}

#[test]
fn rename_takes_taxon_names() {
    let mut tree =
        TreeModel::from_newick("(mouse:1,rat:1);", &taxa(&["Mouse", "Rat"])).unwrap();
    tree.rename_associated_nodes();
    assert_eq!(tree.leaf_labels(), ["Mouse", "Rat"]);
}

// ─── id matching ────────────────────────────────────────────

#[test]
fn matcher_is_case_insensitive() {
    let list = taxa(&["Mouse", "Rat"]);
    let m = IdMatcher::new(&list);
    assert_eq!(m.find_match("mouse").map(|t| t.id), Some(0));
    assert_eq!(m.find_match("RAT").map(|t| t.id), Some(1));
}

#[test]
fn matcher_requires_word_boundary() {
    let list = taxa(&["Q93XJ9_SOLTU", "OTHER"]);
    let m = IdMatcher::new(&list);
    assert_eq!(m.find_match("Q93XJ9").map(|t| t.id), Some(0));
    assert_eq!(m.find_match("Q93X"), None);
}

#[test]
fn matcher_accepts_longer_query() {
    let list = taxa(&["Mouse"]);
    let m = IdMatcher::new(&list);
    assert_eq!(m.find_match("Mouse liver").map(|t| t.id), Some(0));
    assert_eq!(m.find_match("Mousetrap"), None);
}

#[test]
fn matcher_breaks_ties_by_closest_length() {
    let list = taxa(&["AB", "AB CD EF", "AB CD"]);
    let m = IdMatcher::new(&list);
    assert_eq!(m.find_match("ab cd").map(|t| &*t.name), Some("AB CD"));
}

// ─── properties ─────────────────────────────────────────────

use proptest::prelude::*;

fn upper_triangle(n: usize) -> impl Strategy<Value = Vec<f64>> {
    let m = n * (n - 1) / 2;
    prop::collection::vec(0.0f64..10.0, m..=m)
}

fn arbitrary_matrix() -> impl Strategy<Value = (usize, Vec<f64>)> {
    (2usize..=8).prop_flat_map(|n| (Just(n), upper_triangle(n)))
}

fn numbered_taxa(n: usize) -> Vec<Taxon> {
    (0..n).map(|i| Taxon::new(i as u64, &format!("t{}", i))).collect()
}

proptest! {
    #[test]
    fn upgma_terminates_with_full_binary_tree((n, upper) in arbitrary_matrix()) {
        let tree = average_distance(dm(n, &upper), &numbered_taxa(n)).unwrap();
        prop_assert_eq!(tree.num_leaves(), n);
        prop_assert_eq!(tree.num_nodes(), 2 * n - 1);
    }
}

proptest! {
    #[test]
    fn upgma_is_ultrametric((n, upper) in arbitrary_matrix()) {
        let tree = average_distance(dm(n, &upper), &numbered_taxa(n)).unwrap();
        let max = tree.max_height();
        for leaf in tree.find_leaves(tree.root()) {
            prop_assert!((tree.node(leaf).height - max).abs() < 1e-6 * (1.0 + max));
        }
    }
}

proptest! {
    #[test]
    fn nj_terminates_with_nonnegative_branches((n, upper) in arbitrary_matrix()) {
        let tree = neighbour_joining(dm(n, &upper), &numbered_taxa(n)).unwrap();
        prop_assert_eq!(tree.num_leaves(), n);
        prop_assert_eq!(tree.num_nodes(), 2 * n - 1);
        for nd in tree.nodes() {
            prop_assert!(nd.dist >= 0.0);
        }
    }
}

proptest! {
    #[test]
    fn recount_orders_leaves((n, upper) in arbitrary_matrix()) {
        let tree = neighbour_joining(dm(n, &upper), &numbered_taxa(n)).unwrap();
        let leaves = tree.find_leaves(tree.root());
        for (i, &leaf) in leaves.iter().enumerate() {
            prop_assert_eq!(tree.node(leaf).ycount, i as f64);
        }
        for nd in tree.nodes() {
            if let (Some(l), Some(r)) = (nd.left, nd.right) {
                let mean = (tree.node(l).ycount + tree.node(r).ycount) / 2.0;
                prop_assert_eq!(nd.ycount, mean);
            }
        }
    }
}

proptest! {
    #[test]
    fn newick_round_trip_is_stable((n, upper) in arbitrary_matrix()) {
        let names = numbered_taxa(n);
        let tree = neighbour_joining(dm(n, &upper), &names).unwrap();
        let text = tree.to_newick();
        let reread = TreeModel::from_newick(&text, &names).unwrap();
        prop_assert_eq!(reread.to_newick(), text);
    }
}
