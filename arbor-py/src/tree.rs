use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyModule;

use arbor_core::phylo;
use arbor_core::phylo::taxa_from_names;

#[pyclass(frozen, name = "DistanceMatrix")]
pub struct PyDistanceMatrix {
    inner: phylo::DistanceMatrix,
}

#[pymethods]
impl PyDistanceMatrix {
    #[new]
    fn new(rows: Vec<Vec<f64>>) -> PyResult<Self> {
        let n = rows.len();
        for row in &rows {
            if row.len() != n {
                return Err(PyValueError::new_err(format!(
                    "distance matrix must be square, got a row of {} in an {}x{} matrix",
                    row.len(),
                    n,
                    n
                )));
            }
        }
        let data: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(PyDistanceMatrix {
            inner: phylo::DistanceMatrix::new(n, data),
        })
    }

    #[getter]
    fn n(&self) -> usize {
        self.inner.n()
    }

    fn get(&self, i: usize, j: usize) -> PyResult<f64> {
        let n = self.inner.n();
        if i >= n || j >= n {
            return Err(PyValueError::new_err(format!(
                "index ({}, {}) out of range for {}x{} matrix",
                i, j, n, n
            )));
        }
        Ok(self.inner.get(i, j))
    }

    fn to_list(&self) -> Vec<f64> {
        self.inner.data().to_vec()
    }

    fn __len__(&self) -> usize {
        self.inner.n()
    }

    fn __repr__(&self) -> String {
        format!("DistanceMatrix(n={})", self.inner.n())
    }

    fn __str__(&self) -> String {
        let n = self.inner.n();
        let mut lines = Vec::with_capacity(n);
        for i in 0..n {
            let mut row = String::new();
            for j in 0..n {
                row.push_str(&format!("{:>10.4}", self.inner.get(i, j)));
            }
            lines.push(row);
        }
        lines.join("\n")
    }
}

#[pyclass(frozen, name = "TreeModel")]
pub struct PyTreeModel {
    inner: phylo::TreeModel,
}

#[pymethods]
impl PyTreeModel {
    fn to_newick(&self) -> String {
        self.inner.to_newick()
    }

    fn max_height(&self) -> f64 {
        self.inner.max_height()
    }

    fn num_leaves(&self) -> usize {
        self.inner.num_leaves()
    }

    fn num_nodes(&self) -> usize {
        self.inner.num_nodes()
    }

    fn leaf_labels(&self) -> Vec<String> {
        self.inner.leaf_labels()
    }

    fn placeholder_count(&self) -> usize {
        self.inner
            .find_leaves(self.inner.root())
            .into_iter()
            .filter(|&l| self.inner.node(l).placeholder)
            .count()
    }

    fn has_distances(&self) -> bool {
        self.inner.has_distances()
    }

    fn has_bootstrap(&self) -> bool {
        self.inner.has_bootstrap()
    }

    fn has_root_distance(&self) -> bool {
        self.inner.has_root_distance()
    }

    /// Leaf labels per subtree after cutting the tree at the given fraction
    /// of its height.
    fn group_leaf_names(&self, threshold: f64) -> Vec<Vec<String>> {
        self.inner
            .group_nodes(threshold)
            .into_iter()
            .map(|g| {
                self.inner
                    .find_leaves(g)
                    .into_iter()
                    .map(|l| {
                        self.inner
                            .node(l)
                            .name
                            .as_deref()
                            .unwrap_or("")
                            .to_string()
                    })
                    .collect()
            })
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "TreeModel(leaves={}, nodes={}, max_height={:.4})",
            self.inner.num_leaves(),
            self.inner.num_nodes(),
            self.inner.max_height()
        )
    }

    fn __str__(&self) -> String {
        self.to_newick()
    }
}

#[pyfunction]
#[pyo3(signature = (dist_matrix, names, method = "nj"))]
fn build_tree(
    py: Python<'_>,
    dist_matrix: &PyDistanceMatrix,
    names: Vec<String>,
    method: &str,
) -> PyResult<PyTreeModel> {
    let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    let taxa = taxa_from_names(&name_refs);
    let dm = dist_matrix.inner.clone();

    let tree = match method {
        "nj" => py.allow_threads(move || phylo::neighbour_joining(dm, &taxa)),
        "av" => py.allow_threads(move || phylo::average_distance(dm, &taxa)),
        _ => {
            return Err(PyValueError::new_err(format!(
                "unknown tree method '{}' (valid: 'nj', 'av')",
                method
            )));
        }
    };

    tree.map(|t| PyTreeModel { inner: t })
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pyfunction]
fn parse_newick(py: Python<'_>, text: &str, names: Vec<String>) -> PyResult<PyTreeModel> {
    let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    let taxa = taxa_from_names(&name_refs);

    let tree = py.allow_threads(move || phylo::TreeModel::from_newick(text, &taxa));

    tree.map(|t| PyTreeModel { inner: t })
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDistanceMatrix>()?;
    m.add_class::<PyTreeModel>()?;
    m.add_function(wrap_pyfunction!(build_tree, m)?)?;
    m.add_function(wrap_pyfunction!(parse_newick, m)?)?;
    Ok(())
}
