use pyo3::prelude::*;

mod tree;

#[pymodule]
fn _native(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    tree::register(m)?;
    Ok(())
}
