use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("cannot build a tree from {n} taxa (need at least 2)")]
    TooFewTaxa { n: usize },

    #[error("distance matrix is {len}x{len} but {n} taxa were supplied")]
    MatrixSizeMismatch { len: usize, n: usize },

    #[error("newick syntax error at byte {pos}: {msg}")]
    NewickSyntax { pos: usize, msg: &'static str },
}

pub type TreeResult<T> = Result<T, TreeError>;
