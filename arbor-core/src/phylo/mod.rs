pub mod builder;
pub mod cluster;
pub mod idmatch;
pub mod matrix;
pub mod model;
pub mod newick;
pub mod node;
pub mod taxon;

pub use builder::{average_distance, neighbour_joining, Linkage, TreeBuilder};
pub use idmatch::IdMatcher;
pub use matrix::DistanceMatrix;
pub use model::TreeModel;
pub use newick::{parse_newick, write_newick, WriteFlags};
pub use node::TreeNode;
pub use taxon::{taxa_from_names, Taxon};

#[cfg(test)]
mod tests;
