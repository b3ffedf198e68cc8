/// One entry of the caller-supplied taxon list: an opaque identity plus the
/// display name that tree leaves are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon {
    pub id: u64,
    pub name: Box<str>,
}

impl Taxon {
    pub fn new(id: u64, name: &str) -> Self {
        Taxon {
            id,
            name: name.into(),
        }
    }
}

/// Builds a taxon list from display names, assigning sequential ids.
pub fn taxa_from_names(names: &[&str]) -> Vec<Taxon> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Taxon::new(i as u64, n))
        .collect()
}
