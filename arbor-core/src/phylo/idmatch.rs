use super::taxon::Taxon;

/// Characters that can terminate a sequence id embedded at the start of a
/// longer label. Heuristic; fails for ids extended with none of these.
const WORD_SEP: &str = "~. |#\\/<>!\"\u{a4}$%^*)}[@',?_";

/// Approximate taxon resolution by name: containment on word boundaries
/// rather than equality, with ties broken by the id closest in length to
/// the query.
pub struct IdMatcher<'a> {
    entries: Vec<(String, &'a Taxon)>,
}

impl<'a> IdMatcher<'a> {
    pub fn new(taxa: &'a [Taxon]) -> Self {
        let entries = taxa.iter().map(|t| (t.name.to_lowercase(), t)).collect();
        IdMatcher { entries }
    }

    /// The taxon whose name best matches `label`, if any matches at all.
    ///
    /// The incumbent candidate is replaced only by one that is both closer
    /// in length to the query and longer; exact ties keep the incumbent, so
    /// the result is deterministic in list order.
    pub fn find_match(&self, label: &str) -> Option<&'a Taxon> {
        let query = label.to_lowercase();
        let mut best: Option<(&str, &'a Taxon)> = None;

        for (id, taxon) in &self.entries {
            if !ids_match(id, &query) {
                continue;
            }
            best = match best {
                None => Some((id.as_str(), *taxon)),
                Some((cur, cur_taxon)) => {
                    let q = cur.len().abs_diff(query.len());
                    let w = id.len().abs_diff(query.len());
                    if q > w && id.len() > cur.len() {
                        Some((id.as_str(), *taxon))
                    } else {
                        Some((cur, cur_taxon))
                    }
                }
            };
        }

        best.map(|(_, t)| t)
    }
}

fn is_word_sep(c: char) -> bool {
    WORD_SEP.contains(c)
}

/// True when the two lowercased ids are equal, or one properly contains the
/// other with the overhang starting at a word separator.
fn ids_match(a: &str, b: &str) -> bool {
    if a.len() > b.len() {
        a.starts_with(b) && a[b.len()..].chars().next().map(is_word_sep).unwrap_or(false)
    } else if a.len() < b.len() {
        b.starts_with(a) && b[a.len()..].chars().next().map(is_word_sep).unwrap_or(false)
    } else {
        a == b
    }
}
