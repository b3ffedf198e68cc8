use crate::error::{TreeError, TreeResult};

use super::node::TreeNode;

/// Which optional node data the writer emits.
#[derive(Debug, Clone, Copy)]
pub struct WriteFlags {
    pub bootstrap: bool,
    pub distances: bool,
    pub root_distance: bool,
}

/// Serialises the subtree under `root` as a Newick string, ending with `;`.
pub fn write_newick(nodes: &[TreeNode], root: usize, flags: &WriteFlags) -> String {
    let mut s = String::new();
    write_subtree(nodes, root, flags, true, &mut s);
    s.push(';');
    s
}

fn write_subtree(
    nodes: &[TreeNode],
    idx: usize,
    flags: &WriteFlags,
    is_root: bool,
    out: &mut String,
) {
    let node = &nodes[idx];

    if node.is_leaf() {
        if let Some(ref label) = node.name {
            write_label(out, label);
        }
    } else {
        out.push('(');
        if let Some(l) = node.left {
            write_subtree(nodes, l, flags, false, out);
        }
        out.push(',');
        if let Some(r) = node.right {
            write_subtree(nodes, r, flags, false, out);
        }
        out.push(')');

        if let Some(ref label) = node.name {
            write_label(out, label);
        }
        if flags.bootstrap {
            if let Some(b) = node.bootstrap {
                if node.name.is_some() {
                    out.push(' ');
                }
                out.push_str(&fmt_bootstrap(b));
            }
        }
    }

    // The root's own length is additionally gated by the root flag.
    if flags.distances && (!is_root || flags.root_distance) {
        out.push(':');
        out.push_str(&format!("{:.6}", node.dist));
    }
}

fn fmt_bootstrap(b: f64) -> String {
    if b.fract() == 0.0 {
        format!("{}", b as i64)
    } else {
        format!("{}", b)
    }
}

fn needs_quoting(label: &str) -> bool {
    label.chars().any(|ch| {
        ch.is_whitespace() || matches!(ch, ':' | ',' | '(' | ')' | ';' | '[' | ']' | '\'')
    })
}

fn write_label(out: &mut String, label: &str) {
    if label.is_empty() {
        return;
    }
    if needs_quoting(label) {
        out.push('\'');
        for ch in label.chars() {
            if ch == '\'' {
                out.push_str("''");
            } else {
                out.push(ch);
            }
        }
        out.push('\'');
    } else {
        out.push_str(label);
    }
}

/// A parsed Newick tree: the node arena, its root, and the capability flags
/// detected while reading.
#[derive(Debug)]
pub struct ParsedTree {
    pub nodes: Vec<TreeNode>,
    pub root: usize,
    pub has_distances: bool,
    pub has_bootstrap: bool,
    pub has_root_distance: bool,
}

/// Parses one Newick tree. Multifurcations are folded left-wise into
/// zero-length binary internals; numeric internal labels are read as
/// bootstrap values. Bracketed comments are skipped.
pub fn parse_newick(text: &str) -> TreeResult<ParsedTree> {
    Parser::new(text).parse()
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<TreeNode>,
    has_distances: bool,
    has_bootstrap: bool,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser {
            bytes: text.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
            has_distances: false,
            has_bootstrap: false,
        }
    }

    fn parse(mut self) -> TreeResult<ParsedTree> {
        self.skip_space()?;
        let (root, root_dist) = self.parse_subtree()?;

        self.skip_space()?;
        if self.take() != Some(b';') {
            return Err(self.err("expected ';'"));
        }
        self.skip_space()?;
        if self.pos != self.bytes.len() {
            return Err(self.err("trailing input after ';'"));
        }

        Ok(ParsedTree {
            nodes: self.nodes,
            root,
            has_distances: self.has_distances,
            has_bootstrap: self.has_bootstrap,
            has_root_distance: root_dist,
        })
    }

    /// One subtree: a parenthesised group or a leaf, with optional label and
    /// branch length. Returns the node index and whether a length was given.
    fn parse_subtree(&mut self) -> TreeResult<(usize, bool)> {
        self.skip_space()?;

        if self.peek() == Some(b'(') {
            self.pos += 1;

            let mut children = Vec::new();
            loop {
                let (child, _) = self.parse_subtree()?;
                children.push(child);
                self.skip_space()?;
                match self.take() {
                    Some(b',') => {}
                    Some(b')') => break,
                    _ => return Err(self.err("expected ',' or ')'")),
                }
            }
            if children.len() < 2 {
                return Err(self.err("a group needs at least two children"));
            }

            let mut idx = self.push_internal(children[0], children[1]);
            for &extra in &children[2..] {
                idx = self.push_internal(idx, extra);
            }

            if let Some(label) = self.parse_label()? {
                match label.parse::<f64>() {
                    Ok(v) => {
                        self.nodes[idx].bootstrap = Some(v);
                        self.has_bootstrap = true;
                    }
                    Err(_) => self.nodes[idx].name = Some(label.into()),
                }
            }

            let had_dist = self.parse_dist(idx)?;
            Ok((idx, had_dist))
        } else {
            let label = self
                .parse_label()?
                .ok_or_else(|| self.err("expected a label or '('"))?;
            let idx = self.nodes.len();
            self.nodes.push(TreeNode::leaf(label.into(), None));

            let had_dist = self.parse_dist(idx)?;
            Ok((idx, had_dist))
        }
    }

    fn push_internal(&mut self, left: usize, right: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::internal(left, right));
        self.nodes[left].parent = Some(idx);
        self.nodes[right].parent = Some(idx);
        idx
    }

    /// A quoted or bare label; `None` when neither is present.
    fn parse_label(&mut self) -> TreeResult<Option<String>> {
        self.skip_space()?;

        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let mut raw = Vec::new();
            loop {
                match self.take() {
                    Some(b'\'') => {
                        // doubled quote is an escaped quote
                        if self.peek() == Some(b'\'') {
                            self.pos += 1;
                            raw.push(b'\'');
                        } else {
                            let label = String::from_utf8(raw).map_err(|_| {
                                TreeError::NewickSyntax {
                                    pos: self.pos,
                                    msg: "label is not valid utf-8",
                                }
                            })?;
                            return Ok(Some(label));
                        }
                    }
                    Some(b) => raw.push(b),
                    None => return Err(self.err("unterminated quoted label")),
                }
            }
        }

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || matches!(b, b',' | b'(' | b')' | b':' | b';' | b'[') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        let label = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| TreeError::NewickSyntax {
                pos: start,
                msg: "label is not valid utf-8",
            })?
            .to_string();
        Ok(Some(label))
    }

    /// `:length` if present; records the distances flag.
    fn parse_dist(&mut self, idx: usize) -> TreeResult<bool> {
        self.skip_space()?;
        if self.peek() != Some(b':') {
            return Ok(false);
        }
        self.pos += 1;
        self.skip_space()?;

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let v: f64 = std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(TreeError::NewickSyntax {
                pos: start,
                msg: "expected a branch length",
            })?;

        self.nodes[idx].dist = v;
        self.has_distances = true;
        Ok(true)
    }

    /// Skips whitespace and `[...]` comments.
    fn skip_space(&mut self) -> TreeResult<()> {
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.peek() != Some(b'[') {
                return Ok(());
            }
            let open = self.pos;
            let mut closed = false;
            while let Some(b) = self.take() {
                if b == b']' {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(TreeError::NewickSyntax {
                    pos: open,
                    msg: "unterminated comment",
                });
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn take(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn err(&self, msg: &'static str) -> TreeError {
        TreeError::NewickSyntax {
            pos: self.pos,
            msg,
        }
    }
}
