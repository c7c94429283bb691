//! Hand-rolled Newick/NHX parser and serializer.
//!
//! The grammar is the usual Newick recursive structure plus the NHX
//! extension, a trailing bracket comment of the form
//! `[&&NHX:key=value:key2=value2]` attached to a node. This is a
//! domain-specific text format with no natural generic-parser-combinator
//! fit, so it is hand-rolled rather than pulled in as a dependency — tree
//! I/O is an external collaborator seam (see the trait in [`crate::tree`]),
//! not a place this crate needs a third-party tree library.

use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// One parsed Newick/NHX node before arena assignment.
pub struct RawNode {
    /// Node label, empty string if unlabeled.
    pub name: String,
    /// Branch length, if present (unused by propagation but preserved for round-trip).
    pub branch_length: Option<f64>,
    /// `&&NHX:` key/value attributes, in declaration order but keyed for lookup.
    pub nhx: BTreeMap<String, String>,
    /// Children, in document order.
    pub children: Vec<RawNode>,
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn err(&self, reason: impl Into<String>) -> CoreError {
        CoreError::TreeParse {
            path: None,
            reason: format!("{} at byte {}", reason.into(), self.pos),
        }
    }

    fn parse_tree(&mut self) -> Result<RawNode> {
        let root = self.parse_subtree()?;
        // optional trailing ';'
        if self.peek() == Some(b';') {
            self.bump();
        }
        Ok(root)
    }

    fn parse_subtree(&mut self) -> Result<RawNode> {
        let mut children = Vec::new();
        if self.peek() == Some(b'(') {
            self.bump();
            loop {
                children.push(self.parse_subtree()?);
                match self.peek() {
                    Some(b',') => {
                        self.bump();
                    }
                    Some(b')') => {
                        self.bump();
                        break;
                    }
                    _ => return Err(self.err("expected ',' or ')'")),
                }
            }
        }

        let name = self.parse_label();
        let branch_length = if self.peek() == Some(b':') {
            self.bump();
            Some(self.parse_number()?)
        } else {
            None
        };
        let nhx = self.parse_nhx_comment()?;

        Ok(RawNode {
            name,
            branch_length,
            nhx,
            children,
        })
    }

    fn parse_label(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b'(' | b')' | b',' | b':' | b';' | b'[') {
                break;
            }
            self.bump();
        }
        String::from_utf8_lossy(&self.src[start..self.pos])
            .trim()
            .to_string()
    }

    fn parse_number(&mut self) -> Result<f64> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, b'.' | b'-' | b'+' | b'e' | b'E') {
                self.bump();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.err("invalid utf-8 in branch length"))?;
        text.parse::<f64>()
            .map_err(|_| self.err(format!("invalid branch length {text:?}")))
    }

    fn parse_nhx_comment(&mut self) -> Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        if self.peek() != Some(b'[') {
            return Ok(map);
        }
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b']' {
                break;
            }
            self.bump();
        }
        let body = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.err("invalid utf-8 in NHX comment"))?;
        if self.peek() == Some(b']') {
            self.bump();
        } else {
            return Err(self.err("unterminated NHX comment"));
        }

        let body = body.strip_prefix("&&NHX").unwrap_or(body);
        for field in body.split(':').filter(|s| !s.is_empty()) {
            if let Some((k, v)) = field.split_once('=') {
                map.insert(k.to_string(), v.to_string());
            }
        }
        Ok(map)
    }
}

/// Parse a Newick/NHX document into a nested node tree.
pub fn parse(src: &str) -> Result<RawNode> {
    let mut p = Parser::new(src);
    let root = p.parse_tree()?;
    if p.pos != p.src.len() {
        // Trailing content after ';' is tolerated (e.g. trailing newline).
        let rest = &p.src[p.pos..];
        if !rest.iter().all(u8::is_ascii_whitespace) {
            return Err(p.err("trailing content after tree"));
        }
    }
    Ok(root)
}

/// Serialize a nested node tree back to Newick/NHX text.
#[must_use]
pub fn serialize(root: &RawNode) -> String {
    let mut out = String::new();
    write_node(root, &mut out);
    out.push(';');
    out
}

fn write_node(node: &RawNode, out: &mut String) {
    if !node.children.is_empty() {
        out.push('(');
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_node(child, out);
        }
        out.push(')');
    }
    out.push_str(&node.name);
    if let Some(bl) = node.branch_length {
        out.push(':');
        out.push_str(&format!("{bl}"));
    }
    if !node.nhx.is_empty() {
        out.push_str("[&&NHX");
        for (k, v) in &node.nhx {
            out.push(':');
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out.push(']');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_tree() {
        let t = parse("((A,B)X,C)R;").unwrap();
        assert_eq!(t.name, "R");
        assert_eq!(t.children.len(), 2);
        assert_eq!(t.children[0].name, "X");
        assert_eq!(t.children[0].children[0].name, "A");
    }

    #[test]
    fn parses_nhx_attributes() {
        let t = parse("A:1[&&NHX:taxid=9606:S=Homo sapiens];").unwrap();
        assert_eq!(t.nhx.get("taxid").map(String::as_str), Some("9606"));
        assert_eq!(t.branch_length, Some(1.0));
    }

    #[test]
    fn round_trips_names() {
        let t = parse("((A,B)X,C)R;").unwrap();
        let s = serialize(&t);
        let t2 = parse(&s).unwrap();
        assert_eq!(t2.name, "R");
        assert_eq!(t2.children[0].children[1].name, "B");
    }
}
