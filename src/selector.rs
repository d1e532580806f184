use std::fmt;

use thiserror::Error;

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("unexpected {found:?} at offset {position} in selector {selector:?}")]
    Unexpected {
        selector: String,
        found: char,
        position: usize,
    },
    #[error("selector {selector:?} ended unexpectedly")]
    UnexpectedEnd { selector: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrFilter {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrFilter>,
}

/// Compounds joined by descendant combinators, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Complex>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser {
            input,
            chars: input.chars().collect(),
            pos: 0,
        };
        let groups = parser.parse_list()?;
        Ok(Self {
            source: input.to_string(),
            groups,
        })
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.groups.iter().any(|group| group.matches(doc, node))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Complex {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((last, ancestors)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(doc, node) {
            return false;
        }
        // Greedy right-to-left walk is exact for descendant-only chains.
        let mut current = doc.parent(node);
        for part in ancestors.iter().rev() {
            loop {
                let Some(id) = current else {
                    return false;
                };
                current = doc.parent(id);
                if part.matches(doc, id) {
                    break;
                }
            }
        }
        true
    }
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag
            && doc.tag(node) != tag.as_str()
        {
            return false;
        }
        if !self.classes.iter().all(|class| doc.has_class(node, class)) {
            return false;
        }
        self.attrs.iter().all(|filter| {
            let Some(value) = doc.attr(node, &filter.name) else {
                return false;
            };
            match &filter.op {
                AttrOp::Exists => true,
                AttrOp::Equals(expected) => value == expected,
                AttrOp::Contains(needle) => !needle.is_empty() && value.contains(needle.as_str()),
                AttrOp::Prefix(prefix) => !prefix.is_empty() && value.starts_with(prefix.as_str()),
                AttrOp::Suffix(suffix) => !suffix.is_empty() && value.ends_with(suffix.as_str()),
            }
        })
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_list(&mut self) -> Result<Vec<Complex>, SelectorError> {
        let mut groups = vec![self.parse_complex()?];
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.pos += 1;
                    groups.push(self.parse_complex()?);
                }
                Some(c) => return Err(self.unexpected(c)),
            }
        }
        Ok(groups)
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        self.skip_ws();
        let mut parts = vec![self.parse_compound()?];
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some(',') => break,
                Some(_) if had_ws => parts.push(self.parse_compound()?),
                Some(c) => return Err(self.unexpected(c)),
            }
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let start = self.pos;
        let mut compound = Compound::default();
        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attr_filter()?);
                }
                _ => break,
            }
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.unexpected(c),
                None => self.unexpected_end(),
            });
        }
        Ok(compound)
    }

    fn attr_filter(&mut self) -> Result<AttrFilter, SelectorError> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op: fn(String) -> AttrOp = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrFilter {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c @ ('*' | '^' | '$')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    _ => AttrOp::Suffix,
                }
            }
            Some(c) => return Err(self.unexpected(c)),
            None => return Err(self.unexpected_end()),
        };
        self.skip_ws();
        let value = self.value()?;
        self.skip_ws();
        self.expect(']')?;
        Ok(AttrFilter {
            name,
            op: op(value),
        })
    }

    fn value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == quote {
                        let value = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(value);
                    }
                    self.pos += 1;
                }
                Err(self.unexpected_end())
            }
            _ => self.ident(),
        }
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.unexpected(c),
                None => self.unexpected_end(),
            });
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn expect(&mut self, wanted: char) -> Result<(), SelectorError> {
        match self.peek() {
            Some(c) if c == wanted => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.unexpected(c)),
            None => Err(self.unexpected_end()),
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            selector: self.input.to_string(),
            found,
            position: self.pos,
        }
    }

    fn unexpected_end(&self) -> SelectorError {
        SelectorError::UnexpectedEnd {
            selector: self.input.to_string(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let controls = doc.create_element("div", &[("class", "card-pool-controls")]);
        let sets = doc.create_element("div", &[("class", "selected-sets wide")]);
        let icon = doc.create_element("img", &[("class", "set-icon"), ("alt", "fin")]);
        doc.append_child(doc.body(), controls);
        doc.append_child(controls, sets);
        doc.append_child(sets, icon);
        (doc, sets, icon)
    }

    #[test]
    fn descendant_chain_matches_through_ancestors() {
        let (doc, _, icon) = page();
        let sel = Selector::parse(".card-pool-controls .selected-sets .set-icon[alt]").unwrap();
        assert!(sel.matches(&doc, icon));
        let miss = Selector::parse(".draft-controls .set-icon").unwrap();
        assert!(!miss.matches(&doc, icon));
    }

    #[test]
    fn attribute_operators() {
        let mut doc = Document::new();
        let img = doc.create_element(
            "img",
            &[("alt", "Bolt"), ("src", "https://cards.scryfall.io/large/x.jpg")],
        );
        doc.append_child(doc.body(), img);
        assert!(Selector::parse(r#"img[alt][src*="cards.scryfall.io"]"#).unwrap().matches(&doc, img));
        assert!(Selector::parse("[src^='https']").unwrap().matches(&doc, img));
        assert!(Selector::parse("[alt=Bolt]").unwrap().matches(&doc, img));
        assert!(!Selector::parse(r#"img[src*="17lands"]"#).unwrap().matches(&doc, img));
        assert!(!Selector::parse("div[alt]").unwrap().matches(&doc, img));
    }

    #[test]
    fn groups_and_class_substring() {
        let (doc, sets, _) = page();
        let sel = Selector::parse(r#"h1, [class*="set"], [class*="expansion"]"#).unwrap();
        assert!(sel.matches(&doc, sets));
        assert_eq!(doc.query_selector_all(&sel).len(), 2);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("div[alt").is_err());
        assert!(Selector::parse("div > span").is_err());
        assert!(Selector::parse("a,").is_err());
    }
}
