//! Sub-document paths
//!
//! ## Grammar
//! - `a.b.c`      dictionary keys separated by dots
//! - `a[0].b`     array indices in brackets; `-1` addresses the last element
//! - `` `a.b` ``  backticks escape a key; a doubled backtick is a literal one
//! - empty path   the document root
//!
//! A path may hold at most [`MAX_DEPTH`] components.

use super::SubdocError;

/// Deepest path accepted
pub const MAX_DEPTH: usize = 32;

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Key(String),
    /// Array position; `-1` is the last element
    Index(i32),
}

impl Component {
    fn parse(text: &str, is_index: bool) -> Result<Self, SubdocError> {
        if text.is_empty() {
            return Err(SubdocError::PathInvalid);
        }
        if !is_index {
            return Ok(Component::Key(text.to_string()));
        }

        let index: i32 = text.parse().map_err(|_| SubdocError::PathInvalid)?;
        if index < -1 {
            return Err(SubdocError::PathInvalid);
        }
        Ok(Component::Index(index))
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Component::Index(_))
    }
}

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    components: Vec<Component>,
}

impl Path {
    pub fn parse(input: &str) -> Result<Self, SubdocError> {
        let mut path = Path::default();
        let mut current = String::new();
        let mut want_index = false;
        let mut in_escape = false;
        let mut escaped = 0usize;

        for c in input.chars() {
            if c == '`' {
                if in_escape {
                    in_escape = false;
                    if escaped == 0 {
                        current.push('`');
                    }
                } else {
                    in_escape = true;
                    escaped = 0;
                }
                continue;
            }

            if in_escape {
                escaped += 1;
                current.push(c);
                continue;
            }

            match c {
                '[' => {
                    if want_index {
                        return Err(SubdocError::PathInvalid);
                    }
                    if !current.is_empty() {
                        path.push(&mut current, false)?;
                    }
                    want_index = true;
                }
                ']' => {
                    if !want_index {
                        return Err(SubdocError::PathInvalid);
                    }
                    path.push(&mut current, true)?;
                    want_index = false;
                }
                // a dot directly after an index only separates
                '.' if path.last_is_index() && current.is_empty() => {}
                '.' => {
                    path.push(&mut current, false)?;
                    want_index = false;
                }
                _ => current.push(c),
            }
        }

        if want_index || in_escape {
            return Err(SubdocError::PathInvalid);
        }

        if current.is_empty() {
            if !path.components.is_empty() && !path.last_is_index() {
                return Err(SubdocError::PathInvalid);
            }
        } else {
            path.push(&mut current, false)?;
        }

        Ok(path)
    }

    fn push(&mut self, text: &mut String, is_index: bool) -> Result<(), SubdocError> {
        if self.components.len() >= MAX_DEPTH {
            return Err(SubdocError::PathTooBig);
        }
        self.components.push(Component::parse(text, is_index)?);
        text.clear();
        Ok(())
    }

    fn last_is_index(&self) -> bool {
        self.components.last().is_some_and(Component::is_index)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True for the root path
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }
}

impl std::str::FromStr for Path {
    type Err = SubdocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}
