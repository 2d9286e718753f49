//! Sub-document executor
//!
//! Applies one operation at one path of a JSON document.
//!
//! ## Matching
//!
//! A path is resolved component by component. Resolution stops at the first
//! missing key or out-of-range index; the number of components resolved
//! decides what the operation may do:
//!
//! ```text
//! path:   a . b . c
//! depth:  3          found: every component exists
//! depth:  2          immediate parent exists, `c` may be created
//! depth:  < 2        parents missing, only MKDIR_P can create them
//! ```
//!
//! A component of the wrong kind for its parent (an index into an object,
//! a key into an array, anything into a scalar) is a path mismatch.

use serde_json::{Map, Value};

use super::operation::{Payload, SubdocOp};
use super::path::{Component, Path};
use super::SubdocError;

/// Result of applying an operation
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Matched value for lookups, new value for counters, removed value
    /// for removals
    pub matched: Option<Value>,
    /// Document after the operation
    pub document: Value,
}

impl Outcome {
    /// The matched value as compact JSON
    pub fn matched_bytes(&self) -> Vec<u8> {
        self.matched
            .as_ref()
            .and_then(|v| serde_json::to_vec(v).ok())
            .unwrap_or_default()
    }

    /// The document as compact JSON
    pub fn document_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.document).unwrap_or_default()
    }
}

/// Parse `doc` and apply `op` at `path`.
///
/// Order of checks: path syntax, value, document.
pub fn execute(
    doc: &[u8],
    path: &str,
    op: SubdocOp,
    value: &[u8],
    mkdir_p: bool,
) -> Result<Outcome, SubdocError> {
    let path = Path::parse(path)?;
    let payload = op.descriptor().check_payload(value)?;
    let mut document: Value =
        serde_json::from_slice(doc).map_err(|_| SubdocError::DocNotJson)?;

    let matched = apply(&mut document, &path, op, &payload, mkdir_p)?;
    Ok(Outcome { matched, document })
}

/// Document template for a missing document, or `None` when `op` cannot
/// create one at `path`
pub fn root_template(path: &str, op: SubdocOp) -> Option<Value> {
    if path.is_empty() {
        return match op {
            SubdocOp::ArrayAppend | SubdocOp::ArrayPrepend | SubdocOp::AddUnique => {
                Some(Value::Array(Vec::new()))
            }
            _ => None,
        };
    }

    if path.starts_with('[') {
        Some(Value::Array(Vec::new()))
    } else {
        Some(Value::Object(Map::new()))
    }
}

/// Apply an already validated operation to a parsed document
pub fn apply(
    document: &mut Value,
    path: &Path,
    op: SubdocOp,
    payload: &Payload,
    mkdir_p: bool,
) -> Result<Option<Value>, SubdocError> {
    let depth = resolve(document, path)?;
    let mut cx = Context {
        document,
        path,
        depth,
        payload,
        mkdir_p,
    };

    match op {
        SubdocOp::Get | SubdocOp::Exists => cx.found_value().map(|v| Some(v.clone())),
        SubdocOp::GetCount => match cx.found_value()? {
            Value::Object(map) => Ok(Some(Value::from(map.len()))),
            Value::Array(items) => Ok(Some(Value::from(items.len()))),
            _ => Err(SubdocError::PathMismatch),
        },
        SubdocOp::Replace => {
            let value = cx.single()?;
            cx.replace(value)?;
            Ok(None)
        }
        SubdocOp::DictUpsert => {
            if path.last().is_some_and(Component::is_index) {
                return Err(SubdocError::PathInvalid);
            }
            let value = cx.single()?;
            if cx.is_found() {
                cx.replace(value)?;
            } else {
                cx.dict_add(value)?;
            }
            Ok(None)
        }
        SubdocOp::DictAdd => {
            let value = cx.single()?;
            cx.dict_add(value)?;
            Ok(None)
        }
        SubdocOp::ArrayAppend | SubdocOp::ArrayPrepend | SubdocOp::AddUnique => {
            cx.array_add(op)?;
            Ok(None)
        }
        SubdocOp::ArrayInsert => {
            cx.array_insert()?;
            Ok(None)
        }
        SubdocOp::Remove => cx.remove().map(Some),
        SubdocOp::Counter => cx.counter().map(Some),
    }
}

/// Number of leading path components that exist in `root`
fn resolve(root: &Value, path: &Path) -> Result<usize, SubdocError> {
    let mut parent = root;
    let mut depth = 0;

    for component in path.components() {
        let next = match (component, parent) {
            (Component::Index(index), Value::Array(items)) => {
                resolve_index(items.len(), *index).and_then(|i| items.get(i))
            }
            (Component::Key(key), Value::Object(map)) => map.get(key),
            _ => return Err(SubdocError::PathMismatch),
        };

        match next {
            Some(value) => {
                parent = value;
                depth += 1;
            }
            None => break,
        }
    }

    Ok(depth)
}

fn resolve_index(len: usize, index: i32) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if index == -1 {
        return Some(len - 1);
    }
    let index = usize::try_from(index).ok()?;
    (index < len).then_some(index)
}

/// Walk the first `depth` components, which [`resolve`] has proven exist
fn node_mut<'a>(
    root: &'a mut Value,
    components: &[Component],
) -> Result<&'a mut Value, SubdocError> {
    let mut node = root;
    for component in components {
        node = match (component, node) {
            (Component::Index(index), Value::Array(items)) => {
                let at = resolve_index(items.len(), *index).ok_or(SubdocError::PathNotFound)?;
                items.get_mut(at).ok_or(SubdocError::PathNotFound)?
            }
            (Component::Key(key), Value::Object(map)) => {
                map.get_mut(key).ok_or(SubdocError::PathNotFound)?
            }
            _ => return Err(SubdocError::PathMismatch),
        };
    }
    Ok(node)
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

struct Context<'a> {
    document: &'a mut Value,
    path: &'a Path,
    depth: usize,
    payload: &'a Payload,
    mkdir_p: bool,
}

impl Context<'_> {
    fn is_found(&self) -> bool {
        self.depth == self.path.len()
    }

    fn has_immediate_parent(&self) -> bool {
        self.path.is_empty() || self.depth + 1 >= self.path.len()
    }

    fn single(&self) -> Result<Value, SubdocError> {
        self.payload.single().cloned().ok_or(SubdocError::CantInsert)
    }

    fn found_value(&mut self) -> Result<&mut Value, SubdocError> {
        if !self.is_found() {
            return Err(SubdocError::PathNotFound);
        }
        node_mut(self.document, self.path.components())
    }

    /// The container the last component lives in
    fn parent_mut(&mut self) -> Result<&mut Value, SubdocError> {
        let components = self.path.components();
        let parent_len = components.len().saturating_sub(1);
        node_mut(self.document, &components[..parent_len])
    }

    /// Deepest node that exists along the path
    fn deepest_mut(&mut self) -> Result<&mut Value, SubdocError> {
        node_mut(self.document, &self.path.components()[..self.depth])
    }

    fn replace(&mut self, value: Value) -> Result<(), SubdocError> {
        if !self.is_found() {
            return Err(SubdocError::PathNotFound);
        }
        if self.path.is_empty() {
            return Err(SubdocError::CantInsert);
        }
        *self.found_value()? = value;
        Ok(())
    }

    fn dict_add(&mut self, value: Value) -> Result<(), SubdocError> {
        if self.is_found() {
            return Err(SubdocError::PathExists);
        }

        if !self.has_immediate_parent() {
            if !self.mkdir_p {
                return Err(SubdocError::PathNotFound);
            }
            return self.create_parents(value);
        }

        let key = match self.path.last() {
            Some(Component::Key(key)) => key.clone(),
            _ => return Err(SubdocError::PathMismatch),
        };
        match self.parent_mut()? {
            Value::Object(map) => {
                map.insert(key, value);
                Ok(())
            }
            _ => Err(SubdocError::PathMismatch),
        }
    }

    /// Create the missing dictionaries along the path and store `leaf` at
    /// its end. Array positions are never fabricated.
    fn create_parents(&mut self, leaf: Value) -> Result<(), SubdocError> {
        let path = self.path;
        let depth = self.depth;

        if !matches!(self.deepest_mut()?, Value::Object(_)) {
            return Err(SubdocError::PathMismatch);
        }

        let Some((last, middle)) = path.components()[depth..].split_last() else {
            return Err(SubdocError::PathExists);
        };
        let Component::Key(leaf_key) = last else {
            return Err(SubdocError::PathNotFound);
        };

        let mut built = leaf;
        let mut key = leaf_key.clone();
        for component in middle.iter().rev() {
            let Component::Key(parent_key) = component else {
                return Err(SubdocError::PathNotFound);
            };
            let mut map = Map::new();
            map.insert(key, built);
            built = Value::Object(map);
            key = parent_key.clone();
        }

        let Value::Object(map) = self.deepest_mut()? else {
            return Err(SubdocError::PathMismatch);
        };
        map.insert(key, built);
        Ok(())
    }

    fn array_add(&mut self, op: SubdocOp) -> Result<(), SubdocError> {
        let values = self.payload.values();

        if !self.is_found() {
            if !self.mkdir_p {
                return Err(SubdocError::PathNotFound);
            }
            return self.create_parents(Value::Array(values));
        }

        let Value::Array(items) = self.found_value()? else {
            return Err(SubdocError::PathMismatch);
        };

        if op == SubdocOp::AddUnique {
            ensure_unique(items, &values)?;
        }

        if op == SubdocOp::ArrayAppend || op == SubdocOp::AddUnique {
            items.extend(values);
        } else {
            let tail = std::mem::replace(items, values);
            items.extend(tail);
        }
        Ok(())
    }

    fn array_insert(&mut self) -> Result<(), SubdocError> {
        let position = match self.path.last() {
            Some(Component::Index(-1)) | Some(Component::Key(_)) | None => {
                return Err(SubdocError::PathInvalid)
            }
            Some(Component::Index(i)) => *i as usize,
        };

        if !self.has_immediate_parent() {
            return Err(SubdocError::PathNotFound);
        }

        let values = self.payload.values();
        let Value::Array(items) = self.parent_mut()? else {
            return Err(SubdocError::PathMismatch);
        };
        if position > items.len() {
            return Err(SubdocError::PathNotFound);
        }
        let tail = items.split_off(position);
        items.extend(values);
        items.extend(tail);
        Ok(())
    }

    fn remove(&mut self) -> Result<Value, SubdocError> {
        if !self.is_found() {
            return Err(SubdocError::PathNotFound);
        }
        let last = match self.path.last() {
            Some(last) => last.clone(),
            None => return Err(SubdocError::CantInsert),
        };

        match (self.parent_mut()?, last) {
            (Value::Object(map), Component::Key(key)) => {
                map.remove(&key).ok_or(SubdocError::PathNotFound)
            }
            (Value::Array(items), Component::Index(index)) => {
                let at = resolve_index(items.len(), index).ok_or(SubdocError::PathNotFound)?;
                Ok(items.remove(at))
            }
            _ => Err(SubdocError::PathMismatch),
        }
    }

    fn counter(&mut self) -> Result<Value, SubdocError> {
        let delta = match self.single()? {
            Value::Number(n) => n.as_i64().ok_or(SubdocError::DeltaRange)?,
            _ => return Err(SubdocError::DeltaRange),
        };
        if delta == 0 {
            return Err(SubdocError::DeltaRange);
        }

        if self.is_found() {
            let current = match self.found_value()? {
                Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                    (Some(current), _) => current,
                    (None, Some(_)) => return Err(SubdocError::NumRange),
                    (None, None) => return Err(SubdocError::PathMismatch),
                },
                _ => return Err(SubdocError::PathMismatch),
            };
            let result = current
                .checked_add(delta)
                .ok_or(SubdocError::DeltaRange)?;
            let result = Value::from(result);
            self.replace(result.clone())?;
            return Ok(result);
        }

        let result = Value::from(delta);
        let parent_is_object = self.has_immediate_parent()
            && matches!(self.parent_mut(), Ok(Value::Object(_)));
        if parent_is_object {
            self.dict_add(result.clone())?;
        } else if self.mkdir_p && matches!(self.deepest_mut(), Ok(Value::Object(_))) {
            self.create_parents(result.clone())?;
        } else {
            return Err(SubdocError::PathNotFound);
        }
        Ok(result)
    }
}

fn ensure_unique(items: &[Value], values: &[Value]) -> Result<(), SubdocError> {
    for value in values {
        if !is_primitive(value) {
            return Err(SubdocError::CantInsert);
        }
        for item in items {
            if !is_primitive(item) {
                return Err(SubdocError::PathMismatch);
            }
            if item == value {
                return Err(SubdocError::PathExists);
            }
        }
    }
    Ok(())
}
