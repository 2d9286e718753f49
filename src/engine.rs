//! Engine Module
//!
//! The command executor behind every connection.
//!
//! ## Responsibilities
//! - Validate the shape (extras, key, value) of each request
//! - Run key-value commands against the [`ItemTable`]
//! - Lock, unlock, touch and sample items
//! - Run sub-document commands, single path and multi path
//! - Suppress replies for quiet opcodes
//!
//! Every failure here is per request: it becomes a reply status and the
//! connection keeps going.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use bytes::Buf;

use crate::network::{CommandExecutor, Connection};
use crate::protocol::{CommandFrame, Opcode, Reply, Status, DATATYPE_JSON};
use crate::store::{Item, ItemTable, StoreError, DEFAULT_LOCK_TIME, MAX_LOCK_SECS};
use crate::subdoc::{
    self, describe, root_template, OperationDescriptor, Path, SubdocError, SubdocOp,
    DOC_FLAG_ADD, DOC_FLAG_CREATE_MASK, PATH_FLAG_MKDIR_P, PATH_FLAG_XATTR,
};

type Handled = std::result::Result<Reply, Status>;

/// Arithmetic expiry meaning "fail instead of creating the counter"
const NO_AUTO_CREATE: u32 = 0xffff_ffff;

/// Bound on optimistic retries when a concurrent writer wins the CAS race
const MAX_CAS_RETRIES: usize = 64;

/// The mock's command executor
///
/// ## Concurrency Model
///
/// Connections call [`CommandExecutor::execute`] from their own threads.
/// The item table serializes writes; read-modify-write commands (append,
/// arithmetic, sub-document mutations) read an item, compute the new one,
/// and store it with compare-and-swap, retrying if another writer got there
/// first.
pub struct Engine {
    items: ItemTable,

    /// Last level a client asked for with VERBOSITY
    verbosity: AtomicU32,

    started: Instant,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            items: ItemTable::new(),
            verbosity: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    /// The item table (for testing and debugging)
    pub fn items(&self) -> &ItemTable {
        &self.items
    }

    pub fn verbosity(&self) -> u32 {
        self.verbosity.load(Ordering::Relaxed)
    }

    /// Route a loud opcode to its handler
    fn dispatch(&self, opcode: Opcode, frame: &CommandFrame, conn: &mut Connection) -> Handled {
        match opcode {
            Opcode::Get | Opcode::GetK => self.get(frame, opcode == Opcode::GetK),
            Opcode::Set | Opcode::Add | Opcode::Replace => self.store(opcode, frame),
            Opcode::Append | Opcode::Prepend => self.concat(opcode, frame),
            Opcode::Delete => self.delete(frame),
            Opcode::Increment | Opcode::Decrement => self.arithmetic(opcode, frame),
            Opcode::Touch | Opcode::Gat => self.touch(frame, opcode == Opcode::Gat),
            Opcode::GetLocked => self.get_locked(frame),
            Opcode::UnlockKey => self.unlock(frame),
            Opcode::GetRandom => self.get_random(frame),
            Opcode::Noop => {
                expect_shape(frame, &[0], false, false)?;
                Ok(Reply::success())
            }
            Opcode::Version => {
                expect_shape(frame, &[0], false, false)?;
                Ok(Reply::success().with_value(format!("kvmock-{}", crate::VERSION)))
            }
            Opcode::Hello => {
                // Any agent name and feature list; none are enabled
                if !frame.extras().is_empty() {
                    return Err(Status::InvalidArguments);
                }
                Ok(Reply::success())
            }
            Opcode::Verbosity => {
                expect_shape(frame, &[4], false, false)?;
                let level = frame.extras().get_u32();
                self.verbosity.store(level, Ordering::Relaxed);
                tracing::debug!("Verbosity set to {} by {}", level, conn.peer_addr());
                Ok(Reply::success())
            }
            Opcode::Stat => self.stats(frame, conn),
            Opcode::Flush => {
                expect_shape(frame, &[0, 4], false, false)?;
                self.items.flush();
                Ok(Reply::success())
            }
            Opcode::Quit => {
                conn.request_close();
                Ok(Reply::success())
            }
            Opcode::SubdocMultiLookup => self.subdoc_multi_lookup(frame),
            Opcode::SubdocMultiMutation => self.subdoc_multi_mutation(frame),
            op if op.is_subdoc_single() => self.subdoc_single(op, frame),
            _ => Err(Status::UnknownCommand),
        }
    }

    // =========================================================================
    // Key-value commands
    // =========================================================================

    fn get(&self, frame: &CommandFrame, with_key: bool) -> Handled {
        expect_shape(frame, &[0], true, false)?;
        let item = self.items.get(frame.key()).ok_or(Status::KeyNotFound)?;

        let mut reply = item_reply(item);
        if with_key {
            reply = reply.with_key(frame.key());
        }
        Ok(reply)
    }

    fn store(&self, opcode: Opcode, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[8], true, true)?;
        let mut extras = frame.extras();
        let flags = extras.get_u32();
        let expiry = extras.get_u32();

        let item = Item::new(frame.value()).with_flags(flags).with_expiry(expiry);
        let key = frame.key();
        let cas = match opcode {
            Opcode::Add if frame.cas() != 0 => return Err(Status::InvalidArguments),
            Opcode::Add => self.items.add(key, item),
            Opcode::Replace => self.items.replace(key, item, frame.cas()),
            _ => self.items.set(key, item, frame.cas()),
        }?;
        Ok(Reply::success().with_cas(cas))
    }

    fn concat(&self, opcode: Opcode, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[0], true, true)?;
        let addition = frame.value();

        let item = self.items.modify(frame.key(), frame.cas(), |existing| {
            let mut updated = existing.cloned().ok_or(StoreError::NotStored)?;
            if opcode == Opcode::Append {
                updated.value.extend_from_slice(addition);
            } else {
                let mut value = addition.to_vec();
                value.extend_from_slice(&updated.value);
                updated.value = value;
            }
            Ok(updated)
        })?;
        Ok(Reply::success().with_cas(item.cas))
    }

    fn delete(&self, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[0], true, false)?;
        self.items.delete(frame.key(), frame.cas())?;
        Ok(Reply::success())
    }

    /// TOUCH replies bare; GAT also returns the item
    fn touch(&self, frame: &CommandFrame, with_item: bool) -> Handled {
        expect_shape(frame, &[4], true, false)?;
        let expiry = frame.extras().get_u32();
        let item = self.items.touch(frame.key(), expiry)?;
        if with_item {
            Ok(item_reply(item))
        } else {
            Ok(Reply::success().with_cas(item.cas))
        }
    }

    /// Extras: optional lock time in seconds (4)
    fn get_locked(&self, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[0, 4], true, false)?;
        let secs = if frame.extras().is_empty() {
            0
        } else {
            frame.extras().get_u32()
        };
        let duration = if secs == 0 || secs > MAX_LOCK_SECS {
            DEFAULT_LOCK_TIME
        } else {
            Duration::from_secs(u64::from(secs))
        };

        let item = self.items.lock(frame.key(), duration)?;
        Ok(item_reply(item))
    }

    fn unlock(&self, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[0], true, false)?;
        self.items.unlock(frame.key(), frame.cas())?;
        Ok(Reply::success())
    }

    fn get_random(&self, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[0], false, false)?;
        let (key, item) = self.items.random().ok_or(Status::KeyNotFound)?;
        Ok(item_reply(item).with_key(key))
    }

    /// One reply per stat, then an empty success reply ends the list.
    ///
    /// A key asks for that stat alone.
    fn stats(&self, frame: &CommandFrame, conn: &mut Connection) -> Handled {
        if !frame.extras().is_empty() || !frame.value().is_empty() {
            return Err(Status::InvalidArguments);
        }

        let stats = [
            ("pid", std::process::id().to_string()),
            ("uptime", self.started.elapsed().as_secs().to_string()),
            ("version", crate::VERSION.to_string()),
            ("curr_items", self.items.len().to_string()),
            ("verbosity", self.verbosity().to_string()),
        ];
        let wanted = frame.key();
        for (name, value) in stats {
            if wanted.is_empty() || wanted == name.as_bytes() {
                let reply = Reply::success().with_key(name).with_value(value);
                conn.enqueue_response(reply.encode(frame.header()));
            }
        }
        Ok(Reply::success())
    }

    fn arithmetic(&self, opcode: Opcode, frame: &CommandFrame) -> Handled {
        expect_shape(frame, &[20], true, false)?;
        let mut extras = frame.extras();
        let delta = extras.get_u64();
        let initial = extras.get_u64();
        let expiry = extras.get_u32();
        let key = frame.key();

        for _ in 0..MAX_CAS_RETRIES {
            let stored = match self.items.get(key) {
                None => {
                    if expiry == NO_AUTO_CREATE || frame.cas() != 0 {
                        return Err(Status::KeyNotFound);
                    }
                    let item = Item::new(initial.to_string()).with_expiry(expiry);
                    self.items.add(key, item).map(|cas| (initial, cas))
                }
                Some(existing) => {
                    if !existing.admits(frame.cas()) {
                        return Err(Status::TemporaryFailure);
                    }
                    if frame.cas() != 0 && existing.cas != frame.cas() {
                        return Err(Status::KeyExists);
                    }
                    let current = std::str::from_utf8(&existing.value)
                        .ok()
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .ok_or(Status::DeltaBadval)?;
                    let next = if opcode == Opcode::Increment {
                        current.wrapping_add(delta)
                    } else {
                        current.saturating_sub(delta)
                    };
                    let mut item = existing.clone();
                    item.value = next.to_string().into_bytes();
                    self.items
                        .compare_and_swap(key, existing.cas, item)
                        .map(|cas| (next, cas))
                }
            };

            match stored {
                Ok((value, cas)) => {
                    return Ok(Reply::success()
                        .with_value(value.to_be_bytes())
                        .with_cas(cas))
                }
                Err(StoreError::Exists) | Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e.status()),
            }
        }

        tracing::debug!("Arithmetic on contended key gave up after {} retries", MAX_CAS_RETRIES);
        Err(Status::TemporaryFailure)
    }

    // =========================================================================
    // Sub-document commands
    // =========================================================================

    fn subdoc_single(&self, opcode: Opcode, frame: &CommandFrame) -> Handled {
        let request = SingleRequest::parse(opcode, frame)?;
        let desc = request.descriptor;
        let op = desc.op().ok_or(Status::UnknownCommand)?;

        let mkdoc = request.doc_flags & DOC_FLAG_CREATE_MASK != 0;
        if mkdoc && !desc.is_creative {
            return Err(Status::InvalidArguments);
        }

        // Value rules are checked before any document is touched
        let payload = desc.check_payload(request.value)?;
        let path_text = std::str::from_utf8(request.path).map_err(|_| SubdocError::PathInvalid)?;
        let path = Path::parse(path_text)?;

        let xattr = request.path_flags & PATH_FLAG_XATTR != 0;
        let mkdir_p = request.path_flags & PATH_FLAG_MKDIR_P != 0 || mkdoc;
        let key = frame.key();

        for _ in 0..MAX_CAS_RETRIES {
            let (existing, needs_create) = match self.items.get(key) {
                Some(item) => {
                    if request.doc_flags & DOC_FLAG_ADD != 0 {
                        return Err(Status::KeyExists);
                    }
                    (item, false)
                }
                None => {
                    if !mkdoc {
                        return Err(Status::KeyNotFound);
                    }
                    let template = root_template(path_text, op).ok_or(Status::KeyNotFound)?;
                    let template =
                        serde_json::to_vec(&template).map_err(|_| Status::InternalError)?;
                    let item = if xattr {
                        Item::default().with_xattrs(Some(template))
                    } else {
                        Item::new(template)
                    };
                    (item, true)
                }
            };

            if !needs_create && !existing.admits(frame.cas()) {
                return Err(Status::KeyExists);
            }
            if frame.cas() != 0 && !needs_create && existing.cas != frame.cas() {
                return Err(Status::KeyExists);
            }

            let current = if xattr {
                existing.xattrs.clone().unwrap_or_else(|| b"{}".to_vec())
            } else {
                existing.value.clone()
            };
            let mut document: serde_json::Value =
                serde_json::from_slice(&current).map_err(|_| SubdocError::DocNotJson)?;

            let matched = subdoc::executor::apply(&mut document, &path, op, &payload, mkdir_p)?;
            let value = match (desc.returns_match, matched) {
                (true, Some(m)) => serde_json::to_vec(&m).map_err(|_| Status::InternalError)?,
                _ => Vec::new(),
            };

            if desc.is_lookup() {
                return Ok(Reply::success()
                    .with_value(value)
                    .with_data_type(DATATYPE_JSON)
                    .with_cas(existing.cas));
            }

            let new_doc = serde_json::to_vec(&document).map_err(|_| Status::InternalError)?;
            // Single-path mutations always write the request's expiry
            let mut item = existing.clone().with_expiry(request.expiry.unwrap_or(0));
            if xattr {
                item.xattrs = Some(new_doc);
            } else {
                item.value = new_doc;
            }

            let stored = if needs_create {
                self.items.add(key, item)
            } else {
                self.items.compare_and_swap(key, existing.cas, item)
            };

            match stored {
                Ok(cas) => {
                    return Ok(Reply::success()
                        .with_value(value)
                        .with_data_type(DATATYPE_JSON)
                        .with_cas(cas))
                }
                Err(StoreError::Exists) | Err(StoreError::NotFound) if frame.cas() == 0 => continue,
                Err(e) => return Err(e.status()),
            }
        }

        Err(Status::TemporaryFailure)
    }

    fn subdoc_multi_lookup(&self, frame: &CommandFrame) -> Handled {
        let header = MultiHeader::parse(frame)?;
        if header.expiry.is_some() || header.doc_flags != 0 {
            return Err(Status::InvalidArguments);
        }
        let specs = parse_lookup_specs(frame.value())?;
        let item = self.items.get(frame.key()).ok_or(Status::KeyNotFound)?;
        let attrs = item.xattrs.clone().unwrap_or_else(|| b"{}".to_vec());

        let mut body = Vec::new();
        let mut failed = false;

        for spec in &specs {
            let desc = describe(spec.opcode);
            let (status, value) = match desc.op() {
                None => (Status::UnknownCommand, Vec::new()),
                Some(_) if !desc.is_lookup() => return Err(Status::SubdocInvalidCombo),
                Some(op) => {
                    let doc = if spec.flags & PATH_FLAG_XATTR != 0 {
                        &attrs
                    } else {
                        &item.value
                    };
                    match run_spec(doc, spec, op, false) {
                        Ok(outcome) if desc.returns_match => {
                            (Status::Success, outcome.matched_bytes())
                        }
                        Ok(_) => (Status::Success, Vec::new()),
                        Err(SubdocError::DocNotJson) => return Err(Status::SubdocDocNotJson),
                        Err(e) => (e.status(), Vec::new()),
                    }
                }
            };

            failed |= !status.is_success();
            body.extend_from_slice(&status.code().to_be_bytes());
            body.extend_from_slice(&(value.len() as u32).to_be_bytes());
            body.extend_from_slice(&value);
        }

        let status = if failed {
            Status::SubdocMultiPathFailure
        } else {
            Status::Success
        };
        Ok(Reply::status(status).with_value(body).with_cas(item.cas))
    }

    fn subdoc_multi_mutation(&self, frame: &CommandFrame) -> Handled {
        let header = MultiHeader::parse(frame)?;
        let specs = parse_mutation_specs(frame.value())?;
        let key = frame.key();
        let create = header.doc_flags & DOC_FLAG_CREATE_MASK != 0;

        for _ in 0..MAX_CAS_RETRIES {
            let (existing, needs_create) = match self.items.get(key) {
                Some(item) => {
                    if header.doc_flags & DOC_FLAG_ADD != 0 {
                        return Err(Status::KeyExists);
                    }
                    (item, false)
                }
                None => {
                    if !create {
                        return Err(Status::KeyNotFound);
                    }
                    let template = specs
                        .iter()
                        .find_map(|spec| {
                            let op = SubdocOp::try_from(spec.opcode).ok()?;
                            root_template(std::str::from_utf8(&spec.path).ok()?, op)
                        })
                        .ok_or(Status::KeyNotFound)?;
                    let template =
                        serde_json::to_vec(&template).map_err(|_| Status::InternalError)?;
                    (Item::new(template), true)
                }
            };

            if !needs_create && !existing.admits(frame.cas()) {
                return Err(Status::KeyExists);
            }
            if frame.cas() != 0 && !needs_create && existing.cas != frame.cas() {
                return Err(Status::KeyExists);
            }

            let mut doc = existing.value.clone();
            let mut attrs = existing.xattrs.clone().unwrap_or_else(|| b"{}".to_vec());
            let mut touched_attrs = false;
            let mut results: Vec<(u8, Vec<u8>)> = Vec::new();

            for (index, spec) in specs.iter().enumerate() {
                let index = index as u8;
                let desc = describe(spec.opcode);
                let op = match desc.op() {
                    None => return Ok(mutation_failure(Status::UnknownCommand, index)),
                    Some(_) if !desc.is_mutator => {
                        return Ok(mutation_failure(Status::SubdocInvalidCombo, index))
                    }
                    Some(op) => op,
                };

                let xattr = spec.flags & PATH_FLAG_XATTR != 0;
                let target = if xattr { &attrs } else { &doc };
                let outcome = match run_spec(target, spec, op, create) {
                    Ok(outcome) => outcome,
                    Err(e) => return Ok(mutation_failure(e.status(), index)),
                };

                if desc.returns_match {
                    results.push((index, outcome.matched_bytes()));
                }
                if xattr {
                    attrs = outcome.document_bytes();
                    touched_attrs = true;
                } else {
                    doc = outcome.document_bytes();
                }
            }

            let mut item = existing.clone();
            item.value = doc;
            if let Some(expiry) = header.expiry {
                item.expiry = expiry;
            }
            if touched_attrs {
                item.xattrs = Some(attrs);
            }

            let stored = if needs_create {
                self.items.add(key, item)
            } else {
                self.items.compare_and_swap(key, existing.cas, item)
            };

            match stored {
                Ok(cas) => {
                    let mut body = Vec::new();
                    for (index, value) in results {
                        body.push(index);
                        body.extend_from_slice(&Status::Success.code().to_be_bytes());
                        body.extend_from_slice(&(value.len() as u32).to_be_bytes());
                        body.extend_from_slice(&value);
                    }
                    return Ok(Reply::success().with_value(body).with_cas(cas));
                }
                Err(StoreError::Exists) | Err(StoreError::NotFound) if frame.cas() == 0 => continue,
                Err(e) => return Err(e.status()),
            }
        }

        Err(Status::TemporaryFailure)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for Engine {
    fn execute(&self, frame: CommandFrame, conn: &mut Connection) {
        tracing::trace!(
            "Executing opcode 0x{:02x} from {} (opaque={})",
            frame.opcode(),
            conn.peer_addr(),
            frame.opaque()
        );

        let opcode = match Opcode::try_from(frame.opcode()) {
            Ok(opcode) => opcode,
            Err(unknown) => {
                tracing::debug!("Unknown opcode 0x{:02x} from {}", unknown, conn.peer_addr());
                conn.enqueue_response(Reply::status(Status::UnknownCommand).encode(frame.header()));
                return;
            }
        };

        if opcode == Opcode::QuitQ {
            conn.request_close();
            return;
        }

        let loud = opcode.to_non_quiet();
        let reply = self
            .dispatch(loud, &frame, conn)
            .unwrap_or_else(Reply::status);

        if opcode.is_quiet() {
            let silent = match loud {
                Opcode::Get | Opcode::GetK | Opcode::Gat => reply.status == Status::KeyNotFound,
                _ => reply.status.is_success(),
            };
            if silent {
                return;
            }
        }

        conn.enqueue_response(reply.encode(frame.header()));
    }
}

// =============================================================================
// Request shapes
// =============================================================================

/// Flags extras, value and CAS of an item
fn item_reply(item: Item) -> Reply {
    Reply::success()
        .with_extras(item.flags.to_be_bytes())
        .with_value(item.value)
        .with_cas(item.cas)
}

/// Check extras length, key presence and value presence
fn expect_shape(
    frame: &CommandFrame,
    extras_lengths: &[usize],
    needs_key: bool,
    allows_value: bool,
) -> std::result::Result<(), Status> {
    let extras_ok = extras_lengths.contains(&frame.extras().len());
    let key_ok = needs_key != frame.key().is_empty();
    let value_ok = allows_value || frame.value().is_empty();
    if extras_ok && key_ok && value_ok {
        Ok(())
    } else {
        Err(Status::InvalidArguments)
    }
}

/// A single-path sub-document request, split into its parts
struct SingleRequest<'a> {
    descriptor: &'static OperationDescriptor,
    path_flags: u8,
    doc_flags: u8,
    expiry: Option<u32>,
    path: &'a [u8],
    value: &'a [u8],
}

impl<'a> SingleRequest<'a> {
    /// Extras: path length (2) + path flags (1) [+ expiry (4)] [+ doc flags (1)]
    fn parse(opcode: Opcode, frame: &'a CommandFrame) -> std::result::Result<Self, Status> {
        let extras = frame.extras();
        if !matches!(extras.len(), 3 | 4 | 7 | 8) || frame.key().is_empty() {
            return Err(Status::InvalidArguments);
        }

        let mut cursor = extras;
        let path_len = cursor.get_u16() as usize;
        let path_flags = cursor.get_u8();
        let expiry = (extras.len() >= 7).then(|| cursor.get_u32());
        let doc_flags = if cursor.has_remaining() { cursor.get_u8() } else { 0 };

        let body = frame.value();
        if path_len > body.len() {
            return Err(Status::InvalidArguments);
        }

        Ok(Self {
            descriptor: describe(opcode as u8),
            path_flags,
            doc_flags,
            expiry,
            path: &body[..path_len],
            value: &body[path_len..],
        })
    }
}

/// Extras of a multi-path request: [expiry (4)] [+ doc flags (1)]
struct MultiHeader {
    expiry: Option<u32>,
    doc_flags: u8,
}

impl MultiHeader {
    fn parse(frame: &CommandFrame) -> std::result::Result<Self, Status> {
        let mut extras = frame.extras();
        if !matches!(extras.len(), 0 | 1 | 4 | 5) || frame.key().is_empty() {
            return Err(Status::InvalidArguments);
        }
        let expiry = (extras.len() >= 4).then(|| extras.get_u32());
        let doc_flags = if extras.has_remaining() { extras.get_u8() } else { 0 };
        Ok(Self { expiry, doc_flags })
    }
}

/// One path of a multi-path request
struct MultiSpec {
    opcode: u8,
    flags: u8,
    path: Vec<u8>,
    value: Vec<u8>,
}

/// Lookup specs: opcode (1) flags (1) path length (2) path
fn parse_lookup_specs(mut body: &[u8]) -> std::result::Result<Vec<MultiSpec>, Status> {
    let mut specs = Vec::new();
    while body.has_remaining() {
        if body.remaining() < 4 {
            return Err(Status::InvalidArguments);
        }
        let opcode = body.get_u8();
        let flags = body.get_u8();
        let path_len = body.get_u16() as usize;
        if body.remaining() < path_len {
            return Err(Status::InvalidArguments);
        }
        let path = body[..path_len].to_vec();
        body.advance(path_len);
        specs.push(MultiSpec {
            opcode,
            flags,
            path,
            value: Vec::new(),
        });
    }
    if specs.is_empty() {
        return Err(Status::InvalidArguments);
    }
    Ok(specs)
}

/// Mutation specs: opcode (1) flags (1) path length (2) value length (4) path value
fn parse_mutation_specs(mut body: &[u8]) -> std::result::Result<Vec<MultiSpec>, Status> {
    let mut specs = Vec::new();
    while body.has_remaining() {
        if body.remaining() < 8 {
            return Err(Status::InvalidArguments);
        }
        let opcode = body.get_u8();
        let flags = body.get_u8();
        let path_len = body.get_u16() as usize;
        let value_len = body.get_u32() as usize;
        if body.remaining() < path_len + value_len {
            return Err(Status::InvalidArguments);
        }
        let path = body[..path_len].to_vec();
        body.advance(path_len);
        let value = body[..value_len].to_vec();
        body.advance(value_len);
        specs.push(MultiSpec {
            opcode,
            flags,
            path,
            value,
        });
    }
    if specs.is_empty() {
        return Err(Status::InvalidArguments);
    }
    Ok(specs)
}

fn run_spec(
    doc: &[u8],
    spec: &MultiSpec,
    op: SubdocOp,
    create: bool,
) -> std::result::Result<subdoc::Outcome, SubdocError> {
    let path = std::str::from_utf8(&spec.path).map_err(|_| SubdocError::PathInvalid)?;
    let mkdir_p = create || spec.flags & PATH_FLAG_MKDIR_P != 0;
    subdoc::execute(doc, path, op, &spec.value, mkdir_p)
}

/// First failing spec of a multi mutation: index (1) + status (2)
fn mutation_failure(status: Status, index: u8) -> Reply {
    let top = if status == Status::SubdocInvalidCombo {
        status
    } else {
        Status::SubdocMultiPathFailure
    };
    let mut body = vec![index];
    body.extend_from_slice(&status.code().to_be_bytes());
    Reply::status(top).with_value(body)
}
