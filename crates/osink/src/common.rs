// ai
//! 📦 Common data structures: the documents that ride the write path
//!
//! ---
//!
//! 🎬 COLD OPEN. INT. DATA CENTER, 3:47 AM
//!
//! 🌩️  A document arrives. It has a body, maybe an id, maybe a routing key, and a
//! small receipt stapled to its back that says "tell the source when you're done
//! with me". It does not know which index it belongs in yet. It does not know if
//! the cluster already has a twin of it. It is about to find out on both counts.
//!
//! 🦆
//!
//! This module defines the humble yet load-bearing [`Hit`] and the two tiny traits
//! that let the rest of the crate talk about it without owning its whole life story:
//!
//! - [`Acknowledgement`]: the receipt. Whoever produced the document gets told
//!   whether it was dropped as a duplicate or sent on its way.
//! - [`Releasable`]: what the dedup engine needs from a buffered write. One method.
//!   Minimalism is a lifestyle.
//!
//! 🧠 Knowledge graph:
//! - `Hit::field` / `Hit::put_field`: dotted (`a.b.c`) or slashed (`/a/b/c`) paths into `source`.
//! - `Hit::format_string`: fills `${field}` placeholders from the document. `%{...}`
//!   date patterns are NOT touched here, those belong to the index resolver.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value};

use crate::errors::{Result, SinkError};

/// 🧾 The release handle attached to a document by whoever produced it.
///
/// Called exactly once per document by the write path: `is_duplicate = true` when the
/// dedup engine found the document already in the cluster and dropped it.
pub trait Acknowledgement: Debug + Send + Sync {
    fn release(&self, is_duplicate: bool);
}

/// 🪣 Anything the dedup engine can hold on to and later let go of.
pub trait Releasable: Send + 'static {
    /// 🏁 Tell the upstream producer how this write ended.
    fn release(&self, is_duplicate: bool);
}

/// 📦 A single document on its way to the cluster.
///
/// Fields are `Option` because not every pipeline knows an id or routing key up front,
/// and `index` is filled in by the write path once the resolver has spoken.
#[derive(Debug, Clone, Default)]
pub struct Hit {
    /// The document's identity. Identity is complicated. Hence `Option`.
    pub id: Option<String>,
    /// 🔧 Routing key, for the people who have read the shard docs and lived.
    pub routing: Option<String>,
    /// 📡 The concrete target index, once resolved.
    pub index: Option<String>,
    /// 📦 The document body.
    pub source: Value,
    /// 🧾 The receipt. `None` when nobody upstream cares how this ends. Rude, but valid.
    pub acknowledgement: Option<Arc<dyn Acknowledgement>>,
}

impl Hit {
    /// 🏗️ A hit with a body and nothing else. Identity, routing and destination come later.
    pub fn new(source: Value) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    /// 🧾 Staple a receipt onto the hit.
    pub fn with_acknowledgement(mut self, acknowledgement: Arc<dyn Acknowledgement>) -> Self {
        self.acknowledgement = Some(acknowledgement);
        self
    }

    /// 🔍 Read a field by path. `None` if any segment along the way is missing.
    pub fn field(&self, path: &str) -> Option<&Value> {
        value_at_path(&self.source, path)
    }

    /// 🔍 Read a field and render it as a plain string. Strings come back unquoted,
    /// numbers and bools as their JSON text, objects and arrays as compact JSON.
    pub fn field_as_string(&self, path: &str) -> Option<String> {
        self.field(path).and_then(value_as_plain_string)
    }

    /// ✏️ Write a field by path, creating intermediate objects as needed.
    ///
    /// 💀 Errors when a segment on the way down already holds a non-object value:
    /// we do not silently replace `"a": 5` with `"a": {}` just because you asked nicely.
    pub fn put_field(&mut self, path: &str, value: Value) -> Result<()> {
        let segments: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(SinkError::config(format!("empty field path '{path}'")));
        };
        if !self.source.is_object() {
            if self.source.is_null() {
                self.source = Value::Object(Map::new());
            } else {
                return Err(SinkError::config(
                    "cannot write a field into a document whose root is not an object",
                ));
            }
        }
        let mut node = &mut self.source;
        for segment in parents {
            let map = node.as_object_mut().ok_or_else(|| {
                SinkError::config(format!("field path '{path}' walks through a non-object value"))
            })?;
            node = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let map = node.as_object_mut().ok_or_else(|| {
            SinkError::config(format!("field path '{path}' walks through a non-object value"))
        })?;
        map.insert((*last).to_string(), value);
        Ok(())
    }

    /// 🔄 Replace every `${field}` placeholder in `template` with the document's value.
    ///
    /// `logs-${tenant.name}-%{yyyy.MM}` → `logs-acme-%{yyyy.MM}` for a document with
    /// `{"tenant":{"name":"acme"}}`. Missing or null fields are an error, because an index
    /// named `logs--2024.03` helps nobody.
    pub fn format_string(&self, template: &str) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            rendered.push_str(&rest[..start]);
            let after_marker = &rest[start + 2..];
            let end = after_marker.find('}').ok_or_else(|| {
                SinkError::config(format!("unterminated '${{' placeholder in '{template}'"))
            })?;
            let path = &after_marker[..end];
            let value = self.field_as_string(path).ok_or_else(|| {
                SinkError::config(format!(
                    "placeholder '${{{path}}}' in '{template}' has no value in the document"
                ))
            })?;
            rendered.push_str(&value);
            rest = &after_marker[end + 1..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}

impl Releasable for Hit {
    fn release(&self, is_duplicate: bool) {
        if let Some(ack) = &self.acknowledgement {
            ack.release(is_duplicate);
        }
    }
}

/// 🧪 An acknowledgement that just counts. Handy for dry runs and for tests that want to
/// know whether a document was released as a duplicate, as fresh, or not at all.
#[derive(Debug, Default)]
pub struct CountingAcknowledgement {
    duplicates: AtomicUsize,
    fresh: AtomicUsize,
}

impl CountingAcknowledgement {
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::SeqCst)
    }

    pub fn fresh(&self) -> usize {
        self.fresh.load(Ordering::SeqCst)
    }
}

impl Acknowledgement for CountingAcknowledgement {
    fn release(&self, is_duplicate: bool) {
        if is_duplicate {
            self.duplicates.fetch_add(1, Ordering::SeqCst);
        } else {
            self.fresh.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 🔪 `a.b.c` and `/a/b/c` both mean the same walk. Empty segments are skipped.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', '/']).filter(|segment| !segment.is_empty())
}

/// 🔍 Walk a JSON document by dotted or slashed path.
pub(crate) fn value_at_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    split_path(path).try_fold(root, |node, segment| node.get(segment))
}

/// 🔤 Plain-string rendering used for dedup values and placeholders.
pub(crate) fn value_as_plain_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
