//! Write dispatch: how a dirty section becomes remote writes.
//!
//! Every section is written as a whole subtree at `/<section>`, except the
//! entries in `NARROW_WRITES`. The word-game subtree has sibling fields
//! maintained by the game backend, so the panel only ever writes the
//! fields it owns there.

use crate::document::{UPDATED_AT, WORDLE_SECTION};
use crate::error::FlushError;
use crate::remote::RemoteStore;
use crate::tree;
use serde_json::Value;
use tracing::debug;

/// Sections written field-by-field instead of as a whole subtree.
const NARROW_WRITES: &[(&str, &[&str])] = &[(WORDLE_SECTION, &["daily-words", UPDATED_AT])];

/// How a section is written to the remote tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionWrite {
    /// Replace `/<section>` wholesale.
    Subtree,
    /// Replace only `/<section>/<field>` for each listed field.
    Fields(&'static [&'static str]),
}

impl SectionWrite {
    pub fn for_section(section: &str) -> Self {
        NARROW_WRITES
            .iter()
            .find(|(name, _)| *name == section)
            .map(|(_, fields)| SectionWrite::Fields(*fields))
            .unwrap_or(SectionWrite::Subtree)
    }
}

/// One remote write.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWriteOp {
    pub path: String,
    pub value: Value,
}

/// Writes needed to flush `section` given its current value.
///
/// A section missing from the document is written as `null` (deleted),
/// except narrow sections, which only ever touch fields that are present.
pub fn section_writes(section: &str, value: Option<&Value>) -> Vec<RemoteWriteOp> {
    match SectionWrite::for_section(section) {
        SectionWrite::Subtree => vec![RemoteWriteOp {
            path: format!("/{}", section),
            value: value.cloned().unwrap_or(Value::Null),
        }],
        SectionWrite::Fields(fields) => {
            let Some(Value::Object(map)) = value else {
                return Vec::new();
            };
            fields
                .iter()
                .filter_map(|field| {
                    map.get(*field).map(|v| RemoteWriteOp {
                        path: tree::child_path(section, field),
                        value: v.clone(),
                    })
                })
                .collect()
        }
    }
}

/// Perform writes in order, stopping at the first failure.
pub async fn write_remote_ops<R: RemoteStore + ?Sized>(
    remote: &R,
    ops: &[RemoteWriteOp],
) -> Result<(), FlushError> {
    for op in ops {
        debug!("Writing remote subtree {}", op.path);
        remote
            .write_subtree(&op.path, &op.value)
            .await
            .map_err(|source| FlushError::RemoteWrite {
                path: op.path.clone(),
                source,
            })?;
    }
    Ok(())
}
