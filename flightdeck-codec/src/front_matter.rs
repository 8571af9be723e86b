//! YAML front-matter codec for plan phase files.
//!
//! A plan file is YAML front matter between `---` fences followed by a
//! markdown body:
//!
//! ```text
//! ---
//! status: active
//! agent_id: agent-7
//! ---
//! ## Implementation notes
//! ```
//!
//! [`parse`] extracts the fields (scalars coerced to strings) plus the body.
//! [`write`] merges updates into the existing front matter and rewrites the
//! file atomically; the body is preserved byte-for-byte.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{io_err, CodecError};

/// The decoded state of one plan file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrontMatterFile {
    /// Front-matter fields with scalar values coerced to strings.
    /// A missing value (YAML null) coerces to the empty string.
    pub fields: BTreeMap<String, String>,
    /// Everything after the closing fence, untouched.
    pub body: String,
}

/// Read and decode a plan file.
///
/// A file without front matter decodes to empty fields and a body equal to
/// the whole file. Malformed YAML or an unterminated fence is an error; the
/// caller is expected to log and skip the file.
pub fn parse(path: &Path) -> Result<FrontMatterFile, CodecError> {
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let (mapping, body) = split(path, &raw)?;

    let mut fields = BTreeMap::new();
    for (key, value) in &mapping {
        if let Value::String(key) = key {
            fields.insert(key.clone(), coerce_to_string(value));
        }
    }

    Ok(FrontMatterFile {
        fields,
        body: body.to_string(),
    })
}

/// Merge `updates` into the file's front matter and rewrite it in place.
///
/// Existing fields not named in `updates` keep their original YAML values;
/// the body is carried over unchanged. The rewrite goes through a `.tmp`
/// sibling and an atomic rename.
pub fn write(path: &Path, updates: &BTreeMap<String, Value>) -> Result<(), CodecError> {
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let (mut mapping, body) = split(path, &raw)?;

    for (key, value) in updates {
        mapping.insert(Value::String(key.clone()), value.clone());
    }

    let yaml = serde_yaml::to_string(&mapping)?;
    let content = format!("---\n{yaml}---\n{body}");

    let tmp = PathBuf::from(format!("{}.flightdeck.tmp", path.display()));
    std::fs::write(&tmp, &content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Split raw file content into (front-matter mapping, body).
fn split<'a>(path: &Path, raw: &'a str) -> Result<(Mapping, &'a str), CodecError> {
    let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) else {
        return Ok((Mapping::new(), raw));
    };

    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let mapping = if yaml.trim().is_empty() {
                Mapping::new()
            } else {
                serde_yaml::from_str(yaml).map_err(|source| CodecError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            };
            return Ok((mapping, body));
        }
        offset += line.len();
    }

    // Opening fence without a closing one: surface it as a failure so the
    // sync engine skips the file instead of mis-reading the body as YAML.
    Err(CodecError::Unterminated {
        path: path.to_path_buf(),
    })
}

/// Coerce a YAML scalar to its string form; `null` becomes the empty string.
/// Non-scalar values fall back to their YAML rendering.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Mark matching unchecked `- [ ]` items in a plan file as checked.
///
/// Items are matched by case-insensitive substring against `completed`.
/// Returns `true` if the file changed.
pub fn check_items(path: &Path, completed: &[String]) -> Result<bool, CodecError> {
    if completed.is_empty() {
        return Ok(false);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;

    let mut changed = false;
    let updated: String = raw
        .split_inclusive('\n')
        .map(|line| {
            let stripped = line.trim_end_matches(['\r', '\n']);
            if let Some(text) = stripped.strip_prefix("- [ ] ") {
                let lower = text.to_lowercase();
                if completed.iter().any(|c| lower.contains(&c.to_lowercase())) {
                    changed = true;
                    let ending = &line[stripped.len()..];
                    return format!("- [x] {text}{ending}");
                }
            }
            line.to_string()
        })
        .collect();

    if changed {
        std::fs::write(path, updated).map_err(|e| io_err(path, e))?;
    }
    Ok(changed)
}
