//! Tag metadata wire format
//!
//! Tags travel to and from the engine as one null-terminated buffer of
//! tab-separated `name=value` entries. The first `=` of an entry separates
//! the name from the value, so values may contain `=` but names may not.
//! An absent buffer stands for an empty tag list.

use std::ffi::{CStr, CString};
use std::fmt;

use thiserror::Error;

use crate::types::Tag;

/// Separator between entries
const ENTRY_SEPARATOR: char = '\t';
/// Separator between name and value
const NAME_VALUE_SEPARATOR: char = '=';

/// A character the wire format reserves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedChar {
    Equals,
    Tab,
    Nul,
}

impl fmt::Display for ReservedChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservedChar::Equals => write!(f, "\"=\""),
            ReservedChar::Tab => write!(f, "(tab)"),
            ReservedChar::Nul => write!(f, "(nul)"),
        }
    }
}

/// Tag validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("Tag name \"{name}\" contains reserved character {character}")]
    ReservedInName { name: String, character: ReservedChar },

    #[error("Tag value \"{value}\" of tag \"{name}\" contains reserved character {character}")]
    ReservedInValue {
        name: String,
        value: String,
        character: ReservedChar,
    },
}

/// Check one tag against the wire format's reserved characters.
pub fn validate(tag: &Tag) -> Result<(), TagError> {
    let name_error = |character| TagError::ReservedInName {
        name: tag.name.clone(),
        character,
    };
    if tag.name.contains(NAME_VALUE_SEPARATOR) {
        return Err(name_error(ReservedChar::Equals));
    }
    if tag.name.contains(ENTRY_SEPARATOR) {
        return Err(name_error(ReservedChar::Tab));
    }
    if tag.name.contains('\0') {
        return Err(name_error(ReservedChar::Nul));
    }

    let value_error = |character| TagError::ReservedInValue {
        name: tag.name.clone(),
        value: tag.value.clone(),
        character,
    };
    if tag.value.contains(ENTRY_SEPARATOR) {
        return Err(value_error(ReservedChar::Tab));
    }
    if tag.value.contains('\0') {
        return Err(value_error(ReservedChar::Nul));
    }
    Ok(())
}

/// Serialize tags into the engine's wire buffer.
///
/// Returns `Ok(None)` for an empty list. Every tag is validated before the
/// buffer is built, so a failure never leaves a half-built buffer behind.
pub fn serialize(tags: &[Tag]) -> Result<Option<CString>, TagError> {
    if tags.is_empty() {
        return Ok(None);
    }
    for tag in tags {
        validate(tag)?;
    }

    let serialized = tags
        .iter()
        .map(|tag| format!("{}{}{}", tag.name, NAME_VALUE_SEPARATOR, tag.value))
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string());

    // Validation rejected every NUL, so this cannot fail.
    let buffer = CString::new(serialized).map_err(|_| TagError::ReservedInValue {
        name: String::new(),
        value: String::new(),
        character: ReservedChar::Nul,
    })?;
    Ok(Some(buffer))
}

/// Parse a wire buffer back into tags.
///
/// A segment without `=` becomes a tag named after the whole segment with an
/// empty value.
pub fn deserialize(buffer: Option<&CStr>) -> Vec<Tag> {
    let Some(buffer) = buffer else {
        return Vec::new();
    };
    let serialized = buffer.to_string_lossy();
    if serialized.is_empty() {
        return Vec::new();
    }

    serialized
        .split(ENTRY_SEPARATOR)
        .map(|segment| match segment.split_once(NAME_VALUE_SEPARATOR) {
            Some((name, value)) => Tag::new(name, value),
            None => Tag::new(segment, ""),
        })
        .collect()
}
