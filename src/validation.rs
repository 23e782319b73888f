//! Input validation for resource keys, player names, and reward action templates.

use thiserror::Error;

/// Maximum length for a resource key.
pub const MAX_KEY_LENGTH: usize = 64;

/// Maximum length for a player name.
pub const MAX_PLAYER_LENGTH: usize = 32;

/// Placeholders understood by reward action templates.
pub const ACTION_PLACEHOLDERS: &[&str] = &["player", "resource", "level", "threshold", "progress"];

/// Key validation errors with helpful messages
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,

    #[error("key is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("key contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },
}

/// Normalize a resource key to its canonical lowercase form.
///
/// Keys may contain ASCII letters, digits, underscores, and at most the `:`
/// namespace separator used by game-side material identifiers
/// (e.g. `minecraft:iron_ore`). Anything else is rejected.
pub fn normalize_resource_key(raw: &str) -> Result<String, KeyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }
    if trimmed.len() > MAX_KEY_LENGTH {
        return Err(KeyError::TooLong {
            max: MAX_KEY_LENGTH,
        });
    }

    let key = trimmed.to_ascii_lowercase();
    let bad: String = key
        .chars()
        .filter(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == ':'))
        .collect();
    if !bad.is_empty() {
        return Err(KeyError::InvalidCharacters { chars: bad });
    }

    Ok(key)
}

/// Normalize a player name for use as a state key.
///
/// Player identity comes from the host server; the engine only requires a
/// stable, printable, reasonably short identifier. Names are lowercased so
/// lock-table and store keys agree regardless of caller casing.
pub fn validate_player_name(raw: &str) -> Result<String, KeyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }
    if trimmed.len() > MAX_PLAYER_LENGTH {
        return Err(KeyError::TooLong {
            max: MAX_PLAYER_LENGTH,
        });
    }

    let bad: String = trimmed.chars().filter(|c| c.is_control()).collect();
    if !bad.is_empty() {
        return Err(KeyError::InvalidCharacters {
            chars: crate::logutil::escape_log(&bad),
        });
    }

    Ok(trimmed.to_ascii_lowercase())
}

/// Collect placeholder names in `template` that the action renderer does not
/// understand. Used at config load so a typo like `{palyer}` surfaces as a
/// config issue instead of leaking into dispatched commands verbatim.
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    let mut unknown = Vec::new();
    let mut chars = template.char_indices();
    while let Some((start, c)) = chars.next() {
        if c != '{' {
            continue;
        }
        let rest = &template[start + 1..];
        let Some(end) = rest.find(['{', '}']) else {
            break;
        };
        if !rest[end..].starts_with('}') {
            continue;
        }
        let name = &rest[..end];
        if !ACTION_PLACEHOLDERS.contains(&name) && !unknown.iter().any(|u| u == name) {
            unknown.push(name.to_string());
        }
    }
    unknown
}
