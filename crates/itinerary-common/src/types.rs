use std::fmt;

use crate::error::{Error, Result};

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1).
const MAX_IDENTIFIER_BYTES: usize = 63;

/// A validated SQL identifier such as a table name.
///
/// `Display` renders the quoted form (`"name"`, with embedded quotes doubled),
/// which is the only form that should ever be spliced into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidIdentifier(
                "identifier cannot be empty".into(),
            ));
        }
        if name.len() > MAX_IDENTIFIER_BYTES {
            return Err(Error::InvalidIdentifier(format!(
                "identifier too long ({} bytes, max {MAX_IDENTIFIER_BYTES}): {name}",
                name.len()
            )));
        }
        if name.contains('\0') {
            return Err(Error::InvalidIdentifier(
                "identifier cannot contain NUL characters".into(),
            ));
        }
        Ok(Self(name))
    }

    /// The raw, unquoted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}
