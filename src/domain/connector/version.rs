//! Version tokens.
//!
//! A token couples the metadata field selection with the document's update
//! time, so a change to either forces re-ingestion. Wire form:
//!
//! ```text
//! <count>+<name_1>+...+<name_n>+<updated_at>
//! ```
//!
//! `\` and `+` inside a name are escaped with a leading `\`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SEPARATOR: char = '+';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionTokenError {
    #[error("version token is empty")]
    Empty,
    #[error("malformed version token '{token}': {reason}")]
    Malformed { token: String, reason: &'static str },
}

/// Structured form of a version token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken {
    metadata_names: Vec<String>,
    updated_at: i64,
}

/// Sort and deduplicate a metadata selection.
pub fn canonical_metadata_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort();
    names.dedup();
    names
}

impl VersionToken {
    pub fn new<I, S>(metadata_names: I, updated_at: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata_names: canonical_metadata_names(metadata_names),
            updated_at,
        }
    }

    pub fn metadata_names(&self) -> &[String] {
        &self.metadata_names
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.metadata_names.len().to_string());
        out.push(SEPARATOR);
        for name in &self.metadata_names {
            for c in name.chars() {
                if c == SEPARATOR || c == ESCAPE {
                    out.push(ESCAPE);
                }
                out.push(c);
            }
            out.push(SEPARATOR);
        }
        out.push_str(&self.updated_at.to_string());
        out
    }

    pub fn decode(token: &str) -> Result<Self, VersionTokenError> {
        if token.is_empty() {
            return Err(VersionTokenError::Empty);
        }
        let malformed = |reason| VersionTokenError::Malformed {
            token: token.to_string(),
            reason,
        };

        let (count, mut rest) = token
            .split_once(SEPARATOR)
            .ok_or_else(|| malformed("missing name count"))?;
        let count: usize = count.parse().map_err(|_| malformed("invalid name count"))?;

        let mut names = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let (name, remaining) = read_field(rest).ok_or_else(|| malformed("truncated name list"))?;
            names.push(name);
            rest = remaining;
        }

        let updated_at = rest.parse().map_err(|_| malformed("invalid timestamp"))?;
        Ok(Self {
            metadata_names: names,
            updated_at,
        })
    }

    /// Metadata names carried by a host-supplied version string. An empty
    /// string carries no selection.
    pub fn metadata_names_of(version: &str) -> Result<Vec<String>, VersionTokenError> {
        match Self::decode(version) {
            Ok(token) => Ok(token.metadata_names),
            Err(VersionTokenError::Empty) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Read one escaped field terminated by an unescaped separator.
fn read_field(input: &str) -> Option<(String, &str)> {
    let mut name = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            ESCAPE => name.push(chars.next()?.1),
            SEPARATOR => return Some((name, &input[i + c.len_utf8()..])),
            _ => name.push(c),
        }
    }
    None
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for VersionToken {
    type Err = VersionTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
