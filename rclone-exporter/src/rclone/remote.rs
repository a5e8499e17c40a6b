//! Validated rclone remote identifiers.

use std::fmt;

use thiserror::Error;

/// Maximum accepted length of a remote identifier, in bytes.
pub const MAX_REMOTE_NAME_LENGTH: usize = 255;

/// Rejection reasons for a user-supplied remote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRemote {
    #[error("remote name cannot be empty")]
    Empty,

    #[error("remote name too long ({len} > {max} characters)")]
    TooLong { len: usize, max: usize },

    #[error("remote name contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A remote name as accepted by `rclone`, optionally followed by a path.
///
/// The identifier ends up as a positional argument of the rclone command line,
/// so only `[A-Za-z0-9_.:/-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteIdentifier {
    raw: String,
    name: String,
    path: String,
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/')
}

impl RemoteIdentifier {
    /// Validate and decompose a raw identifier.
    ///
    /// Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, InvalidRemote> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidRemote::Empty);
        }

        if raw.len() > MAX_REMOTE_NAME_LENGTH {
            return Err(InvalidRemote::TooLong {
                len: raw.len(),
                max: MAX_REMOTE_NAME_LENGTH,
            });
        }

        if let Some(c) = raw.chars().find(|c| !is_allowed(*c)) {
            return Err(InvalidRemote::InvalidCharacter(c));
        }

        let (name, path) = match raw.split_once(':') {
            Some((name, rest)) => (name, rest.trim_start_matches('/')),
            None => (raw, ""),
        };

        Ok(Self {
            raw: raw.to_owned(),
            name: name.to_owned(),
            path: format!("/{path}"),
        })
    }

    /// The identifier exactly as passed to rclone.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Remote name, the part before the first `:`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path inside the remote, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RemoteIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for RemoteIdentifier {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_remotes() {
        for raw in ["gdrive:", "s3:bucket/dir", "my-remote_1.backup:", "/mnt/data", "b2:a/b.c"] {
            assert!(RemoteIdentifier::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let remote = RemoteIdentifier::parse("  gdrive:  ").unwrap();
        assert_eq!(remote.as_str(), "gdrive:");
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert_eq!(RemoteIdentifier::parse(""), Err(InvalidRemote::Empty));
        assert_eq!(RemoteIdentifier::parse(" \t\n"), Err(InvalidRemote::Empty));
    }

    #[test]
    fn rejects_overlong_names() {
        let at_limit = "a".repeat(MAX_REMOTE_NAME_LENGTH);
        assert!(RemoteIdentifier::parse(&at_limit).is_ok());

        let over = "a".repeat(MAX_REMOTE_NAME_LENGTH + 1);
        assert_eq!(
            RemoteIdentifier::parse(&over),
            Err(InvalidRemote::TooLong {
                len: MAX_REMOTE_NAME_LENGTH + 1,
                max: MAX_REMOTE_NAME_LENGTH
            })
        );
    }

    #[test]
    fn rejects_characters_outside_the_allowed_set() {
        for raw in ["remote;rm -rf", "a b", "s3:$(id)", "x|y", "über:", "a\"b", "a{b}"] {
            assert!(
                matches!(
                    RemoteIdentifier::parse(raw),
                    Err(InvalidRemote::InvalidCharacter(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn decomposes_name_and_path() {
        let remote = RemoteIdentifier::parse("s3:bucket/dir").unwrap();
        assert_eq!(remote.name(), "s3");
        assert_eq!(remote.path(), "/bucket/dir");

        let remote = RemoteIdentifier::parse("gdrive:").unwrap();
        assert_eq!(remote.name(), "gdrive");
        assert_eq!(remote.path(), "/");

        let remote = RemoteIdentifier::parse("b2:/archive").unwrap();
        assert_eq!(remote.path(), "/archive");
    }

    #[test]
    fn identifiers_without_separator_default_to_root_path() {
        let remote = RemoteIdentifier::parse("local").unwrap();
        assert_eq!(remote.name(), "local");
        assert_eq!(remote.path(), "/");
    }
}
