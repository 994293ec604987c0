//! Depot identity: name and integer token rules, and the `IM` introduction line.

use std::fmt;

use crate::wire::Fields;

/// Tag opening every introduction line.
pub const HANDSHAKE_TAG: &str = "IM";

/// Characters that may never appear in a depot or item name.
const FORBIDDEN: [char; 4] = [' ', ':', '\r', '\n'];

/// A name is valid when it is non-empty and free of space, colon, CR and LF.
pub fn is_valid_name(token: &str) -> bool {
    !token.is_empty() && !token.contains(&FORBIDDEN[..])
}

/// Parse a base-10 integer token.
/// Leading ASCII whitespace and a single sign are accepted; anything left over
/// after the digits (including trailing whitespace) makes the token invalid.
pub fn parse_int(token: &str) -> Option<i64> {
    let trimmed = token.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

/// Who a depot says it is: its listening port and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introduction {
    pub port: String,
    pub name: String,
}

impl Introduction {
    pub fn new(port: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            name: name.into(),
        }
    }

    /// Parse a peer's introduction: `IM:<port>:<name>`, exactly three fields.
    pub fn parse(line: &str) -> Result<Self, IntroductionError> {
        if line.is_empty() {
            return Err(IntroductionError::Empty);
        }
        let mut fields = Fields::new(line);
        if fields.next() != Some(HANDSHAKE_TAG) {
            return Err(IntroductionError::BadTag);
        }
        let port = fields.next().ok_or(IntroductionError::MissingField("port"))?;
        let name = fields.next().ok_or(IntroductionError::MissingField("name"))?;
        if let Some(extra) = fields.next() {
            return Err(IntroductionError::UnexpectedField(extra.to_string()));
        }
        Ok(Self::new(port, name))
    }

    /// Render the line sent to a new peer (without terminator).
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Introduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", HANDSHAKE_TAG, self.port, self.name)
    }
}

/// Why an introduction was refused. The link is closed silently either way.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntroductionError {
    #[error("peer closed before introducing itself")]
    Closed,
    #[error("empty introduction")]
    Empty,
    #[error("introduction does not start with IM")]
    BadTag,
    #[error("introduction is missing the {0} field")]
    MissingField(&'static str),
    #[error("unexpected field in introduction: {0}")]
    UnexpectedField(String),
    #[error("port {0} is already connected")]
    DuplicatePort(String),
}
