//! Depot wire protocol: command grammar.
//!
//! Every command is one line of `:`-separated fields. The first field selects
//! the command; a line that does not parse is dropped by the dispatcher
//! without any reply.

use std::fmt;

use crate::identity::{is_valid_name, parse_int, HANDSHAKE_TAG};
use crate::wire::Fields;

pub const DELIVER: &str = "Deliver";
pub const WITHDRAW: &str = "Withdraw";
pub const TRANSFER: &str = "Transfer";
pub const DEFER: &str = "Defer";
pub const EXECUTE: &str = "Execute";
pub const CONNECT: &str = "Connect";

/// All recognised commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add goods to this depot.
    Deliver { quantity: i64, item: String },
    /// Remove goods from this depot.
    Withdraw { quantity: i64, item: String },
    /// Send goods to the neighbour called `destination`.
    Transfer {
        quantity: i64,
        item: String,
        destination: String,
    },
    /// Queue `line` under `key` for a later `Execute`.
    Defer { key: String, line: String },
    /// Replay and clear everything queued under `key`.
    Execute { key: String },
    /// Open a link to the depot listening on `port`.
    Connect { port: String },
    /// An introduction seen outside the handshake. Has no effect.
    Introduce,
}

impl Command {
    /// Parse one line (terminator already removed).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields = Fields::new(line);
        let tag = fields.next().ok_or(ProtocolError::Empty)?;
        let command = match tag {
            DELIVER | WITHDRAW => {
                let quantity = quantity(fields.next())?;
                let item = item(fields.next())?;
                if tag == DELIVER {
                    Command::Deliver { quantity, item }
                } else {
                    Command::Withdraw { quantity, item }
                }
            }
            TRANSFER => {
                let quantity = quantity(fields.next())?;
                let item = item(fields.next())?;
                let destination = fields
                    .next()
                    .ok_or(ProtocolError::MissingField("destination"))?
                    .to_string();
                Command::Transfer {
                    quantity,
                    item,
                    destination,
                }
            }
            DEFER => {
                let key = fields.next().ok_or(ProtocolError::MissingField("key"))?;
                if !parse_int(key).is_some_and(|k| k >= 0) {
                    return Err(ProtocolError::BadKey(key.to_string()));
                }
                let line = fields
                    .remainder()
                    .ok_or(ProtocolError::MissingField("deferred command"))?;
                return Ok(Command::Defer {
                    key: key.to_string(),
                    line: line.to_string(),
                });
            }
            EXECUTE => {
                let key = fields.next().ok_or(ProtocolError::MissingField("key"))?;
                Command::Execute {
                    key: key.to_string(),
                }
            }
            CONNECT => {
                let port = fields.next().ok_or(ProtocolError::MissingField("port"))?;
                Command::Connect {
                    port: port.to_string(),
                }
            }
            HANDSHAKE_TAG => return Ok(Command::Introduce),
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        match fields.next() {
            Some(extra) => Err(ProtocolError::UnexpectedField(extra.to_string())),
            None => Ok(command),
        }
    }
}

fn quantity(field: Option<&str>) -> Result<i64, ProtocolError> {
    let field = field.ok_or(ProtocolError::MissingField("quantity"))?;
    parse_int(field)
        .filter(|q| *q > 0)
        .ok_or_else(|| ProtocolError::BadQuantity(field.to_string()))
}

fn item(field: Option<&str>) -> Result<String, ProtocolError> {
    let field = field.ok_or(ProtocolError::MissingField("item"))?;
    if !is_valid_name(field) {
        return Err(ProtocolError::InvalidName(field.to_string()));
    }
    Ok(field.to_string())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Deliver { quantity, item } => write!(f, "{DELIVER}:{quantity}:{item}"),
            Command::Withdraw { quantity, item } => write!(f, "{WITHDRAW}:{quantity}:{item}"),
            Command::Transfer {
                quantity,
                item,
                destination,
            } => write!(f, "{TRANSFER}:{quantity}:{item}:{destination}"),
            Command::Defer { key, line } => write!(f, "{DEFER}:{key}:{line}"),
            Command::Execute { key } => write!(f, "{EXECUTE}:{key}"),
            Command::Connect { port } => write!(f, "{CONNECT}:{port}"),
            Command::Introduce => f.write_str(HANDSHAKE_TAG),
        }
    }
}

/// Reason a line was not accepted as a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("unexpected field: {0}")]
    UnexpectedField(String),
    #[error("bad quantity: {0}")]
    BadQuantity(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("bad deferral key: {0}")]
    BadKey(String),
}
