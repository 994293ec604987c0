//! Connection registry: live links to neighbouring depots, keyed by port.

use std::fmt;
use std::io::{self, Write};

use crate::identity::Introduction;
use crate::inventory::INITIAL_CAPACITY;
use crate::wire;

/// Outbound half of a link. The host decides what it is (a socket, a buffer in tests).
pub type PeerWriter = Box<dyn Write + Send>;

/// A registered neighbour: its declared port and name and the stream we write to.
pub struct PeerConnection {
    port: String,
    name: String,
    writer: PeerWriter,
}

impl PeerConnection {
    pub fn new(introduction: Introduction, writer: PeerWriter) -> Self {
        Self {
            port: introduction.port,
            name: introduction.name,
            writer,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one protocol line and flush it.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        wire::write_line(&mut self.writer, line)
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("port", &self.port)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Every link this depot has ever established. Links are never removed, even
/// after the peer goes away; writes to a dead link just fail.
#[derive(Debug)]
pub struct Registry {
    connections: Vec<PeerConnection>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn has_port(&self, port: &str) -> bool {
        self.connections.iter().any(|c| c.port == port)
    }

    /// Add a link. Hands the connection back if its port is already registered.
    pub fn register(&mut self, connection: PeerConnection) -> Result<(), PeerConnection> {
        if self.has_port(&connection.port) {
            return Err(connection);
        }
        self.connections.push(connection);
        Ok(())
    }

    /// First link whose declared name is `name`.
    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut PeerConnection> {
        self.connections.iter_mut().find(|c| c.name == name)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &PeerConnection> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Neighbour names sorted, duplicates kept.
    pub fn neighbour_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }
}
