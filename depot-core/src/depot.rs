//! Host-driven API: the host feeds the `Depot` one line at a time while holding its lock.

use crate::connection::{PeerConnection, PeerWriter, Registry};
use crate::deferral::Deferrals;
use crate::identity::{Introduction, IntroductionError};
use crate::inventory::Inventory;
use crate::protocol::Command;
use crate::report::Report;

/// Opens outbound links on behalf of the dispatcher (`Connect:<port>`).
///
/// Called with the depot already borrowed mutably, i.e. under the host's lock.
/// An implementation dials `port`, exchanges introductions and calls
/// [`Depot::admit`]; on any failure it leaves the depot untouched.
pub trait Connector {
    fn connect(&self, depot: &mut Depot, port: &str);
}

/// One depot: its identity, goods, deferred commands and neighbours.
#[derive(Debug)]
pub struct Depot {
    name: String,
    port: String,
    inventory: Inventory,
    deferrals: Deferrals,
    connections: Registry,
}

impl Depot {
    /// Create a depot named `name` stocked with `seed`. Inputs are expected to be
    /// validated already; seeding the same item twice adds the quantities.
    pub fn init<I, S>(name: impl Into<String>, seed: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        let mut inventory = Inventory::new();
        for (item, quantity) in seed {
            inventory.adjust(item.as_ref(), quantity);
        }
        Self {
            name: name.into(),
            port: String::new(),
            inventory,
            deferrals: Deferrals::new(),
            connections: Registry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listening port as announced to peers; empty until the host has bound one.
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn set_port(&mut self, port: impl Into<String>) {
        self.port = port.into();
    }

    /// The line this depot sends first on every new link.
    pub fn introduction(&self) -> Introduction {
        Introduction::new(self.port.clone(), self.name.clone())
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn deferrals(&self) -> &Deferrals {
        &self.deferrals
    }

    pub fn connections(&self) -> &Registry {
        &self.connections
    }

    /// Finish a handshake: check the peer's introduction line and register the link.
    /// `line` is `None` if the peer closed before sending one.
    pub fn admit(
        &mut self,
        line: Option<&str>,
        writer: PeerWriter,
    ) -> Result<Introduction, IntroductionError> {
        let introduction = Introduction::parse(line.ok_or(IntroductionError::Closed)?)?;
        if self.connections.has_port(&introduction.port) {
            return Err(IntroductionError::DuplicatePort(introduction.port));
        }
        let connection = PeerConnection::new(introduction.clone(), writer);
        self.connections
            .register(connection)
            .map_err(|c| IntroductionError::DuplicatePort(c.port().to_string()))?;
        Ok(introduction)
    }

    /// Handle one protocol line. Lines that do not parse are dropped.
    pub fn dispatch(&mut self, line: &str, connector: &dyn Connector) {
        if let Ok(command) = Command::parse(line) {
            self.apply(command, connector);
        }
    }

    /// Carry out a parsed command.
    pub fn apply(&mut self, command: Command, connector: &dyn Connector) {
        match command {
            Command::Deliver { quantity, item } => {
                self.inventory.adjust(&item, quantity);
            }
            Command::Withdraw { quantity, item } => {
                self.inventory.adjust(&item, -quantity);
            }
            Command::Transfer {
                quantity,
                item,
                destination,
            } => self.transfer(quantity, item, &destination),
            Command::Defer { key, line } => self.deferrals.defer(&key, &line),
            Command::Execute { key } => self.execute(&key, connector),
            Command::Connect { port } => {
                if !self.connections.has_port(&port) {
                    connector.connect(self, &port);
                }
            }
            Command::Introduce => {}
        }
    }

    fn transfer(&mut self, quantity: i64, item: String, destination: &str) {
        let Some(peer) = self.connections.find_by_name_mut(destination) else {
            return;
        };
        let deliver = Command::Deliver {
            quantity,
            item: item.clone(),
        };
        // Write errors mean the peer is gone; its stale link stays registered.
        let _ = peer.send_line(&deliver.to_string());
        self.inventory.adjust(&item, -quantity);
    }

    /// Replay the live queue for `key` in order, then clear it.
    /// Lines deferred to `key` during the replay are replayed too.
    fn execute(&mut self, key: &str, connector: &dyn Connector) {
        if !self.deferrals.contains(key) {
            return;
        }
        let mut index = 0;
        while let Some(line) = self.deferrals.line_at(key, index) {
            self.dispatch(&line, connector);
            index += 1;
        }
        self.deferrals.clear(key);
    }

    /// Sorted snapshot of stocked goods and neighbour names.
    pub fn report(&self) -> Report {
        Report {
            goods: self.inventory.stocked(),
            neighbours: self.connections.neighbour_names(),
        }
    }
}
