//! Peer links over TCP: listener, outbound dialling, introductions and one handler thread per link.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use depot_core::{wire, Connector, Depot, Introduction};
use tracing::{debug, info, warn};

use crate::config::Config;

/// The one depot of this process, shared by every thread.
pub type SharedDepot = Arc<Mutex<Depot>>;

/// Take the depot lock. Every mutation completes before the guard drops, so a
/// panicking holder never leaves half-written state behind.
pub fn lock(depot: &SharedDepot) -> MutexGuard<'_, Depot> {
    depot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error dialling a peer for `Connect:<port>`. Reported, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("could not resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("{host}:{port} has no IPv4 address")]
    NoAddress { host: String, port: u16 },
    #[error("connecting to port {port}: {source}")]
    Connect { port: u16, source: io::Error },
    #[error("introducing ourselves to port {port}: {source}")]
    Handshake { port: u16, source: io::Error },
}

fn resolve_ipv4(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    Ok((host, port)
        .to_socket_addrs()?
        .filter(SocketAddr::is_ipv4)
        .collect())
}

/// Bind an ephemeral port on `host`.
pub fn bind(host: &str) -> io::Result<TcpListener> {
    let addrs = resolve_ipv4(host, 0)?;
    TcpListener::bind(&addrs[..])
}

/// Bind, record and announce the port on `out`, then accept links forever.
/// Returns only if the listener could not be set up.
pub fn listen<W: Write>(depot: SharedDepot, config: &Config, mut out: W) -> io::Result<()> {
    let listener = bind(&config.bind_host)?;
    let port = listener.local_addr()?.port();
    lock(&depot).set_port(port.to_string());
    writeln!(out, "{port}")?;
    out.flush()?;
    info!(port, "listening");
    serve(listener, TcpConnector::new(depot, config.connect_host.clone()));
    Ok(())
}

/// Accept loop. Each accepted stream is introduced and, if the peer's
/// introduction is acceptable, registered and handed to its own thread.
pub fn serve(listener: TcpListener, connector: TcpConnector) {
    let local = lock(&connector.depot).introduction();
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        match introduce(&stream, &local) {
            Ok((reader, line)) => {
                let mut depot = lock(&connector.depot);
                establish(&mut depot, stream, reader, line, &connector);
            }
            Err(e) => {
                debug!(error = %e, "inbound link dropped during introduction");
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}

/// Send our introduction, then read the peer's.
/// Returns the buffered read half for the rest of the link and the peer's line.
fn introduce(
    stream: &TcpStream,
    local: &Introduction,
) -> io::Result<(BufReader<TcpStream>, Option<String>)> {
    let mut writer = stream;
    wire::write_line(&mut writer, &local.encode())?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let line = wire::read_line(&mut reader)?;
    Ok((reader, line))
}

/// Start the handler, then register the freshly introduced link. The caller holds the lock.
/// A refused introduction closes both halves without telling the peer why, and a
/// link whose handler cannot start is never registered.
fn establish(
    depot: &mut Depot,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    line: Option<String>,
    connector: &TcpConnector,
) {
    let writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            debug!(error = %e, "could not split link");
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    };
    let admitted = match spawn_handler(reader, connector.clone()) {
        Ok((admitted, _)) => admitted,
        Err(e) => {
            warn!(error = %e, "could not start link handler");
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    };
    match depot.admit(line.as_deref(), Box::new(writer)) {
        Ok(peer) => {
            info!(port = %peer.port, name = %peer.name, "neighbour connected");
            let _ = admitted.send(());
        }
        Err(e) => {
            debug!(reason = %e, "introduction refused");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Start a link handler held at a gate: it reads nothing until the returned
/// sender fires, and exits without reading if the sender is dropped instead.
fn spawn_handler<R>(
    reader: R,
    connector: TcpConnector,
) -> io::Result<(mpsc::Sender<()>, thread::JoinHandle<()>)>
where
    R: BufRead + Send + 'static,
{
    let (admitted, gate) = mpsc::channel();
    let worker = thread::Builder::new()
        .name("peer-link".into())
        .spawn(move || {
            if gate.recv().is_ok() {
                handle(reader, &connector);
            }
        })?;
    Ok((admitted, worker))
}

/// Per-link loop: read a line outside the lock, dispatch it inside.
/// Ends at end of stream; the link stays registered.
fn handle<R: BufRead>(mut reader: R, connector: &TcpConnector) {
    loop {
        match wire::read_line(&mut reader) {
            Ok(Some(line)) if line.is_empty() => continue,
            Ok(Some(line)) => lock(&connector.depot).dispatch(&line, connector),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "link read failed");
                break;
            }
        }
    }
    debug!("neighbour went away");
}

/// Dials `<connect_host>:<port>` for `Connect` commands and runs the same
/// introduction as the accept side.
#[derive(Clone)]
pub struct TcpConnector {
    depot: SharedDepot,
    host: String,
}

impl TcpConnector {
    pub fn new(depot: SharedDepot, host: String) -> Self {
        Self { depot, host }
    }

    fn dial(&self, port: &str) -> Result<TcpStream, ConnectError> {
        let port: u16 = port
            .parse()
            .map_err(|_| ConnectError::InvalidPort(port.to_string()))?;
        let addrs = resolve_ipv4(&self.host, port).map_err(|source| ConnectError::Resolve {
            host: self.host.clone(),
            port,
            source,
        })?;
        if addrs.is_empty() {
            return Err(ConnectError::NoAddress {
                host: self.host.clone(),
                port,
            });
        }
        TcpStream::connect(&addrs[..]).map_err(|source| ConnectError::Connect { port, source })
    }
}

impl Connector for TcpConnector {
    fn connect(&self, depot: &mut Depot, port: &str) {
        let stream = match self.dial(port) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{e}");
                return;
            }
        };
        match introduce(&stream, &depot.introduction()) {
            Ok((reader, line)) => establish(depot, stream, reader, line, self),
            Err(source) => {
                let port = stream.peer_addr().map(|a| a.port()).unwrap_or_default();
                warn!("{}", ConnectError::Handshake { port, source });
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn config() -> Config {
        Config {
            bind_host: "127.0.0.1".into(),
            connect_host: "127.0.0.1".into(),
            ..Config::default()
        }
    }

    fn shared(name: &str, seed: &[(&str, i64)]) -> SharedDepot {
        Arc::new(Mutex::new(Depot::init(name, seed.iter().copied())))
    }

    /// Bind and serve `depot` on a background thread; returns its port and connector.
    fn start(depot: &SharedDepot) -> (u16, TcpConnector) {
        let cfg = config();
        let listener = bind(&cfg.bind_host).unwrap();
        let port = listener.local_addr().unwrap().port();
        lock(depot).set_port(port.to_string());
        let connector = TcpConnector::new(depot.clone(), cfg.connect_host);
        let serving = connector.clone();
        thread::spawn(move || serve(listener, serving));
        (port, connector)
    }

    fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn quantity(depot: &SharedDepot, item: &str) -> Option<i64> {
        lock(depot).inventory().quantity(item)
    }

    fn dial(port: u16) -> (TcpStream, BufReader<TcpStream>) {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (stream, reader)
    }

    #[test]
    fn inbound_link_is_introduced_and_served() {
        let alice = shared("Alice", &[("widget", 1)]);
        let (port, _) = start(&alice);
        let (mut stream, mut reader) = dial(port);

        let hello = wire::read_line(&mut reader).unwrap();
        assert_eq!(hello, Some(format!("IM:{port}:Alice")));

        wire::write_line(&mut stream, "IM:9999:Bob").unwrap();
        wire::write_line(&mut stream, "").unwrap();
        wire::write_line(&mut stream, "Deliver:3:widget").unwrap();
        wait_until("delivery", || quantity(&alice, "widget") == Some(4));
        assert_eq!(lock(&alice).connections().neighbour_names(), ["Bob"]);
    }

    #[test]
    fn bad_introduction_closes_link() {
        let alice = shared("Alice", &[]);
        let (port, _) = start(&alice);
        let (mut stream, mut reader) = dial(port);
        wire::read_line(&mut reader).unwrap();
        wire::write_line(&mut stream, "HELLO:9999:Bob").unwrap();
        assert_eq!(wire::read_line(&mut reader).unwrap(), None);
        assert!(lock(&alice).connections().is_empty());
    }

    #[test]
    fn duplicate_port_is_refused() {
        let alice = shared("Alice", &[]);
        let (port, _) = start(&alice);

        let (mut first, mut first_reader) = dial(port);
        wire::read_line(&mut first_reader).unwrap();
        wire::write_line(&mut first, "IM:9999:Bob").unwrap();
        wait_until("first link", || lock(&alice).connections().len() == 1);

        let (mut second, mut second_reader) = dial(port);
        wire::read_line(&mut second_reader).unwrap();
        wire::write_line(&mut second, "IM:9999:Carol").unwrap();
        assert_eq!(wire::read_line(&mut second_reader).unwrap(), None);

        // the first link is untouched and still served
        wire::write_line(&mut first, "Deliver:2:bolt").unwrap();
        wait_until("delivery on first link", || quantity(&alice, "bolt") == Some(2));
        assert_eq!(lock(&alice).connections().neighbour_names(), ["Bob"]);
    }

    #[test]
    fn connect_twice_then_transfer() {
        let alice = shared("Alice", &[("widget", 10)]);
        let bob = shared("Bob", &[]);
        let (_, alice_connector) = start(&alice);
        let (bob_port, _) = start(&bob);

        let connect = format!("Connect:{bob_port}");
        lock(&alice).dispatch(&connect, &alice_connector);
        lock(&alice).dispatch(&connect, &alice_connector);
        assert_eq!(lock(&alice).connections().neighbour_names(), ["Bob"]);
        wait_until("Bob to register Alice", || {
            lock(&bob).connections().neighbour_names() == ["Alice"]
        });

        lock(&alice).dispatch("Transfer:4:widget:Bob", &alice_connector);
        assert_eq!(quantity(&alice, "widget"), Some(6));
        wait_until("Bob to receive goods", || quantity(&bob, "widget") == Some(4));
        assert_eq!(lock(&bob).connections().len(), 1);
    }

    #[test]
    fn deliveries_flow_back_over_dialled_link() {
        let alice = shared("Alice", &[]);
        let bob = shared("Bob", &[("nut", 5)]);
        let (_, alice_connector) = start(&alice);
        let (bob_port, bob_connector) = start(&bob);

        lock(&alice).dispatch(&format!("Connect:{bob_port}"), &alice_connector);
        wait_until("Bob to register Alice", || lock(&bob).connections().len() == 1);
        lock(&bob).dispatch("Transfer:5:nut:Alice", &bob_connector);
        wait_until("Alice to receive goods", || quantity(&alice, "nut") == Some(5));
        assert_eq!(quantity(&bob, "nut"), Some(0));
    }

    #[test]
    fn connect_to_closed_port_changes_nothing() {
        let alice = shared("Alice", &[]);
        let (_, connector) = start(&alice);
        let free = {
            let probe = bind("127.0.0.1").unwrap();
            probe.local_addr().unwrap().port()
        };
        lock(&alice).dispatch(&format!("Connect:{free}"), &connector);
        lock(&alice).dispatch("Connect:not-a-port", &connector);
        assert!(lock(&alice).connections().is_empty());
    }

    #[test]
    fn handler_skips_blank_lines_and_stops_at_end_of_stream() {
        let alice = shared("Alice", &[]);
        let connector = TcpConnector::new(alice.clone(), "127.0.0.1".into());
        let input = Cursor::new(b"Deliver:1:a\n\nDeliver:2:a\nDeliver:4:a".to_vec());
        handle(input, &connector);
        assert_eq!(quantity(&alice, "a"), Some(3));
    }

    #[test]
    fn handler_waits_for_admission() {
        let alice = shared("Alice", &[]);
        let connector = TcpConnector::new(alice.clone(), "127.0.0.1".into());

        let (refused, worker) =
            spawn_handler(Cursor::new(b"Deliver:5:a\n".to_vec()), connector.clone()).unwrap();
        drop(refused);
        worker.join().unwrap();
        assert_eq!(quantity(&alice, "a"), None);

        let (admitted, worker) =
            spawn_handler(Cursor::new(b"Deliver:5:a\n".to_vec()), connector).unwrap();
        admitted.send(()).unwrap();
        worker.join().unwrap();
        assert_eq!(quantity(&alice, "a"), Some(5));
    }

    #[test]
    fn refused_link_runs_no_commands() {
        let alice = shared("Alice", &[]);
        let (port, _) = start(&alice);
        let (mut first, mut first_reader) = dial(port);
        wire::read_line(&mut first_reader).unwrap();
        wire::write_line(&mut first, "IM:9999:Bob").unwrap();
        wait_until("first link", || lock(&alice).connections().len() == 1);

        let (mut second, mut second_reader) = dial(port);
        wire::read_line(&mut second_reader).unwrap();
        second.write_all(b"IM:9999:Carol\nDeliver:7:bolt\n").unwrap();
        assert_eq!(wire::read_line(&mut second_reader).unwrap(), None);

        wire::write_line(&mut first, "Deliver:1:nut").unwrap();
        wait_until("delivery on first link", || quantity(&alice, "nut") == Some(1));
        assert_eq!(quantity(&alice, "bolt"), None);
    }

    #[test]
    fn port_is_announced_and_served() {
        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl Write for Capture {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let alice = shared("Alice", &[]);
        let capture = Capture::default();
        let out = capture.clone();
        let serving = alice.clone();
        thread::spawn(move || listen(serving, &config(), out));

        let announced = || String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        wait_until("port announcement", || announced().ends_with('\n'));
        let line = announced();
        let port: u16 = line.trim_end().parse().unwrap();
        assert_eq!(line, format!("{port}\n"));
        assert_eq!(lock(&alice).port(), port.to_string());

        let (_stream, mut reader) = dial(port);
        assert_eq!(
            wire::read_line(&mut reader).unwrap(),
            Some(format!("IM:{port}:Alice"))
        );
    }

    #[test]
    fn listen_fails_on_unresolvable_host() {
        let alice = shared("Alice", &[]);
        let cfg = Config {
            bind_host: "no-such-host.invalid".into(),
            ..config()
        };
        assert!(listen(alice.clone(), &cfg, io::sink()).is_err());
        assert_eq!(lock(&alice).port(), "");
    }
}
