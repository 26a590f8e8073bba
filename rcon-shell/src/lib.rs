//! # rcon-shell
//!
//! A blocking client for the Source RCON protocol spoken by many dedicated
//! game servers.
//!
//! ## Features
//!
//! - Password login with a distinct error for a rejected password
//! - Text command execution
//! - Optional multi-packet reply collection
//! - Connect and read timeouts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rcon_shell::RconShell;
//!
//! let mut rcon = RconShell::connect("127.0.0.1", 27020, "secret", Duration::from_secs(2)).unwrap();
//!
//! let players = rcon.cmd("ListPlayers").unwrap();
//! println!("{}", players);
//!
//! rcon.cmd("ServerChat Restarting in 5 minutes").unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`packet`] - Packet framing and type constants

#[macro_use]
extern crate log;

use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use thiserror::Error;

/// Packet framing and type constants.
pub mod packet;

use packet::{
    Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE, map_io,
};

macro_rules! dbg {
    ($($arg:tt)*) => {{
        debug!("$ {}", &std::fmt::format(format_args!($($arg)*)));
    }};
}

/// Errors returned by [`RconShell`].
#[derive(Error, Debug)]
pub enum Error {
    /// Connection refused, reset or otherwise failed.
    #[error("rcon i/o: {0}")]
    Io(#[from] io::Error),

    /// No reply within the configured timeout.
    #[error("rcon timed out")]
    Timeout,

    /// The server rejected the password.
    #[error("rcon password rejected")]
    WrongPassword,

    /// The server sent something that is not valid RCON.
    #[error("rcon protocol: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// An authenticated RCON session.
///
/// # Example
///
/// ```rust,no_run
/// use std::{net::TcpStream, time::Duration};
/// use rcon_shell::RconShell;
///
/// let stream = TcpStream::connect("127.0.0.1:27020").unwrap();
/// stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
/// let mut shell = RconShell::new(stream, "secret").unwrap();
/// let reply = shell.cmd("SaveWorld").unwrap();
/// ```
pub struct RconShell {
    stream: TcpStream,
    next_id: i32,
    multi_packet: bool,
}

impl RconShell {
    /// Connects to `host:port` and logs in.
    ///
    /// `timeout` bounds the connect and every later read and write.
    ///
    /// # Errors
    ///
    /// [`Error::WrongPassword`] when the login is rejected,
    /// [`Error::Timeout`] or [`Error::Io`] when the server is unreachable.
    pub fn connect(host: &str, port: u16, password: &str, timeout: Duration) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    debug!("connected to {addr}");
                    return Self::new(stream, password);
                }
                Err(e) => last_err = e,
            }
        }
        Err(map_io(last_err))
    }

    /// Logs in over an already connected stream.
    pub fn new(stream: TcpStream, password: &str) -> Result<Self> {
        let mut s = Self {
            stream,
            next_id: 1,
            multi_packet: false,
        };
        s.auth(password)?;
        Ok(s)
    }

    /// Collect replies split over several packets.
    ///
    /// An empty marker packet is sent after each command and everything up
    /// to its echo is joined. Only enable this for servers that echo the
    /// marker.
    pub fn with_multi_packet(mut self, enabled: bool) -> Self {
        self.multi_packet = enabled;
        self
    }

    fn take_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }

    fn auth(&mut self, password: &str) -> Result<()> {
        let id = self.take_id();
        Packet::new(id, SERVERDATA_AUTH, password).write_to(&mut self.stream)?;

        // some servers send an empty RESPONSE_VALUE ahead of the auth result
        loop {
            let reply = Packet::read_from(&mut self.stream)?;
            if reply.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if reply.id == -1 {
                warn!("rcon login rejected");
                return Err(Error::WrongPassword);
            }
            if reply.id != id {
                return Err(Error::Protocol(format!(
                    "auth reply id {} does not match request {id}",
                    reply.id
                )));
            }
            debug!("rcon login accepted");
            return Ok(());
        }
    }

    /// Runs `command` and returns its output with trailing whitespace trimmed.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when no reply arrives in time, [`Error::Io`] when
    /// the connection drops.
    pub fn cmd(&mut self, command: &str) -> Result<String> {
        dbg!("{command}");
        let id = self.take_id();
        Packet::new(id, SERVERDATA_EXECCOMMAND, command).write_to(&mut self.stream)?;

        let marker = if self.multi_packet {
            let marker = self.take_id();
            Packet::new(marker, SERVERDATA_RESPONSE_VALUE, "").write_to(&mut self.stream)?;
            Some(marker)
        } else {
            None
        };

        let mut out = String::new();
        loop {
            let reply = Packet::read_from(&mut self.stream)?;
            if reply.kind != SERVERDATA_RESPONSE_VALUE {
                trace!("skip packet type {} id {}", reply.kind, reply.id);
                continue;
            }
            match marker {
                Some(m) if reply.id == m => break,
                Some(_) if reply.id == id => out.push_str(&reply.body),
                None if reply.id == id => {
                    out.push_str(&reply.body);
                    break;
                }
                _ => trace!("skip stale reply id {}", reply.id),
            }
        }

        let out = out.trim_end().to_string();
        trace!("reply: {out}");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use super::*;

    /// Accepts one client, checks the password and answers each command
    /// with `reply(command)`.
    fn fake_server(
        password: &'static str,
        marker_echo: bool,
        reply: impl Fn(&str) -> Vec<String> + Send + 'static,
    ) -> (u16, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();

            let auth = Packet::read_from(&mut conn).unwrap();
            assert_eq!(auth.kind, SERVERDATA_AUTH);
            Packet::new(auth.id, SERVERDATA_RESPONSE_VALUE, "")
                .write_to(&mut conn)
                .unwrap();
            let id = if auth.body == password { auth.id } else { -1 };
            Packet::new(id, SERVERDATA_AUTH_RESPONSE, "")
                .write_to(&mut conn)
                .unwrap();
            if id == -1 {
                return seen;
            }

            while let Ok(pkt) = Packet::read_from(&mut conn) {
                if pkt.kind == SERVERDATA_RESPONSE_VALUE {
                    if marker_echo {
                        Packet::new(pkt.id, SERVERDATA_RESPONSE_VALUE, "")
                            .write_to(&mut conn)
                            .unwrap();
                    }
                    continue;
                }
                seen.push(pkt.body.clone());
                for part in reply(&pkt.body) {
                    Packet::new(pkt.id, SERVERDATA_RESPONSE_VALUE, &part)
                        .write_to(&mut conn)
                        .unwrap();
                }
            }
            seen
        });
        (port, handle)
    }

    #[test]
    #[ntest::timeout(5000)]
    fn runs_commands() {
        let (port, server) = fake_server("secret", false, |cmd| match cmd {
            "ListPlayers" => vec!["0. Alice, 123\n1. Bob, 456\n".to_string()],
            _ => vec![String::new()],
        });

        let mut rcon =
            RconShell::connect("127.0.0.1", port, "secret", Duration::from_secs(2)).unwrap();
        assert_eq!(
            rcon.cmd("ListPlayers").unwrap(),
            "0. Alice, 123\n1. Bob, 456"
        );
        assert_eq!(rcon.cmd("SaveWorld").unwrap(), "");
        drop(rcon);

        assert_eq!(server.join().unwrap(), ["ListPlayers", "SaveWorld"]);
    }

    #[test]
    #[ntest::timeout(5000)]
    fn wrong_password_is_distinct() {
        let (port, server) = fake_server("secret", false, |_| Vec::new());
        let err = RconShell::connect("127.0.0.1", port, "stale", Duration::from_secs(2))
            .err()
            .unwrap();
        assert!(matches!(err, Error::WrongPassword));
        server.join().unwrap();
    }

    #[test]
    #[ntest::timeout(5000)]
    fn joins_multi_packet_replies() {
        let (port, server) = fake_server("pw", true, |_| {
            vec!["part one, ".to_string(), "part two".to_string()]
        });
        let mut rcon = RconShell::connect("127.0.0.1", port, "pw", Duration::from_secs(2))
            .unwrap()
            .with_multi_packet(true);
        assert_eq!(rcon.cmd("cvarlist").unwrap(), "part one, part two");
        drop(rcon);
        server.join().unwrap();
    }

    #[test]
    #[ntest::timeout(5000)]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(800));
            drop(conn);
        });
        let err = RconShell::connect("127.0.0.1", port, "pw", Duration::from_millis(200))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Timeout));
        server.join().unwrap();
    }

    #[test]
    #[ntest::timeout(5000)]
    fn refused_connection_is_io() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = RconShell::connect("127.0.0.1", port, "pw", Duration::from_millis(500))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_) | Error::Timeout));
    }
}
