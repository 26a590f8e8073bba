//! Remote console adapter.

use std::time::Duration;

use colored::Colorize;
use rcon_shell::RconShell;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// Refused, timed out or otherwise unreachable. Treated as "no data".
    #[error("remote console unavailable: {0}")]
    Unavailable(String),

    /// The stored password was rejected, usually because it was edited
    /// while the server kept running with the old one.
    #[error("remote console rejected the password")]
    AuthFailure,
}

/// Runs administrative text commands on a running server.
pub trait RemoteConsole {
    fn run(&self, command: &str) -> Result<String, ConsoleError>;
}

/// [`RemoteConsole`] over Source RCON, one connection per command.
#[derive(Debug, Clone)]
pub struct RconConsole {
    host: String,
    port: u16,
    password: String,
    timeout: Duration,
}

impl RconConsole {
    pub fn new(host: &str, port: u16, password: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            password: password.to_string(),
            timeout,
        }
    }
}

impl RemoteConsole for RconConsole {
    fn run(&self, command: &str) -> Result<String, ConsoleError> {
        let mut shell = RconShell::connect(&self.host, self.port, &self.password, self.timeout)
            .map_err(map_err)?;
        shell.cmd(command).map_err(map_err)
    }
}

fn map_err(err: rcon_shell::Error) -> ConsoleError {
    match err {
        rcon_shell::Error::WrongPassword => {
            error!("{}", ConsoleError::AuthFailure);
            println!(
                "{}",
                "RCON password rejected, restart the server to apply the new password".red()
            );
            ConsoleError::AuthFailure
        }
        other => {
            debug!("{other}");
            ConsoleError::Unavailable(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    #[ntest::timeout(5000)]
    fn refused_connection_is_unavailable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let console = RconConsole::new("127.0.0.1", port, "pw", Duration::from_millis(300));
        assert!(matches!(
            console.run("ListPlayers"),
            Err(ConsoleError::Unavailable(_))
        ));
    }

    #[test]
    fn wrong_password_is_distinct() {
        assert_eq!(
            map_err(rcon_shell::Error::WrongPassword),
            ConsoleError::AuthFailure
        );
        assert!(matches!(
            map_err(rcon_shell::Error::Timeout),
            ConsoleError::Unavailable(_)
        ));
    }
}
