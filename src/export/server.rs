//! Child-process presentation server for exports.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use super::ExportError;
use super::poll::{Clock, poll_until};

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// How to start the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub port: u16,
}

impl ServerCommand {
    /// `<this executable> serve --port <port> <extra args>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the running executable is unknown.
    pub fn current_exe(port: u16, extra_args: Vec<String>) -> std::io::Result<Self> {
        let mut args = vec!["serve".to_string(), "--port".to_string(), port.to_string()];
        args.extend(extra_args);
        Ok(Self {
            program: std::env::current_exe()?,
            args,
            port,
        })
    }
}

fn local(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Fail with [`ExportError::PortInUse`] if something already listens on `port`.
///
/// # Errors
///
/// Returns [`ExportError::PortInUse`] when the port cannot be bound.
pub fn ensure_port_free(port: u16) -> Result<(), ExportError> {
    TcpListener::bind(local(port))
        .map(drop)
        .map_err(|_| ExportError::PortInUse(port))
}

/// True when a TCP connection to `port` succeeds.
pub fn is_accepting(port: u16) -> bool {
    TcpStream::connect_timeout(&local(port), PROBE_TIMEOUT).is_ok()
}

/// Running server process; killed when dropped.
#[derive(Debug)]
pub struct ServerGuard {
    child: Child,
    port: u16,
}

impl ServerGuard {
    /// Spawn the server and wait until its port accepts connections.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::PortInUse`] if the port is taken beforehand,
    /// [`ExportError::ServerSpawn`] if the process cannot start or exits
    /// early, and [`ExportError::ServerTimeout`] if it never becomes ready.
    pub fn start<C: Clock + ?Sized>(
        command: &ServerCommand,
        interval: Duration,
        timeout: Duration,
        clock: &C,
    ) -> Result<Self, ExportError> {
        ensure_port_free(command.port)?;

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ExportError::ServerSpawn)?;
        tracing::debug!(pid = child.id(), port = command.port, "server process spawned");

        let mut guard = Self {
            child,
            port: command.port,
        };

        let mut exit = None;
        let ready = poll_until(clock, interval, timeout, || {
            if let Ok(Some(status)) = guard.child.try_wait() {
                exit = Some(status);
                return true;
            }
            is_accepting(guard.port)
        });

        if let Some(status) = exit {
            return Err(ExportError::ServerSpawn(std::io::Error::other(format!(
                "server exited before accepting connections ({status})"
            ))));
        }
        ready.map_err(|_| ExportError::ServerTimeout {
            port: guard.port,
            timeout,
        })?;

        tracing::debug!(port = guard.port, "server ready");
        Ok(guard)
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", local(self.port))
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            tracing::debug!(error = %err, "server process already gone");
        }
        let _ = self.child.wait();
        tracing::debug!(port = self.port, "server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::poll::{ManualClock, SystemClock};

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn command(program: &str, args: &[&str], port: u16) -> ServerCommand {
        ServerCommand {
            program: PathBuf::from(program),
            args: args.iter().map(ToString::to_string).collect(),
            port,
        }
    }

    #[test]
    fn test_port_in_use_is_detected() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        assert!(matches!(ensure_port_free(port), Err(ExportError::PortInUse(p)) if p == port));

        let err = ServerGuard::start(
            &command("does-not-matter", &[], port),
            Duration::from_millis(10),
            Duration::from_millis(10),
            &ManualClock::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::PortInUse(_)));
    }

    #[test]
    fn test_probe_sees_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        assert!(is_accepting(listener.local_addr().unwrap().port()));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = ServerGuard::start(
            &command("/nonexistent/slidemark-server", &[], free_port()),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &SystemClock::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::ServerSpawn(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_server_that_never_listens_times_out() {
        let err = ServerGuard::start(
            &command("sleep", &["30"], free_port()),
            Duration::from_millis(20),
            Duration::from_millis(200),
            &SystemClock::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::ServerTimeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_server_exiting_early_is_spawn_error() {
        let err = ServerGuard::start(
            &command("sh", &["-c", "exit 3"], free_port()),
            Duration::from_millis(20),
            Duration::from_secs(5),
            &SystemClock::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::ServerSpawn(_)));
    }

    #[test]
    fn test_current_exe_command() {
        let cmd = ServerCommand::current_exe(4000, vec!["-i".into(), "deck.md".into()]).unwrap();
        assert_eq!(cmd.args, vec!["serve", "--port", "4000", "-i", "deck.md"]);
        assert_eq!(cmd.port, 4000);
    }
}
