//! Blocking command sender.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use scenelink_proto::{Command, DEFAULT_HOST, DEFAULT_PORT, MAX_FRAME, Params, Response, Value};
use tracing::debug;

use crate::{Error, Result};

/// Connect, read, and write timeout used unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Output path the listener uses when `render_scene` gets none.
pub const DEFAULT_RENDER_PATH: &str = "//render.png";

/// `strftime` format of the `timestamp` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest accepted timeout.
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Issuer name sent when none is configured.
const DEFAULT_USER: &str = "scenelink";

/// Sends commands to a scenelink listener.
///
/// A `Sender` holds no connection: each call opens one, performs a single
/// exchange, and closes it before returning.
#[derive(Debug, Clone)]
pub struct Sender {
    /// Listener host name or IP.
    host: String,
    /// Listener port.
    port: u16,
    /// Upper bound on one whole exchange.
    timeout: Duration,
    /// Value of the `user` provenance field.
    user: String,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Sender {
    /// Creates a sender targeting `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            user: DEFAULT_USER.to_owned(),
        }
    }

    /// Sets the time limit for a whole call, connect through response
    /// (clamped to 1 ms ..= 24 h).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.clamp(Duration::from_millis(1), MAX_TIMEOUT);
        self
    }

    /// Sets the issuer name sent with every command.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Issuer name sent with every command.
    pub fn issuer(&self) -> &str {
        &self.user
    }

    /// Target as `host:port`.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolves the target address.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(Error::Connection)?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Connection(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", self.target()),
            )));
        }
        Ok(addrs)
    }

    /// Creates a cube and returns the new object's name.
    pub fn create_cube(&self, location: [f64; 3], size: f64) -> Result<Option<Value>> {
        check_location(location)?;
        check_positive("size", size)?;
        self.send(
            Command::new("create_cube")
                .param("location", location)
                .param("size", size),
        )
    }

    /// Creates a UV sphere and returns the new object's name.
    pub fn create_sphere(&self, location: [f64; 3], radius: f64) -> Result<Option<Value>> {
        check_location(location)?;
        check_positive("radius", radius)?;
        self.send(
            Command::new("create_sphere")
                .param("location", location)
                .param("radius", radius),
        )
    }

    /// Runs `code` verbatim in the host's scripting evaluator.
    pub fn execute_code(&self, code: &str) -> Result<Option<Value>> {
        check_non_empty("code", code)?;
        self.send(Command::new("execute_code").param("code", code))
    }

    /// Removes every object from the scene.
    pub fn delete_all(&self) -> Result<Option<Value>> {
        self.send(Command::new("delete_all"))
    }

    /// Renders the scene to `filepath` and returns the output path.
    ///
    /// A leading `//` is relative to the host's project directory.
    pub fn render_scene(&self, filepath: &str) -> Result<Option<Value>> {
        check_non_empty("filepath", filepath)?;
        self.send(Command::new("render_scene").param("filepath", filepath))
    }

    /// Stores `code` as a named text block, optionally running it.
    ///
    /// Without a name the host generates one. Returns the block's name.
    pub fn create_text_block(
        &self,
        code: &str,
        name: Option<&str>,
        execute: bool,
    ) -> Result<Option<Value>> {
        check_non_empty("code", code)?;
        let mut cmd = Command::new("create_text_block")
            .param("code", code)
            .param("execute", execute);
        if let Some(name) = name {
            check_non_empty("name", name)?;
            cmd = cmd.param("name", name);
        }
        self.send(cmd)
    }

    /// Runs a previously stored text block.
    pub fn execute_text_block(&self, name: &str) -> Result<Option<Value>> {
        check_non_empty("name", name)?;
        self.send(Command::new("execute_text_block").param("name", name))
    }

    /// Sends an arbitrary command by name.
    pub fn request(&self, name: &str, params: Params) -> Result<Option<Value>> {
        self.send(Command::new(name).params(params))
    }

    /// Sends `cmd` and returns its result.
    ///
    /// Empty `timestamp`/`issuer` fields are filled in.
    pub fn send(&self, mut cmd: Command) -> Result<Option<Value>> {
        if cmd.timestamp.is_empty() {
            cmd.timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        }
        if cmd.issuer.is_empty() {
            cmd.issuer.clone_from(&self.user);
        }

        debug!(command = %cmd.name, target = %self.target(), "sending command");
        match self.exchange(&cmd)? {
            Response::Ok { result } => Ok(result),
            Response::Error { kind, message } => Err(Error::Remote { kind, message }),
        }
    }

    /// Performs one open → send → receive → close exchange.
    ///
    /// The whole exchange, connect included, shares one deadline.
    fn exchange(&self, cmd: &Command) -> Result<Response> {
        let payload = scenelink_proto::to_payload(cmd)
            .map_err(|e| Error::InvalidArgument(format!("cannot encode command: {e}")))?;
        if payload.len() > MAX_FRAME as usize {
            return Err(Error::InvalidArgument(format!(
                "command payload is {} bytes, limit is {MAX_FRAME}",
                payload.len()
            )));
        }

        let deadline = Instant::now() + self.timeout;
        let stream = self.connect(deadline)?;
        let mut conn = Deadlined {
            stream: &stream,
            deadline,
        };

        scenelink_proto::write_frame(&mut conn, &payload).map_err(Error::Connection)?;
        let reply = scenelink_proto::read_frame(&mut conn).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                Error::Decode(e.to_string())
            } else {
                Error::Connection(e)
            }
        })?;
        scenelink_proto::from_payload(&reply).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Connects to the first reachable resolved address before `deadline`.
    fn connect(&self, deadline: Instant) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in self.resolve()? {
            let left = remaining(deadline).map_err(Error::Connection)?;
            match TcpStream::connect_timeout(&addr, left) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
            }
        }
        Err(Error::Connection(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no address to connect to")
        })))
    }
}

/// A stream whose every read and write is bounded by a shared deadline.
struct Deadlined<'a> {
    /// Connected socket.
    stream: &'a TcpStream,
    /// Instant after which any further I/O fails with `TimedOut`.
    deadline: Instant,
}

impl Read for Deadlined<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(remaining(self.deadline)?))?;
        let mut stream = self.stream;
        stream.read(buf)
    }
}

impl Write for Deadlined<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(Some(remaining(self.deadline)?))?;
        let mut stream = self.stream;
        stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut stream = self.stream;
        stream.flush()
    }
}

/// Time left before `deadline`; `TimedOut` once it has passed.
fn remaining(deadline: Instant) -> io::Result<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "sender timeout elapsed"))
}

/// Requires every coordinate to be finite.
fn check_location(location: [f64; 3]) -> Result<()> {
    if location.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "location must be three finite numbers, got {location:?}"
        )))
    }
}

/// Requires a finite, strictly positive number.
fn check_positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "{what} must be a positive number, got {value}"
        )))
    }
}

/// Requires a string with something besides whitespace.
fn check_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidArgument(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}
