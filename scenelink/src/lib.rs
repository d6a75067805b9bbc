//! Sender side of scenelink: drive a running 3D application that hosts a
//! scenelink listener.
//!
//! Every call opens a fresh connection, sends one command, waits for the
//! response, and closes the connection. Nothing is retried.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! let sender = scenelink::Sender::default().timeout(Duration::from_secs(2));
//! sender.delete_all()?;
//! let name = sender.create_cube([1.0, 0.0, 0.0], 2.0)?;
//! println!("created {name:?}");
//! # Ok::<(), scenelink::Error>(())
//! ```

mod error;
mod sender;

pub use error::{Error, Result};
pub use scenelink_proto::{Command, DEFAULT_HOST, DEFAULT_PORT, ErrorKind, Params, Value};
pub use sender::{DEFAULT_RENDER_PATH, DEFAULT_TIMEOUT, Sender, TIMESTAMP_FORMAT};
