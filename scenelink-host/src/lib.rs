//! Host side of scenelink: the command listener that runs inside the 3D
//! application.
//!
//! The host application is represented by two capabilities handed to the
//! [`Registry`]: a [`Scene`] handle for structured commands and an
//! [`Evaluator`] for the privileged code-execution commands. The
//! [`Listener`] owns the scene and serves one connection at a time.
//!
//! ```no_run
//! use scenelink_host::{Listener, LuaEvaluator, MemoryScene, Registry};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let registry = Registry::new(LuaEvaluator);
//! let mut listener = Listener::bind("127.0.0.1:9999", registry, MemoryScene::new(".")).await?;
//! listener.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! # Ok(())
//! # }
//! ```

mod error;
mod registry;
mod scene;
mod script;
mod server;

pub use error::{DispatchError, HostError};
pub use registry::{Args, DEFAULT_RENDER_PATH, Handler, ParamSpec, Registry};
pub use scene::{MemoryScene, Primitive, Scene, SceneObject};
pub use script::{Evaluator, LuaEvaluator};
pub use server::{Exchange, Listener};
