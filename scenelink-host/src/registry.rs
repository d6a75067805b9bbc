//! Command registry: name → handler, with parameter shape validation.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use scenelink_proto::{Command, Params, Response, Value, ValueKind};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, HostError};
use crate::scene::{Primitive, Scene};
use crate::script::Evaluator;

/// Output path used by `render_scene` when none is given.
pub const DEFAULT_RENDER_PATH: &str = "//render.png";

/// One declared parameter of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name.
    pub key: &'static str,
    /// Expected value kind.
    pub kind: ValueKind,
    /// Whether the key must be present.
    pub required: bool,
}

impl ParamSpec {
    /// A parameter that must be present.
    pub const fn required(key: &'static str, kind: ValueKind) -> Self {
        Self {
            key,
            kind,
            required: true,
        }
    }

    /// A parameter that may be omitted.
    pub const fn optional(key: &'static str, kind: ValueKind) -> Self {
        Self {
            key,
            kind,
            required: false,
        }
    }
}

/// Validated parameters handed to a handler.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    /// Raw parameter map, already checked against the handler's shape.
    params: &'a Params,
}

impl<'a> Args<'a> {
    /// Wraps a parameter map.
    pub const fn new(params: &'a Params) -> Self {
        Self { params }
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key)
    }

    /// Returns the number at `key`.
    pub fn number(&self, key: &'static str) -> Result<f64, HostError> {
        self.get(key)
            .and_then(Value::as_f64)
            .ok_or(HostError::Param(key))
    }

    /// Returns the vector at `key`.
    pub fn vector(&self, key: &'static str) -> Result<[f64; 3], HostError> {
        self.get(key)
            .and_then(Value::as_vector)
            .ok_or(HostError::Param(key))
    }

    /// Returns the string at `key`.
    pub fn text(&self, key: &'static str) -> Result<&'a str, HostError> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or(HostError::Param(key))
    }

    /// Returns the string at `key`, if present.
    pub fn opt_text(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns the boolean at `key`, if present.
    pub fn opt_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }
}

/// Handler that only sees the scene handle.
pub type StructuredFn = fn(&mut dyn Scene, &Args<'_>) -> Result<Option<Value>, HostError>;

/// Handler that also receives the scripting evaluator.
pub type PrivilegedFn =
    fn(&dyn Evaluator, &mut dyn Scene, &Args<'_>) -> Result<Option<Value>, HostError>;

/// A registered command implementation.
///
/// Only [`Handler::Privileged`] handlers can run arbitrary code, so an
/// access-control layer only needs to gate that variant.
#[derive(Clone, Copy)]
#[non_exhaustive]
pub enum Handler {
    /// Structured command against the modeling API.
    Structured(StructuredFn),
    /// Arbitrary code execution.
    Privileged(PrivilegedFn),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structured(_) => "Structured",
            Self::Privileged(_) => "Privileged",
        })
    }
}

/// A handler with its declared parameter shape.
#[derive(Debug, Clone, Copy)]
struct Entry {
    /// Declared parameters.
    shape: &'static [ParamSpec],
    /// Implementation.
    handler: Handler,
}

const LOCATION_SIZE: &[ParamSpec] = &[
    ParamSpec::required("location", ValueKind::Vector),
    ParamSpec::required("size", ValueKind::Number),
];
const LOCATION_RADIUS: &[ParamSpec] = &[
    ParamSpec::required("location", ValueKind::Vector),
    ParamSpec::required("radius", ValueKind::Number),
];
const FILEPATH: &[ParamSpec] = &[ParamSpec::optional("filepath", ValueKind::Text)];
const CODE: &[ParamSpec] = &[ParamSpec::required("code", ValueKind::Text)];
const TEXT_BLOCK: &[ParamSpec] = &[
    ParamSpec::required("code", ValueKind::Text),
    ParamSpec::optional("name", ValueKind::Text),
    ParamSpec::optional("execute", ValueKind::Bool),
];
const NAME: &[ParamSpec] = &[ParamSpec::required("name", ValueKind::Text)];

/// Maps command names to handlers. Built once before the listener starts.
pub struct Registry {
    /// Handlers by command name.
    entries: BTreeMap<&'static str, Entry>,
    /// Scripting evaluator for privileged handlers.
    evaluator: Box<dyn Evaluator>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("commands", &self.entries.keys().collect::<Vec<_>>())
            .field("evaluator", &self.evaluator)
            .finish()
    }
}

impl Registry {
    /// Creates a registry with no commands.
    pub fn empty(evaluator: impl Evaluator + 'static) -> Self {
        Self {
            entries: BTreeMap::new(),
            evaluator: Box::new(evaluator),
        }
    }

    /// Creates a registry with the built-in commands.
    pub fn new(evaluator: impl Evaluator + 'static) -> Self {
        let mut reg = Self::empty(evaluator);
        reg.register("create_cube", LOCATION_SIZE, Handler::Structured(create_cube));
        reg.register(
            "create_sphere",
            LOCATION_RADIUS,
            Handler::Structured(create_sphere),
        );
        reg.register("delete_all", &[], Handler::Structured(delete_all));
        reg.register("render_scene", FILEPATH, Handler::Structured(render_scene));
        reg.register("execute_code", CODE, Handler::Privileged(execute_code));
        reg.register(
            "create_text_block",
            TEXT_BLOCK,
            Handler::Privileged(create_text_block),
        );
        reg.register("execute_text_block", NAME, Handler::Privileged(execute_text_block));
        reg
    }

    /// Registers (or replaces) a command.
    pub fn register(&mut self, name: &'static str, shape: &'static [ParamSpec], handler: Handler) {
        self.entries.insert(name, Entry { shape, handler });
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns `true` if `name` is registered as a privileged handler.
    pub fn is_privileged(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| matches!(e.handler, Handler::Privileged(_)))
    }

    /// Looks up, validates, and runs `cmd` against `scene`.
    ///
    /// Handler failures, panics included, come back as
    /// [`DispatchError::HandlerExecution`].
    pub fn dispatch(
        &self,
        scene: &mut dyn Scene,
        cmd: &Command,
    ) -> Result<Option<Value>, DispatchError> {
        let entry = self
            .entries
            .get(cmd.name.as_str())
            .ok_or_else(|| DispatchError::UnknownCommand(cmd.name.clone()))?;
        check_shape(&cmd.name, entry.shape, &cmd.params)?;

        let args = Args::new(&cmd.params);
        let evaluator = self.evaluator.as_ref();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match entry.handler {
            Handler::Structured(f) => f(scene, &args),
            Handler::Privileged(f) => f(evaluator, scene, &args),
        }));

        outcome
            .unwrap_or_else(|payload| Err(HostError::Panic(panic_message(&*payload))))
            .and_then(|result| match result {
                Some(value) if !value.is_finite() => Err(HostError::NonFinite(value.to_string())),
                other => Ok(other),
            })
            .map_err(|source| DispatchError::HandlerExecution {
                command: cmd.name.clone(),
                source,
            })
    }

    /// Decodes a request payload, dispatches it, and builds the response.
    ///
    /// Never fails: every error becomes an error [`Response`].
    pub fn handle(&self, scene: &mut dyn Scene, payload: &[u8]) -> Response {
        let cmd: Command = match scenelink_proto::from_payload(payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                let err = DispatchError::Decode(e.to_string());
                warn!(error = %err, "rejecting request");
                return err.to_response();
            }
        };
        info!(
            command = %cmd.name,
            user = %cmd.issuer,
            timestamp = %cmd.timestamp,
            privileged = self.is_privileged(&cmd.name),
            "command received"
        );

        match self.dispatch(scene, &cmd) {
            Ok(result) => {
                debug!(command = %cmd.name, ?result, "command executed");
                Response::ok(result)
            }
            Err(err) => {
                warn!(command = %cmd.name, error = %err, "command failed");
                err.to_response()
            }
        }
    }
}

/// Compares `params` against a handler's declared shape.
fn check_shape(command: &str, shape: &[ParamSpec], params: &Params) -> Result<(), DispatchError> {
    let missing: Vec<String> = shape
        .iter()
        .filter(|spec| spec.required && !params.contains_key(spec.key))
        .map(|spec| spec.key.to_owned())
        .collect();
    let extra: Vec<String> = params
        .keys()
        .filter(|key| !shape.iter().any(|spec| spec.key == key.as_str()))
        .cloned()
        .collect();
    let mismatched: Vec<String> = shape
        .iter()
        .filter_map(|spec| {
            let value = params.get(spec.key)?;
            (value.kind() != spec.kind).then(|| {
                format!("{} (expected {}, got {})", spec.key, spec.kind, value.kind())
            })
        })
        .collect();

    if missing.is_empty() && extra.is_empty() && mismatched.is_empty() {
        return Ok(());
    }
    Err(DispatchError::InvalidParams {
        command: command.to_owned(),
        missing,
        extra,
        mismatched,
    })
}

/// Extracts the message of a caught panic.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// `create_cube`: adds a cube, returns its name.
fn create_cube(scene: &mut dyn Scene, args: &Args<'_>) -> Result<Option<Value>, HostError> {
    let name = scene.add_primitive(Primitive::Cube {
        location: args.vector("location")?,
        size: args.number("size")?,
    })?;
    Ok(Some(Value::Text(name)))
}

/// `create_sphere`: adds a UV sphere, returns its name.
fn create_sphere(scene: &mut dyn Scene, args: &Args<'_>) -> Result<Option<Value>, HostError> {
    let name = scene.add_primitive(Primitive::UvSphere {
        location: args.vector("location")?,
        radius: args.number("radius")?,
    })?;
    Ok(Some(Value::Text(name)))
}

/// `delete_all`: empties the scene.
fn delete_all(scene: &mut dyn Scene, _args: &Args<'_>) -> Result<Option<Value>, HostError> {
    let removed = scene.clear();
    debug!(removed, "scene cleared");
    Ok(None)
}

/// `render_scene`: renders to `filepath`, returns the written path.
fn render_scene(scene: &mut dyn Scene, args: &Args<'_>) -> Result<Option<Value>, HostError> {
    let filepath = args.opt_text("filepath").unwrap_or(DEFAULT_RENDER_PATH);
    let out = scene.render(filepath)?;
    Ok(Some(Value::Text(out.display().to_string())))
}

/// `execute_code`: runs `code` in the evaluator.
fn execute_code(
    evaluator: &dyn Evaluator,
    scene: &mut dyn Scene,
    args: &Args<'_>,
) -> Result<Option<Value>, HostError> {
    evaluator.eval(scene, "execute_code", args.text("code")?)
}

/// `create_text_block`: stores a named script, optionally running it.
fn create_text_block(
    evaluator: &dyn Evaluator,
    scene: &mut dyn Scene,
    args: &Args<'_>,
) -> Result<Option<Value>, HostError> {
    let code = args.text("code")?;
    let name = match args.opt_text("name").filter(|n| !n.is_empty()) {
        Some(name) => name.to_owned(),
        None => chrono::Local::now()
            .format("script_%Y%m%d_%H%M%S.lua")
            .to_string(),
    };
    scene.write_text(&name, code);
    if args.opt_bool("execute").unwrap_or(false) {
        evaluator.eval(scene, &name, code)?;
    }
    Ok(Some(Value::Text(name)))
}

/// `execute_text_block`: runs a stored script.
fn execute_text_block(
    evaluator: &dyn Evaluator,
    scene: &mut dyn Scene,
    args: &Args<'_>,
) -> Result<Option<Value>, HostError> {
    let name = args.text("name")?;
    let body = scene
        .text(name)
        .ok_or_else(|| HostError::TextNotFound(name.to_owned()))?;
    evaluator.eval(scene, name, &body)
}
