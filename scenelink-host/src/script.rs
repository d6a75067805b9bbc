//! Host scripting evaluator used by the privileged commands.
//!
//! The evaluator receives code verbatim. There is no sandboxing and no
//! capability restriction: whoever can reach the listener can run code.

use std::cell::RefCell;
use std::fmt;

use mlua::Lua;
use scenelink_proto::Value;

use crate::error::HostError;
use crate::scene::{Primitive, Scene};

/// Evaluates arbitrary code against the live scene.
pub trait Evaluator: fmt::Debug {
    /// Runs `code` and returns the value it produces, if any.
    ///
    /// `chunk_name` identifies the code in error messages.
    fn eval(
        &self,
        scene: &mut dyn Scene,
        chunk_name: &str,
        code: &str,
    ) -> Result<Option<Value>, HostError>;
}

/// Lua 5.4 evaluator.
///
/// Every call gets a fresh interpreter with a global `scene` table bound
/// to the scene handle:
///
/// ```lua
/// scene.create_cube(x, y, z [, size])      -- returns the object name
/// scene.create_sphere(x, y, z [, radius])  -- returns the object name
/// scene.delete_all()                       -- returns the removed count
/// scene.count()
/// scene.names()                            -- array of object names
/// scene.render(path)                       -- returns the output path
/// ```
///
/// A chunk that returns nil, a boolean, a number, or a string yields that
/// value; any other return value is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaEvaluator;

impl Evaluator for LuaEvaluator {
    fn eval(
        &self,
        scene: &mut dyn Scene,
        chunk_name: &str,
        code: &str,
    ) -> Result<Option<Value>, HostError> {
        let lua = Lua::new();
        let scene = RefCell::new(scene);

        lua.scope(|scope| {
            let api = lua.create_table()?;
            api.set(
                "create_cube",
                scope.create_function(|_, (x, y, z, size): (f64, f64, f64, Option<f64>)| {
                    add(
                        &scene,
                        Primitive::Cube {
                            location: [x, y, z],
                            size: size.unwrap_or(2.0),
                        },
                    )
                })?,
            )?;
            api.set(
                "create_sphere",
                scope.create_function(|_, (x, y, z, radius): (f64, f64, f64, Option<f64>)| {
                    add(
                        &scene,
                        Primitive::UvSphere {
                            location: [x, y, z],
                            radius: radius.unwrap_or(1.0),
                        },
                    )
                })?,
            )?;
            api.set(
                "delete_all",
                scope.create_function(|_, ()| Ok(scene.borrow_mut().clear()))?,
            )?;
            api.set(
                "count",
                scope.create_function(|_, ()| Ok(scene.borrow().object_count()))?,
            )?;
            api.set(
                "names",
                scope.create_function(|_, ()| Ok(scene.borrow().object_names()))?,
            )?;
            api.set(
                "render",
                scope.create_function(|_, path: String| {
                    scene
                        .borrow_mut()
                        .render(&path)
                        .map(|p| p.display().to_string())
                        .map_err(mlua::Error::external)
                })?,
            )?;
            lua.globals().set("scene", api)?;

            let ret: mlua::Value = lua.load(code).set_name(chunk_name).eval()?;
            Ok(to_value(&ret))
        })
        .map_err(|e| HostError::Script(e.to_string()))
    }
}

/// Adds `primitive` from inside a script.
fn add(scene: &RefCell<&mut dyn Scene>, primitive: Primitive) -> mlua::Result<String> {
    scene
        .borrow_mut()
        .add_primitive(primitive)
        .map_err(mlua::Error::external)
}

/// Converts a chunk's return value; tables, functions and nil yield `None`.
#[allow(clippy::cast_precision_loss)]
fn to_value(ret: &mlua::Value) -> Option<Value> {
    match ret {
        mlua::Value::Boolean(b) => Some(Value::Bool(*b)),
        mlua::Value::Integer(i) => Some(Value::Number(*i as f64)),
        mlua::Value::Number(n) => Some(Value::Number(*n)),
        mlua::Value::String(s) => Some(Value::Text(s.to_string_lossy().into())),
        _ => None,
    }
}
