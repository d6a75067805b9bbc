//! Scene handle capability and the in-memory scene.
//!
//! Handlers never touch a global scene graph: the listener threads a
//! `&mut dyn Scene` into every invocation. Host applications implement
//! [`Scene`] over their own modeling API; [`MemoryScene`] is the
//! standalone implementation used by the bundled host binary and tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::HostError;

/// A primitive the modeling API can add to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Primitive {
    /// An axis-aligned cube with edge length `size`.
    Cube {
        /// Center position.
        location: [f64; 3],
        /// Edge length.
        size: f64,
    },
    /// A UV sphere.
    UvSphere {
        /// Center position.
        location: [f64; 3],
        /// Radius.
        radius: f64,
    },
}

impl Primitive {
    /// Base object name, before any `.NNN` suffix.
    pub const fn base_name(&self) -> &'static str {
        match self {
            Self::Cube { .. } => "Cube",
            Self::UvSphere { .. } => "Sphere",
        }
    }

    /// Rejects non-finite locations and non-positive extents.
    fn validate(&self) -> Result<(), HostError> {
        let (location, extent, what) = match *self {
            Self::Cube { location, size } => (location, size, "size"),
            Self::UvSphere { location, radius } => (location, radius, "radius"),
        };
        if !location.iter().all(|c| c.is_finite()) {
            return Err(HostError::Geometry(format!(
                "location {location:?} is not finite"
            )));
        }
        if !(extent.is_finite() && extent > 0.0) {
            return Err(HostError::Geometry(format!(
                "{what} must be a positive number, got {extent}"
            )));
        }
        Ok(())
    }
}

/// An object living in a [`MemoryScene`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    /// Unique object name.
    pub name: String,
    /// Geometry the object was created from.
    pub primitive: Primitive,
}

/// Mutable access to the host application's scene.
///
/// Implementations are only ever driven from the listener's execution
/// context, one call at a time.
pub trait Scene {
    /// Adds a primitive and returns the name of the new object.
    fn add_primitive(&mut self, primitive: Primitive) -> Result<String, HostError>;

    /// Removes every object and returns how many were removed.
    fn clear(&mut self) -> usize;

    /// Names of all objects, in creation order.
    fn object_names(&self) -> Vec<String>;

    /// Number of objects in the scene.
    fn object_count(&self) -> usize {
        self.object_names().len()
    }

    /// Renders the scene to `filepath` and returns the resolved output path.
    ///
    /// A leading `//` makes the path relative to the project directory.
    fn render(&mut self, filepath: &str) -> Result<PathBuf, HostError>;

    /// Creates or overwrites the text block `name`.
    fn write_text(&mut self, name: &str, body: &str);

    /// Returns the body of the text block `name`.
    fn text(&self, name: &str) -> Option<String>;
}

/// A scene held entirely in memory.
///
/// Rendering writes a JSON snapshot of the objects to the output path.
#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    /// Objects in creation order.
    objects: Vec<SceneObject>,
    /// Text blocks by name.
    texts: BTreeMap<String, String>,
    /// Directory that `//` paths are resolved against.
    project_dir: PathBuf,
}

impl MemoryScene {
    /// Creates an empty scene whose `//` paths resolve under `project_dir`.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    /// All objects, in creation order.
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Project directory used for `//` paths.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Maps a leading `//` onto the project directory.
    fn resolve(&self, filepath: &str) -> PathBuf {
        match filepath.strip_prefix("//") {
            Some(rel) => self.project_dir.join(rel),
            None => PathBuf::from(filepath),
        }
    }

    /// Picks `base`, or the lowest free `base.NNN`.
    fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| self.objects.iter().any(|o| o.name == name);
        if !taken(base) {
            return base.to_owned();
        }
        (1..)
            .map(|n| format!("{base}.{n:03}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| base.to_owned())
    }
}

/// On-disk shape of a rendered [`MemoryScene`].
#[derive(Serialize)]
struct Snapshot<'a> {
    /// Objects at render time.
    objects: &'a [SceneObject],
}

impl Scene for MemoryScene {
    fn add_primitive(&mut self, primitive: Primitive) -> Result<String, HostError> {
        primitive.validate()?;
        let name = self.unique_name(primitive.base_name());
        self.objects.push(SceneObject {
            name: name.clone(),
            primitive,
        });
        Ok(name)
    }

    fn clear(&mut self) -> usize {
        let removed = self.objects.len();
        self.objects.clear();
        removed
    }

    fn object_names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn render(&mut self, filepath: &str) -> Result<PathBuf, HostError> {
        if filepath.trim().is_empty() {
            return Err(HostError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "render output path is empty",
            )));
        }
        let path = self.resolve(filepath);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let snapshot = serde_json::to_vec_pretty(&Snapshot {
            objects: &self.objects,
        })
        .map_err(std::io::Error::other)?;
        fs::write(&path, snapshot)?;
        Ok(path)
    }

    fn write_text(&mut self, name: &str, body: &str) {
        self.texts.insert(name.to_owned(), body.to_owned());
    }

    fn text(&self, name: &str) -> Option<String> {
        self.texts.get(name).cloned()
    }
}
