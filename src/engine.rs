//! Loads GtkBuilder UI descriptions and binds registered model types to them.

use crate::icon::{ImageProvider, Pixmap, Size};
use gtk4::{prelude::*, Application, Builder};
use log::{debug, error};
use std::{
    borrow::Cow,
    cell::RefCell,
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    rc::Rc,
};
use thiserror::Error;

const IMAGE_SCHEME: &str = "image://";
/// The toolkit's own `<requires>` entry, checked by GtkBuilder itself.
const TOOLKIT_LIB: &str = "gtk";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to read UI description {0}: {1}")]
    Read(String, std::io::Error),
    #[error("Failed to parse UI description {0}: {1}")]
    Parse(String, String),
    #[error("UI description {source_name} requires module {module}, which is not registered")]
    MissingModule {
        source_name: String,
        module: ModuleVersion,
    },
    #[error("Failed to bind {name}: {reason}")]
    Bind { name: String, reason: String },
    #[error("Invalid image uri {0}")]
    InvalidImageUri(String),
    #[error("No image provider named {0}")]
    UnknownImageProvider(String),
}

/// A `<requires lib="..." version="major.minor"/>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    pub uri: String,
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}.{}", self.uri, self.major, self.minor)
    }
}

impl ModuleVersion {
    /// A registration satisfies a requirement with the same major version and
    /// an equal or older minor version.
    fn satisfies(&self, required: &ModuleVersion) -> bool {
        self.uri == required.uri && self.major == required.major && self.minor >= required.minor
    }
}

/// Where the UI description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSource {
    File(PathBuf),
    Embedded(&'static str),
}

impl UiSource {
    /// Prefers `local` when it exists on disk over the copy compiled into the
    /// binary.
    pub fn resolve(local: impl AsRef<Path>, embedded: &'static str) -> Self {
        let local = local.as_ref();
        if local.exists() {
            UiSource::File(local.to_owned())
        } else {
            UiSource::Embedded(embedded)
        }
    }

    pub fn name(&self) -> String {
        match self {
            UiSource::File(path) => path.display().to_string(),
            UiSource::Embedded(_) => String::from("<embedded main.ui>"),
        }
    }

    fn contents(&self) -> Result<Cow<'static, str>, EngineError> {
        match self {
            UiSource::File(path) => fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|e| EngineError::Read(self.name(), e)),
            UiSource::Embedded(contents) => Ok(Cow::Borrowed(contents)),
        }
    }
}

/// Image providers by name, shared with bound types so they can resolve
/// `image://` uris after loading.
#[derive(Clone, Default)]
pub struct ImageRegistry(Rc<RefCell<HashMap<String, Rc<dyn ImageProvider>>>>);

impl ImageRegistry {
    pub fn insert(&self, name: &str, provider: Rc<dyn ImageProvider>) {
        self.0.borrow_mut().insert(name.to_owned(), provider);
    }

    /// Resolves `image://<provider>/<id>`.
    pub fn request(&self, uri: &str, requested: Size) -> Result<(Option<Pixmap>, Size), EngineError> {
        let (provider_name, id) = uri
            .strip_prefix(IMAGE_SCHEME)
            .and_then(|rest| rest.split_once('/'))
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| EngineError::InvalidImageUri(uri.to_owned()))?;

        let provider = self
            .0
            .borrow()
            .get(provider_name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownImageProvider(provider_name.to_owned()))?;
        Ok(provider.request_pixmap(id, requested))
    }
}

/// What a bound type gets to work with.
pub struct EngineContext {
    pub application: Application,
    pub images: ImageRegistry,
}

type Factory = Box<dyn Fn(&Builder, &EngineContext) -> Result<(), EngineError>>;

struct RegisteredType {
    module: ModuleVersion,
    name: String,
    factory: Factory,
}

pub struct UiEngine {
    context: EngineContext,
    types: Vec<RegisteredType>,
    root_objects: Vec<gtk4::Window>,
}

impl UiEngine {
    pub fn new(application: &Application) -> Self {
        Self {
            context: EngineContext {
                application: application.clone(),
                images: ImageRegistry::default(),
            },
            types: Vec::new(),
            root_objects: Vec::new(),
        }
    }

    /// Registers `name` under module `uri major.minor`. `factory` runs for
    /// every loaded description that requires the module.
    pub fn register_type<F>(&mut self, uri: &str, major: u32, minor: u32, name: &str, factory: F)
    where
        F: Fn(&Builder, &EngineContext) -> Result<(), EngineError> + 'static,
    {
        debug!("Registering type {} in {} {}.{}", name, uri, major, minor);
        self.types.push(RegisteredType {
            module: ModuleVersion {
                uri: uri.to_owned(),
                major,
                minor,
            },
            name: name.to_owned(),
            factory: Box::new(factory),
        });
    }

    pub fn add_image_provider(&mut self, name: &str, provider: impl ImageProvider + 'static) {
        self.context.images.insert(name, Rc::new(provider));
    }

    pub fn root_objects(&self) -> &[gtk4::Window] {
        &self.root_objects
    }

    /// Loads `source` and returns the toplevel windows it created. Any
    /// failure is logged and yields no windows.
    pub fn load(&mut self, source: &UiSource) -> Vec<gtk4::Window> {
        match self.try_load(source) {
            Ok(roots) => {
                self.root_objects.extend(roots.iter().cloned());
                roots
            }
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        }
    }

    fn try_load(&self, source: &UiSource) -> Result<Vec<gtk4::Window>, EngineError> {
        debug!("Loading UI description from {}", source.name());
        let xml = source.contents()?;

        let bound = resolve_bindings(&source.name(), &xml, &self.types)?;

        let builder = Builder::new();
        builder
            .add_from_string(&xml)
            .map_err(|e| EngineError::Parse(source.name(), e.to_string()))?;

        for ty in bound {
            debug!("Binding {} from {}", ty.name, ty.module);
            (ty.factory)(&builder, &self.context)?;
        }

        Ok(builder
            .objects()
            .into_iter()
            .filter_map(|object| object.downcast::<gtk4::Window>().ok())
            .collect())
    }
}

/// Picks the registered types a description binds. Fails on the first
/// required module no registration satisfies.
fn resolve_bindings<'a>(
    source_name: &str,
    xml: &str,
    types: &'a [RegisteredType],
) -> Result<Vec<&'a RegisteredType>, EngineError> {
    let mut bound = Vec::new();
    for required in required_modules(xml) {
        let matching: Vec<&RegisteredType> = types
            .iter()
            .filter(|ty| ty.module.satisfies(&required))
            .collect();
        if matching.is_empty() {
            return Err(EngineError::MissingModule {
                source_name: source_name.to_owned(),
                module: required,
            });
        }
        bound.extend(matching);
    }
    Ok(bound)
}

/// Collects the non-toolkit `<requires>` entries of a UI description.
/// Malformed entries are skipped.
pub fn required_modules(xml: &str) -> Vec<ModuleVersion> {
    xml.match_indices("<requires")
        .filter_map(|(start, _)| {
            let tag = &xml[start..];
            let tag = &tag[..tag.find('>')?];
            let uri = attribute(tag, "lib")?;
            let (major, minor) = attribute(tag, "version")?.split_once('.')?;
            Some(ModuleVersion {
                uri: uri.to_owned(),
                major: major.trim().parse().ok()?,
                minor: minor.trim().parse().ok()?,
            })
        })
        .filter(|module| module.uri != TOOLKIT_LIB)
        .collect()
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=", name);
    let rest = &tag[tag.find(&needle)? + needle.len()..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}
