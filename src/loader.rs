use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

/// Supplies raw template text for a dot-separated component identifier.
///
/// The engine treats a load failure as fatal for the render in progress,
/// so implementations should only error when the component genuinely
/// cannot be produced.
pub trait SourceLoader: Send + Sync {
    fn load(&self, component: &str) -> io::Result<String>;
}

/// Loads component sources from a directory tree, mapping dots in the
/// identifier to path separators: `blog.post` becomes
/// `<root>/blog/post.loom` with the default extension.
pub struct DirLoader {
    root: PathBuf,
    extension: String,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "loom".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl SourceLoader for DirLoader {
    fn load(&self, component: &str) -> io::Result<String> {
        let mut path = self.root.clone();
        for segment in component.split('.') {
            path.push(segment);
        }
        path.set_extension(&self.extension);
        std::fs::read_to_string(path)
    }
}

/// In-memory loader backed by a map, for tests and embedded hosts.
#[derive(Default)]
pub struct MapLoader {
    sources: HashMap<String, String>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, component: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(component.into(), source.into());
        self
    }
}

impl SourceLoader for MapLoader {
    fn load(&self, component: &str) -> io::Result<String> {
        self.sources.get(component).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such component '{}'", component),
            )
        })
    }
}
