use std::collections::HashSet;
use std::path::{Component, Path};

/// Folder names that never enter the pipeline.
///
/// Any name starting with `.` is excluded as well, which covers the
/// archive folder, the state file and version-control directories.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded_name(&self, name: &str) -> bool {
        name.starts_with('.') || self.names.contains(name)
    }

    /// True when any directory component of `relative` is excluded.
    pub fn excludes(&self, relative: &Path) -> bool {
        let Some(parent) = relative.parent() else {
            return false;
        };
        parent.components().any(|component| match component {
            Component::Normal(name) => self.is_excluded_name(&name.to_string_lossy()),
            _ => false,
        })
    }
}
