//! Virtual links to sandboxed filesystem paths.
//!
//! Clients never see real paths. They address media as `<alias>/<relative>`,
//! where the alias names one of the configured multimedia folders. A link is
//! only ever resolved to a path strictly inside its alias root.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{ConfigError, ResolveError};

/// Alias → sandbox root mapping. Fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct FolderMap {
    roots: BTreeMap<String, PathBuf>,
}

impl FolderMap {
    pub fn new<I, K, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PathBuf>,
    {
        let mut roots = BTreeMap::new();
        for (alias, root) in entries {
            let alias = alias.into();
            let root = root.into();
            if alias.is_empty() || alias.contains('/') || alias == "." || alias == ".." {
                return Err(ConfigError::InvalidAlias(alias));
            }
            if !root.is_absolute() {
                return Err(ConfigError::RelativeRoot { alias, root });
            }
            roots.insert(alias, root);
        }
        Ok(Self { roots })
    }

    pub fn root(&self, alias: &str) -> Option<&Path> {
        self.roots.get(alias).map(PathBuf::as_path)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Resolve a client link to an existing file inside its alias root.
    ///
    /// The returned path is `root(alias)` joined with the normalized tail. The
    /// containment check runs twice: lexically before touching the disk, and
    /// again on the canonical paths so a symlink inside the root cannot lead
    /// out of it. The check holds at resolve time only: a link swapped inside
    /// the root before the engine opens the file is not caught.
    pub fn resolve(&self, link: &str) -> Result<PathBuf, ResolveError> {
        let (alias, root, candidate) = self.compose(link)?;

        let Ok(real) = std::fs::canonicalize(&candidate) else {
            return Err(ResolveError::FileNotFound(candidate));
        };
        let real_root = std::fs::canonicalize(root)
            .map_err(|_| ResolveError::FileNotFound(candidate.clone()))?;
        if real == real_root || !real.starts_with(&real_root) {
            return Err(ResolveError::PathEscape {
                alias: alias.to_string(),
                link: link.to_string(),
            });
        }

        Ok(candidate)
    }

    /// Split, look up and lexically normalize a link. No filesystem access.
    fn compose<'a>(&'a self, link: &str) -> Result<(&'a str, &'a Path, PathBuf), ResolveError> {
        let mut components = Path::new(link).components();

        let alias = match components.next() {
            Some(Component::Normal(alias)) => alias.to_string_lossy(),
            Some(other) => {
                return Err(ResolveError::UnknownAlias(
                    other.as_os_str().to_string_lossy().into_owned(),
                ))
            }
            None => return Err(ResolveError::EmptyLink(link.to_string())),
        };
        let Some((alias, root)) = self.roots.get_key_value(&*alias) else {
            return Err(ResolveError::UnknownAlias(alias.to_string()));
        };

        let escape = || ResolveError::PathEscape {
            alias: alias.clone(),
            link: link.to_string(),
        };

        let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
        for component in components {
            match component {
                Component::Normal(segment) => tail.push(segment),
                Component::CurDir => {}
                Component::ParentDir => {
                    tail.pop().ok_or_else(escape)?;
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }
        // The root itself is not a playable target.
        if tail.is_empty() {
            return Err(escape());
        }

        let mut candidate = root.clone();
        candidate.extend(tail);
        Ok((alias.as_str(), root.as_path(), candidate))
    }
}
