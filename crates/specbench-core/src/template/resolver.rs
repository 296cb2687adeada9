//! Template loading and inheritance resolution.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::error::{Result, SpecbenchError};
use crate::domain::template::{ResolvedTemplate, SpecialistTemplate};
use crate::template::merge::deep_merge;

/// Inheritance-applied documents keyed by canonical source path.
///
/// Owned by the caller and passed into every [`TemplateResolver::resolve`]
/// call of one run, so a shared ancestor is read once and every descendant
/// sees the same version of it.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<PathBuf, Value>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn get(&self, path: &Path) -> Option<&Value> {
        self.entries.get(path)
    }

    fn insert(&mut self, path: PathBuf, document: Value) {
        self.entries.insert(path, document);
    }
}

/// Resolves `from` references and validates the merged template.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    /// `@scope` → directory holding that scope's canonical templates.
    scopes: BTreeMap<String, PathBuf>,
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scopes(scopes: BTreeMap<String, PathBuf>) -> Self {
        Self { scopes }
    }

    /// Register a scope, e.g. `("@specialists", "/opt/templates")`.
    pub fn with_scope(mut self, scope: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.scopes.insert(scope.into(), dir.into());
        self
    }

    /// Load the template at `path`, apply its inheritance chain and validate it.
    #[instrument(skip(self, path, cache), fields(path = %path.as_ref().display()))]
    pub fn resolve(
        &self,
        path: impl AsRef<Path>,
        cache: &mut ResolutionCache,
    ) -> Result<ResolvedTemplate> {
        let root = canonical(path.as_ref())?;
        let mut stack = Vec::new();
        let document = self.resolve_document(&root, cache, &mut stack)?;

        let template: SpecialistTemplate =
            serde_json::from_value(document).map_err(|e| SpecbenchError::Parse {
                path: root.clone(),
                message: e.to_string(),
            })?;

        let (errors, warnings) = template.validate();
        for warning in warnings {
            warn!(template = %template.name, "{}", warning);
        }
        errors.into_result()?;

        debug!(template = %template.name, version = %template.version, "template resolved");
        ResolvedTemplate::from_template(template)
    }

    fn resolve_document(
        &self,
        path: &Path,
        cache: &mut ResolutionCache,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Value> {
        if stack.iter().any(|p| p == path) {
            let mut chain = stack.clone();
            chain.push(path.to_path_buf());
            return Err(SpecbenchError::Cycle { chain });
        }
        if let Some(document) = cache.get(path) {
            debug!(path = %path.display(), "resolution cache hit");
            return Ok(document.clone());
        }

        let raw = load_document(path)?;
        let reference = match raw.get("from") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(SpecbenchError::Parse {
                    path: path.to_path_buf(),
                    message: format!("'from' must be a string, found {}", other),
                })
            }
        };

        stack.push(path.to_path_buf());
        let merged = match reference {
            Some(reference) => {
                let parent_path = self.locate(&reference, path)?;
                let parent = self.resolve_document(&parent_path, cache, stack)?;
                deep_merge(&parent, &raw)
            }
            None => raw,
        };
        stack.pop();

        let merged = strip_from(merged);
        cache.insert(path.to_path_buf(), merged.clone());
        Ok(merged)
    }

    /// Turn a `from` reference into a canonical path.
    fn locate(&self, reference: &str, referencing_file: &Path) -> Result<PathBuf> {
        let candidate = if reference.starts_with('@') {
            let (scope, name) =
                reference
                    .split_once('/')
                    .ok_or_else(|| SpecbenchError::Parse {
                        path: referencing_file.to_path_buf(),
                        message: format!("scoped reference '{}' has no template name", reference),
                    })?;
            let dir = self.scopes.get(scope).ok_or_else(|| SpecbenchError::Parse {
                path: referencing_file.to_path_buf(),
                message: format!("unknown template scope '{}'", scope),
            })?;
            if name.ends_with(".json") {
                dir.join(name)
            } else {
                dir.join(format!("{name}.json"))
            }
        } else if Path::new(reference).is_absolute() {
            PathBuf::from(reference)
        } else {
            referencing_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(reference)
        };

        canonical(&candidate).map_err(|_| SpecbenchError::Parse {
            path: referencing_file.to_path_buf(),
            message: format!(
                "cannot resolve inheritance reference '{}' ({})",
                reference,
                candidate.display()
            ),
        })
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| SpecbenchError::Parse {
        path: path.to_path_buf(),
        message: format!("cannot read template: {}", e),
    })
}

fn load_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| SpecbenchError::Parse {
        path: path.to_path_buf(),
        message: format!("cannot read template: {}", e),
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| SpecbenchError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(SpecbenchError::Parse {
            path: path.to_path_buf(),
            message: "template document must be a JSON object".to_string(),
        });
    }
    Ok(value)
}

fn strip_from(mut document: Value) -> Value {
    if let Value::Object(map) = &mut document {
        map.remove("from");
    }
    document
}
