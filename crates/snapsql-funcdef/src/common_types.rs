//! Common-type resolution (spec §4.3): searching ancestor directories for
//! `_common.yaml` and splicing the matching definition into a parameter's
//! type tree.

use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::IndexMap;
use snapsql_types::{normalize_scalar_name, split_common_type_reference, TypeNode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MAX_RECURSION_DEPTH: usize = 32;

/// One loaded `_common.yaml` file's type definitions, keyed by upper-case
/// type name.
type CommonTypeFile = IndexMap<String, TypeNode>;

/// Caches parsed `_common.yaml` files per directory for the lifetime of one
/// compilation. Every [`Cache::lookup`] hands back a deep copy (spec §4.3
/// invariant: "never mutates a loaded cache entry").
#[derive(Default)]
pub struct Cache {
    by_dir: HashMap<PathBuf, CommonTypeFile>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_dir(&mut self, dir: &Path) -> &CommonTypeFile {
        if !self.by_dir.contains_key(dir) {
            let parsed = load_common_yaml(dir).unwrap_or_default();
            self.by_dir.insert(dir.to_path_buf(), parsed);
        }
        &self.by_dir[dir]
    }

    /// Ancestor search (spec §4.3): walk from `base` upward to (and
    /// including) `project_root`, returning the first (closest) directory
    /// whose `_common.yaml` defines `name`, plus a deep copy of that
    /// definition.
    fn find_ancestor(
        &mut self,
        base: &Path,
        project_root: &Path,
        name: &str,
    ) -> Option<(PathBuf, TypeNode)> {
        let mut dir = base.to_path_buf();
        loop {
            let defs = self.load_dir(&dir);
            if let Some(ty) = defs.get(name) {
                return Some((dir.clone(), ty.clone()));
            }
            if dir == project_root {
                return None;
            }
            match dir.parent() {
                Some(parent) if parent.starts_with(project_root) || parent == project_root => {
                    dir = parent.to_path_buf();
                }
                _ => return None,
            }
        }
    }
}

fn load_common_yaml(dir: &Path) -> Option<CommonTypeFile> {
    let path = dir.join("_common.yaml");
    let text = std::fs::read_to_string(&path).ok()?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    let mapping = doc.as_mapping()?;

    let mut out = IndexMap::default();
    for (key, value) in mapping.iter() {
        let Some(name) = key.as_str() else { continue };
        if let Some(fields) = value.as_mapping() {
            let object = TypeNode::Object(
                fields
                    .iter()
                    .filter_map(|(k, v)| {
                        let k = k.as_str()?;
                        let raw = v.as_str()?;
                        Some((k.to_string(), normalize_scalar_name(raw)))
                    })
                    .collect(),
            );
            out.insert(name.to_string(), object);
        }
    }
    log::debug!("loaded {} common type(s) from {}", out.len(), path.display());
    Some(out)
}

/// Resolves every [`TypeNode::CommonTypeRef`] reachable from `ty`, in place,
/// recursively. `base_dir` is the directory of the file declaring `ty`;
/// `project_root` bounds the ancestor search.
pub fn resolve(
    ty: &mut TypeNode,
    base_dir: &Path,
    project_root: &Path,
    cache: &mut Cache,
) -> Result<(), SnapSqlError> {
    resolve_depth(ty, base_dir, project_root, cache, 0)
}

fn resolve_depth(
    ty: &mut TypeNode,
    base_dir: &Path,
    project_root: &Path,
    cache: &mut Cache,
    depth: usize,
) -> Result<(), SnapSqlError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(SnapSqlError::new(
            ErrorKind::CircularCommonType,
            "common-type reference recursion exceeded the maximum depth".to_string(),
        ));
    }

    match ty {
        TypeNode::CommonTypeRef { reference, array } => {
            let Some((prefix, name, _)) = split_common_type_reference(reference) else {
                return Ok(());
            };

            let (resolved_dir, mut definition) = match resolve_prefix(&prefix, base_dir, project_root) {
                PrefixKind::Ancestors => {
                    match cache.find_ancestor(base_dir, project_root, &name) {
                        Some(found) => found,
                        None => {
                            // Miss at every level: leave as a scalar of that
                            // normalized name (spec §4.3/§8 property 5).
                            *ty = normalize_scalar_name(&name.to_lowercase());
                            if *array {
                                *ty = TypeNode::array_of(ty.clone());
                            }
                            return Ok(());
                        }
                    }
                }
                PrefixKind::Dir(dir) => {
                    let defs = cache.load_dir(&dir);
                    match defs.get(&name) {
                        Some(found) => (dir, found.clone()),
                        None => {
                            return Err(SnapSqlError::new(
                                ErrorKind::CommonTypeNotFound,
                                format!("common type `{name}` not found in {}", dir.display()),
                            ));
                        }
                    }
                }
            };

            resolve_depth(&mut definition, &resolved_dir, project_root, cache, depth + 1)?;

            *ty = if *array {
                TypeNode::array_of(definition)
            } else {
                definition
            };
            Ok(())
        }
        TypeNode::Object(fields) => {
            for field in fields.values_mut() {
                resolve_depth(field, base_dir, project_root, cache, depth + 1)?;
            }
            Ok(())
        }
        TypeNode::Array(elem) => resolve_depth(elem, base_dir, project_root, cache, depth + 1),
        _ => Ok(()),
    }
}

enum PrefixKind {
    /// Empty prefix: search ancestors up to and including the project root.
    Ancestors,
    /// A concrete directory to search (no ancestor walk).
    Dir(PathBuf),
}

fn resolve_prefix(prefix: &str, base_dir: &Path, project_root: &Path) -> PrefixKind {
    if prefix.is_empty() {
        PrefixKind::Ancestors
    } else if let Some(rest) = prefix.strip_prefix("./") {
        PrefixKind::Dir(base_dir.join(rest.trim_end_matches('/')))
    } else if prefix == "./" {
        PrefixKind::Dir(base_dir.to_path_buf())
    } else if prefix.starts_with("../") {
        PrefixKind::Dir(base_dir.join(prefix))
    } else if let Some(rest) = prefix.strip_prefix('/') {
        PrefixKind::Dir(project_root.join(rest))
    } else {
        PrefixKind::Ancestors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snapsql_types::ScalarKind;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// S3 — common-type ancestor search (spec §8 scenario S3).
    #[test]
    fn s3_common_type_ancestor_search() {
        let root = tempdir().unwrap();
        let root_path = root.path();

        write(
            &root_path.join("_common.yaml"),
            "GlobalType:\n  id: int\n",
        );
        write(
            &root_path.join("api/users/_common.yaml"),
            "User:\n  name: string\n  department: Department\nDepartment:\n  id: int\n",
        );

        let profiles_dir = root_path.join("api/users/profiles");
        fs::create_dir_all(&profiles_dir).unwrap();

        let mut user_ty = TypeNode::CommonTypeRef {
            reference: "User".to_string(),
            array: false,
        };
        let mut cache = Cache::new();
        resolve(&mut user_ty, &profiles_dir, root_path, &mut cache).unwrap();

        let TypeNode::Object(fields) = &user_ty else {
            panic!("expected resolved object, got {user_ty:?}");
        };
        assert_eq!(fields.get("name"), Some(&TypeNode::Scalar(ScalarKind::String)));
        let department = fields.get("department").unwrap();
        assert!(matches!(department, TypeNode::Object(_)), "{department:?}");

        let mut global_ty = TypeNode::CommonTypeRef {
            reference: "/GlobalType".to_string(),
            array: false,
        };
        resolve(&mut global_ty, &profiles_dir, root_path, &mut cache).unwrap();
        assert!(matches!(global_ty, TypeNode::Object(_)));
    }

    #[test]
    fn missing_common_type_falls_back_to_scalar_string() {
        let root = tempdir().unwrap();
        let mut ty = TypeNode::CommonTypeRef {
            reference: "Nope".to_string(),
            array: false,
        };
        let mut cache = Cache::new();
        resolve(&mut ty, root.path(), root.path(), &mut cache).unwrap();
        assert_eq!(ty, TypeNode::Unknown);
    }

    #[test]
    fn array_suffix_wraps_resolved_definition() {
        let root = tempdir().unwrap();
        write(&root.path().join("_common.yaml"), "User:\n  name: string\n");

        let mut ty = TypeNode::CommonTypeRef {
            reference: "User".to_string(),
            array: true,
        };
        let mut cache = Cache::new();
        resolve(&mut ty, root.path(), root.path(), &mut cache).unwrap();
        assert!(matches!(ty, TypeNode::Array(_)));
    }
}
