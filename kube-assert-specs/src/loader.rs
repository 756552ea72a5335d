//! Template file loading.

use crate::errors::{HarnessError, HarnessResult};
use std::fs;
use std::path::Path;

/// Read a single template file.
pub fn load_template(path: &Path) -> HarnessResult<String> {
    fs::read_to_string(path).map_err(|e| HarnessError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load all templates from a directory (glob: **/*.yaml, **/*.yml), sorted
/// by relative path.
pub fn load_all_templates(dir: &Path) -> HarnessResult<Vec<(String, String)>> {
    let mut templates = Vec::new();
    load_templates_recursive(dir, dir, &mut templates)?;
    templates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(templates)
}

fn load_templates_recursive(
    base: &Path,
    dir: &Path,
    templates: &mut Vec<(String, String)>,
) -> HarnessResult<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let read_error = |e: std::io::Error| HarnessError::Load {
        path: dir.display().to_string(),
        message: e.to_string(),
    };

    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();

        if path.is_dir() {
            load_templates_recursive(base, &path, templates)?;
        } else if path
            .extension()
            .map_or(false, |e| e == "yaml" || e == "yml")
        {
            let relative = path.strip_prefix(base).unwrap_or(&path);
            let content = load_template(&path)?;
            templates.push((relative.display().to_string(), content));
        }
    }

    Ok(())
}
