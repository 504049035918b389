//! Alternate-mirror catalog variants.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::config::{MirrorRule, MirrorVariant};
use crate::error::{CatalogError, Result};
use crate::store::{read_catalog, write_catalog};

const URL_KEY: &str = "url";

/// Apply `rules` in order to every string under a `url` key, returning a
/// new tree. Each rule replaces the first occurrence of its prefix; rules
/// are tried independently of one another.
pub fn rewrite(catalog: &Value, rules: &[MirrorRule]) -> Value {
    let mut out = catalog.clone();
    visit(&mut out, rules);
    out
}

fn visit(node: &mut Value, rules: &[MirrorRule]) {
    match node {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                match value {
                    Value::String(s) if key == URL_KEY => apply_rules(s, rules),
                    other => visit(other, rules),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| visit(v, rules)),
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }
}

fn apply_rules(url: &mut String, rules: &[MirrorRule]) {
    for rule in rules {
        if rule.from.is_empty() {
            continue;
        }
        if url.contains(&rule.from) {
            *url = url.replacen(&rule.from, &rule.to, 1);
        }
    }
}

/// Output path for `input` under `variant`: the `.<tag>.` component of the
/// file name is swapped for the variant's tag (`index.od.json` →
/// `index.gd.json`). Names without the tag get the variant tag appended
/// before the extension.
pub fn variant_path(input: &Path, source_tag: &str, variant: &MirrorVariant) -> PathBuf {
    let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let needle = format!(".{source_tag}.");
    let renamed = if name.contains(&needle) {
        name.replacen(&needle, &format!(".{}.", variant.file_tag), 1)
    } else {
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}.{}.{ext}", variant.file_tag),
            None => format!("{name}.{}", variant.file_tag),
        }
    };
    input.with_file_name(renamed)
}

/// Write the `variant` copy of the catalog at `input`. Returns the written
/// path, or `None` when the input was missing or empty.
pub fn rewrite_file(input: &Path, source_tag: &str, variant: &MirrorVariant) -> Result<Option<PathBuf>> {
    let output = variant_path(input, source_tag, variant);
    if output == input {
        return Err(CatalogError::OutputWouldOverwriteInput(output));
    }
    let Some(value) = read_catalog::<Value>(input)? else {
        return Ok(None);
    };
    write_catalog(&output, &rewrite(&value, &variant.rules))?;
    info!(input = %input.display(), output = %output.display(), variant = %variant.name, "wrote mirror variant");
    Ok(Some(output))
}
