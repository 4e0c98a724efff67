use crate::attrs::AttrMap;
use crate::mask;
use serde::Serialize;
use serde_json::Value;

/// Relative dotted leaf path → raw mask directive tag.
pub type FieldMasks = &'static [(&'static str, &'static str)];

/// Capability for types that want field masking applied while being
/// flattened.
///
/// Rust has no runtime reflection, so instead of struct tags a type
/// declares its sensitive fields explicitly. Paths are relative to the
/// value being flattened, dotted and lowercase; directives use the syntax
/// accepted by [`crate::mask::MaskDirective::parse`].
///
/// Directives apply to leaf fields only. A directive naming a nested
/// struct's path matches nothing and masks nothing; whole-subtree masking
/// is intentionally not supported.
///
/// ```
/// use flatlog::Flatten;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Credentials {
///     user: String,
///     password: String,
/// }
///
/// impl Flatten for Credentials {
///     fn field_masks(&self) -> flatlog::flatten::FieldMasks {
///         &[("password", "mask")]
///     }
/// }
/// ```
pub trait Flatten: Serialize {
    fn field_masks(&self) -> FieldMasks {
        &[]
    }
}

/// Flatten `value` into `attrs` under `prefix` (possibly empty), one entry
/// per leaf field, without masking.
///
/// The value is first rendered to a `serde_json::Value` tree; that
/// conversion is the only fallible step and its error is returned without
/// touching the store. Walk rules:
///
/// - objects recurse, extending the path with the lowercased field name;
/// - `null` leaves (serde's rendering of a `None` field) are skipped
///   entirely rather than stored as placeholders;
/// - arrays and all other non-object values are stored as-is.
pub fn expand<T: Serialize>(
    attrs: &AttrMap,
    prefix: &str,
    value: &T,
) -> Result<(), serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    expand_value(attrs, prefix, &tree, &[]);
    Ok(())
}

/// Like [`expand`], applying the directives declared by the type's
/// [`Flatten`] implementation.
pub fn expand_masked<T: Flatten>(
    attrs: &AttrMap,
    prefix: &str,
    value: &T,
) -> Result<(), serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    expand_value(attrs, prefix, &tree, value.field_masks());
    Ok(())
}

/// Walk an already-materialized value tree. Used directly by the logger
/// when a caller-supplied pair turns out to hold a structured value.
pub fn expand_value(attrs: &AttrMap, prefix: &str, tree: &Value, masks: FieldMasks) {
    walk(attrs, prefix, "", tree, masks);
}

fn walk(attrs: &AttrMap, full_path: &str, relative: &str, node: &Value, masks: FieldMasks) {
    match node {
        // Absent optional fields produce no entry at all.
        Value::Null => {}
        Value::Object(fields) => {
            for (name, child) in fields {
                let segment = name.to_lowercase();
                let child_full = join(full_path, &segment);
                let child_relative = join(relative, &segment);
                walk(attrs, &child_full, &child_relative, child, masks);
            }
        }
        leaf => {
            // A bare scalar with no prefix has no addressable path.
            if full_path.is_empty() {
                return;
            }
            match masks.iter().find(|(path, _)| *path == relative) {
                Some((_, tag)) => attrs.set_by_dot_path(full_path, mask::mask_value(leaf, tag)),
                None => attrs.set_by_dot_path(full_path, leaf.clone()),
            }
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}.{segment}")
    }
}
