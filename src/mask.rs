use serde_json::Value;

/// Parsed form of a field masking annotation.
///
/// Two shapes are recognized: `mask` obscures the whole display string and
/// `mask[N]` keeps the first `N` characters visible. Anything else is not a
/// directive and leaves the value untouched; a typo in an annotation must
/// never fail a log call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDirective {
    Full,
    KeepPrefix(usize),
}

impl MaskDirective {
    /// Parse a directive tag. Returns `None` for anything malformed, which
    /// callers treat as "no masking".
    pub fn parse(tag: &str) -> Option<Self> {
        if tag == "mask" {
            return Some(Self::Full);
        }
        let inner = tag.strip_prefix("mask[")?.strip_suffix(']')?;
        if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        inner.parse().ok().map(Self::KeepPrefix)
    }

    /// Apply the directive to a display string. Counts characters, not
    /// bytes. A visible prefix no shorter than the whole string means the
    /// string is returned unchanged.
    pub fn apply(&self, s: &str) -> String {
        let total = s.chars().count();
        match *self {
            Self::Full => "*".repeat(total),
            Self::KeepPrefix(keep) if keep >= total => s.to_owned(),
            Self::KeepPrefix(keep) => {
                let mut out = String::with_capacity(s.len());
                out.extend(s.chars().take(keep));
                out.extend(std::iter::repeat('*').take(total - keep));
                out
            }
        }
    }
}

/// Mask a stored value according to a raw directive tag.
///
/// Non-string leaves are converted to their canonical display string first,
/// so the masked result is always a JSON string. This type change is
/// observable to formatters and is the documented cost of masking a numeric
/// or boolean field. A malformed tag returns the value unchanged.
pub fn mask_value(value: &Value, tag: &str) -> Value {
    match MaskDirective::parse(tag) {
        Some(directive) => Value::String(directive.apply(&display_string(value))),
        None => value.clone(),
    }
}

fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
