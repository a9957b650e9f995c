//! Pure comparison of declared attribute blocks against live exports.
//!
//! Both sides arrive as flat `key → value` maps. Only keys present on the
//! declared side are examined; extra live attributes are ignored. Values are
//! stringified, whitespace-collapsed and placeholder-masked before the final
//! equality check, so per-user substitution noise (work dirs under a home
//! directory, accounts in submission headers) does not flag a live entry as
//! stale.

use std::collections::BTreeMap;

use maestro_core::text::{mask_placeholders, normalize_text, DEFAULT_MASK_TOKENS};
use maestro_verdi::ComputerExport;
use serde_yaml::Value;
use similar::TextDiff;

// ---------------------------------------------------------------------------
// Options and result
// ---------------------------------------------------------------------------

/// Placeholder tokens masked when they appear in exactly one side.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub mask_tokens: Vec<String>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            mask_tokens: DEFAULT_MASK_TOKENS.iter().map(|t| (*t).to_owned()).collect(),
        }
    }
}

impl CompareOptions {
    fn tokens(&self) -> Vec<&str> {
        self.mask_tokens.iter().map(String::as_str).collect()
    }
}

/// Outcome of a single declared-vs-live comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub equal: bool,
    pub rationale: String,
}

impl Comparison {
    fn matches(section: &str) -> Self {
        Self {
            equal: true,
            rationale: format!("{section} matches"),
        }
    }

    fn differs(section: &str, key: &str, declared: &str, live: &str) -> Self {
        let diff = TextDiff::from_lines(live, declared)
            .unified_diff()
            .header("live", "declared")
            .context_radius(3)
            .to_string();
        Self {
            equal: false,
            rationale: format!("{section} differs at `{key}`\n{diff}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compare a declared computer's setup and config blocks against its export.
///
/// Setup is checked first; config is only reached when setup matches, so the
/// rationale always names the first divergent section.
pub fn compare_computer(
    declared_setup: &BTreeMap<String, Value>,
    declared_config: &BTreeMap<String, Value>,
    export: &ComputerExport,
    opts: &CompareOptions,
) -> Comparison {
    let setup = compare_section("setup", declared_setup, &export.setup, opts, false);
    if !setup.equal {
        return setup;
    }
    compare_section("config", declared_config, &export.config, opts, false)
}

/// Compare a declared code block against its export.
///
/// The exported `computer` attribute carries a live instance label; it is
/// truncated at the first `_` so it compares against the declared computer
/// key.
pub fn compare_code(
    declared: &BTreeMap<String, Value>,
    exported: &BTreeMap<String, Value>,
    opts: &CompareOptions,
) -> Comparison {
    compare_section("code", declared, exported, opts, true)
}

fn compare_section(
    section: &str,
    declared: &BTreeMap<String, Value>,
    exported: &BTreeMap<String, Value>,
    opts: &CompareOptions,
    truncate_computer: bool,
) -> Comparison {
    let tokens = opts.tokens();
    for (key, declared_value) in declared {
        let declared_text = normalize_text(&value_text(declared_value));
        let mut exported_text =
            normalize_text(&value_text(exported.get(key).unwrap_or(&Value::Null)));
        if truncate_computer && key == "computer" {
            exported_text = exported_text
                .split('_')
                .next()
                .unwrap_or_default()
                .to_owned();
        }
        let (declared_text, exported_text) =
            mask_placeholders(&declared_text, &exported_text, &tokens);
        if declared_text != exported_text {
            tracing::debug!(section, key = key.as_str(), "attribute mismatch");
            return Comparison::differs(section, key, &declared_text, &exported_text);
        }
    }
    Comparison::matches(section)
}

/// Render a value the way the comparator sees it. Scalars print bare;
/// anything structured falls back to its YAML rendering.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
