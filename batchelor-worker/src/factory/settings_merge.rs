//! Settings-merge algebra (C6): a factory's configured defaults combine
//! with the run request's settings according to a per-key merge mode, then
//! every value undergoes `${VAR}` substitution against the merged map with
//! a relaxed fallback — an unresolved reference is left as literal text
//! rather than erroring, since task settings commonly reference variables
//! a worker doesn't define until execution time (e.g. `${KUBECONFIG}`).

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// The caller-provided value replaces the default entirely.
    Override,
    /// The caller-provided value is appended to the default, space-separated.
    Extend,
    /// The default always wins; any caller-provided value is ignored.
    Fixed,
}

#[derive(Debug, Clone)]
pub struct SettingSpec {
    pub mode: MergeMode,
    pub default: String,
}

pub fn merge_settings(
    defaults: &BTreeMap<String, SettingSpec>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();

    for (key, spec) in defaults {
        let value = match (spec.mode, overrides.get(key)) {
            (MergeMode::Fixed, _) => spec.default.clone(),
            (MergeMode::Override, Some(provided)) => provided.clone(),
            (MergeMode::Override, None) => spec.default.clone(),
            (MergeMode::Extend, Some(provided)) => format!("{} {}", spec.default, provided),
            (MergeMode::Extend, None) => spec.default.clone(),
        };
        merged.insert(key.clone(), value);
    }

    for (key, value) in overrides {
        merged.entry(key.clone()).or_insert_with(|| value.clone());
    }

    merged
}

/// Substitutes every `${VAR}` in `merged`'s values against `merged` itself.
/// A reference to an undefined variable is left untouched.
pub fn substitute_variables(merged: &mut BTreeMap<String, String>) {
    let snapshot = merged.clone();
    for value in merged.values_mut() {
        *value = substitute_one(value, &snapshot);
    }
}

fn substitute_one(input: &str, variables: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            let start = i + 2;
            if let Some(end_offset) = chars[start..].iter().position(|c| *c == '}') {
                let end = start + end_offset;
                let name: String = chars[start..end].iter().collect();
                match variables.get(&name) {
                    Some(value) => output.push_str(value),
                    None => output.push_str(&chars[i..=end].iter().collect::<String>()),
                }
                i = end + 1;
                continue;
            }
        }
        output.push(chars[i]);
        i += 1;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(mode: MergeMode, default: &str) -> SettingSpec {
        SettingSpec {
            mode,
            default: default.to_string(),
        }
    }

    #[test]
    fn override_mode_prefers_caller_value() {
        let defaults = BTreeMap::from([("cmd".to_string(), spec(MergeMode::Override, "default.sh"))]);
        let overrides = BTreeMap::from([("cmd".to_string(), "custom.sh".to_string())]);
        let merged = merge_settings(&defaults, &overrides);
        assert_eq!(merged["cmd"], "custom.sh");
    }

    #[test]
    fn override_mode_falls_back_to_default_without_caller_value() {
        let defaults = BTreeMap::from([("cmd".to_string(), spec(MergeMode::Override, "default.sh"))]);
        let merged = merge_settings(&defaults, &BTreeMap::new());
        assert_eq!(merged["cmd"], "default.sh");
    }

    #[test]
    fn extend_mode_appends_caller_value() {
        let defaults = BTreeMap::from([("args".to_string(), spec(MergeMode::Extend, "--base"))]);
        let overrides = BTreeMap::from([("args".to_string(), "--verbose".to_string())]);
        let merged = merge_settings(&defaults, &overrides);
        assert_eq!(merged["args"], "--base --verbose");
    }

    #[test]
    fn fixed_mode_ignores_caller_value() {
        let defaults = BTreeMap::from([("namespace".to_string(), spec(MergeMode::Fixed, "prod"))]);
        let overrides = BTreeMap::from([("namespace".to_string(), "staging".to_string())]);
        let merged = merge_settings(&defaults, &overrides);
        assert_eq!(merged["namespace"], "prod");
    }

    #[test]
    fn caller_only_keys_pass_through() {
        let merged = merge_settings(&BTreeMap::new(), &BTreeMap::from([("extra".to_string(), "v".to_string())]));
        assert_eq!(merged["extra"], "v");
    }

    #[test]
    fn substitution_resolves_known_variable() {
        let mut merged = BTreeMap::from([
            ("cmd".to_string(), "run ${TARGET}".to_string()),
            ("TARGET".to_string(), "build".to_string()),
        ]);
        substitute_variables(&mut merged);
        assert_eq!(merged["cmd"], "run build");
    }

    #[test]
    fn substitution_leaves_unresolved_variable_literal() {
        let mut merged = BTreeMap::from([("cmd".to_string(), "run ${MISSING}".to_string())]);
        substitute_variables(&mut merged);
        assert_eq!(merged["cmd"], "run ${MISSING}");
    }
}
