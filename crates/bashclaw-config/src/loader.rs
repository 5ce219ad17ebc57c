// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/bashclaw/config.json"));

    if let Some(state_dir) = std::env::var_os("BASHCLAW_STATE_DIR") {
        paths.push(PathBuf::from(state_dir).join("config.json"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/bashclaw/config.json"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("bashclaw/config.json"));
    }

    paths.push(PathBuf::from(".bashclaw/config.json"));
    paths.push(PathBuf::from("bashclaw.json"));

    paths
}

/// Load configuration by merging all discovered JSON layers, then expanding
/// `$VAR`/`${VAR}` references in every string value against the process
/// environment. The `extra` argument may provide an explicit path (e.g. a
/// `--config` flag at the binary layer).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_json::Value::Object(serde_json::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_json(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_json::Value =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_json(&mut merged, layer);
    }

    expand_vars(&mut merged);

    let config: Config = if matches!(merged, serde_json::Value::Object(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_json::from_value(merged).context("deserializing merged config")?
    };
    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_json(dst: &mut serde_json::Value, src: serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_json::Value::Object(serde_json::Map::new()));
                merge_json(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Recursively expand `$VAR`/`${VAR}` references in every string leaf of a
/// JSON value against the process environment. Values that reference unset
/// variables are left untouched rather than erroring, since config files are
/// shared across environments that may not define every optional variable.
fn expand_vars(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if let Ok(expanded) = shellexpand::env(s) {
                *s = expanded.into_owned();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                expand_vars(item);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values_mut() {
                expand_vars(v);
            }
        }
        _ => {}
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_json::Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val(r#"{"x": 1}"#);
        let src = val(r#"{"x": 2}"#);
        merge_json(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val(r#"{"a": 1, "b": 2}"#);
        let src = val(r#"{"b": 99}"#);
        merge_json(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val(r#"{"agents": {"defaults": {"modelId": "a"}}}"#);
        let src = val(r#"{"agents": {"defaults": {"modelId": "b"}}}"#);
        merge_json(&mut dst, src);
        assert_eq!(dst["agents"]["defaults"]["modelId"].as_str(), Some("b"));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/bashclaw_nonexistent_config_xyz.json")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.session.max_history, 200);
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"{{"agents": {{"defaults": {{"modelId": "anthropic/claude-opus-4-6"}}}}}}"#
        )
        .unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(
            cfg.agents.defaults.model_id.as_deref(),
            Some("anthropic/claude-opus-4-6")
        );
    }

    #[test]
    fn expand_vars_substitutes_env_var() {
        std::env::set_var("BASHCLAW_TEST_VAR_XYZ", "expanded-value");
        let mut v = val(r#"{"key": "prefix-$BASHCLAW_TEST_VAR_XYZ-suffix"}"#);
        expand_vars(&mut v);
        assert_eq!(v["key"].as_str(), Some("prefix-expanded-value-suffix"));
        std::env::remove_var("BASHCLAW_TEST_VAR_XYZ");
    }

    #[test]
    fn expand_vars_leaves_unset_var_untouched() {
        let mut v = val(r#"{"key": "$BASHCLAW_TEST_VAR_NOT_SET_ABC"}"#);
        expand_vars(&mut v);
        assert_eq!(v["key"].as_str(), Some("$BASHCLAW_TEST_VAR_NOT_SET_ABC"));
    }
}
