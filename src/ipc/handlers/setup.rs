use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Import,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Import => "setup.import",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Import => json!({
            "defaultDryRun": false,
            "includeEntities": true,
            "allowedStates": [],
            "allowedCounties": []
        }),
    }
}

/// Effective `setup.import` values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    pub default_dry_run: bool,
    pub include_entities: bool,
    pub allowed_states: Vec<String>,
    pub allowed_counties: Vec<String>,
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_list(
    v: &Value,
    key: &str,
    max_items: usize,
    max_len: usize,
) -> Result<Vec<String>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if items.len() > max_items {
        return Err(format!("{} must have at most {} entries", key, max_items));
    }
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} must be an array of strings", key))?
            .trim();
        if s.is_empty() {
            continue;
        }
        if s.len() > max_len {
            return Err(format!("{} entries must be <= {} chars", key, max_len));
        }
        if !out.iter().any(|o| o.eq_ignore_ascii_case(s)) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Import => match k.as_str() {
                "defaultDryRun" | "includeEntities" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "allowedStates" => {
                    let states: Vec<String> = parse_string_list(v, k, 60, 24)?
                        .into_iter()
                        .map(|s| s.to_ascii_uppercase())
                        .collect();
                    obj.insert(k.clone(), json!(states));
                }
                "allowedCounties" => {
                    obj.insert(k.clone(), json!(parse_string_list(v, k, 500, 80)?));
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

pub fn load_import_settings(conn: &rusqlite::Connection) -> anyhow::Result<ImportSettings> {
    let value = load_section(conn, SetupSection::Import)?;
    Ok(serde_json::from_value(value)?)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let import = match load_section(conn, SetupSection::Import) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "import": import }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "section": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
