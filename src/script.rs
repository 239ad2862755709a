//! Reshapes whatever JSON the script writer returned into a canonical [`Script`].
//!
//! Models do not reliably honour the requested schema, so a small set of
//! known shapes is tried in order and the first one that matches wins.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ComicError;
use crate::models::{Panel, Script};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptShape {
    /// `{"panels": [...]}`
    Panels,
    /// `{"comic_panels": [...]}`
    ComicPanels,
    /// `{"comic_script": [...]}`
    ComicScript,
    /// `{"panel1": {...}, "panel2": {...}}`
    KeyedPanels,
    /// `[{...}, {...}]`
    BareList,
}

impl ScriptShape {
    pub const ORDER: [ScriptShape; 5] = [
        ScriptShape::Panels,
        ScriptShape::ComicPanels,
        ScriptShape::ComicScript,
        ScriptShape::KeyedPanels,
        ScriptShape::BareList,
    ];

    /// Returns the raw panel list and the remaining top-level fields when
    /// `value` has this shape.
    fn reshape(self, value: &Value) -> Option<(Vec<Value>, Map<String, Value>)> {
        match self {
            ScriptShape::Panels => list_under(value, "panels"),
            ScriptShape::ComicPanels => list_under(value, "comic_panels"),
            ScriptShape::ComicScript => list_under(value, "comic_script"),
            ScriptShape::KeyedPanels => {
                let obj = value.as_object()?;
                let mut panels = Vec::new();
                let mut rest = Map::new();
                for (key, val) in obj {
                    if LIST_KEYS.contains(&key.as_str()) {
                        return None;
                    }
                    if is_panel_key(key) {
                        if !val.is_object() {
                            return None;
                        }
                        panels.push(val.clone());
                    } else {
                        rest.insert(key.clone(), val.clone());
                    }
                }
                if !panels.is_empty() {
                    return Some((panels, rest));
                }
                // No panel-numbered keys: accept only when every value is itself a panel.
                if !obj.is_empty() && obj.values().all(|v| v.is_object() && v.get("image_prompt").is_some()) {
                    return Some((obj.values().cloned().collect(), Map::new()));
                }
                None
            }
            ScriptShape::BareList => Some((value.as_array()?.clone(), Map::new())),
        }
    }
}

/// Keys that must hold a panel array; anything else under them is not a script.
const LIST_KEYS: [&str; 3] = ["panels", "comic_panels", "comic_script"];

/// `panel1`, `panel_2`, `Panel-3`, `panel 4`.
fn is_panel_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix("panel") else {
        return false;
    };
    let digits = rest.trim_start_matches(['_', '-', ' ']);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn list_under(value: &Value, key: &str) -> Option<(Vec<Value>, Map<String, Value>)> {
    let obj = value.as_object()?;
    let panels = obj.get(key)?.as_array()?.clone();
    let mut rest = obj.clone();
    rest.remove(key);
    rest.remove("panels");
    Some((panels, rest))
}

/// Normalizes a script writer response into `{panels: [...]}`.
pub fn normalize(value: Value) -> Result<Script, ComicError> {
    let (shape, raw_panels, extra) = ScriptShape::ORDER
        .iter()
        .find_map(|shape| shape.reshape(&value).map(|(panels, extra)| (*shape, panels, extra)))
        .ok_or_else(|| ComicError::InvalidScript("response has no recognizable panel list".into()))?;

    if raw_panels.is_empty() {
        return Err(ComicError::InvalidScript("script contains no panels".into()));
    }

    let panels = raw_panels
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            serde_json::from_value::<Panel>(raw)
                .map_err(|e| ComicError::InvalidScript(format!("panel {} is not an object: {e}", i + 1)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(?shape, panels = panels.len(), "Normalized comic script");
    Ok(Script { panels, extra })
}
