// CHA event catalog loaded from the perfmon JSON event lists

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ChaSliceError, Result};

/// Marker Intel puts in the brief description of retired events
pub const DEPRECATED_MARKER: &str = "This event is deprecated.";

/// One catalog record. `code` and `umask` are -1 when absent or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChaEvent {
    pub name: String,
    pub code: i64,
    pub umask: i64,
    pub brief_description: String,
    pub public_description: String,
    pub unit: String,
    pub filter: String,
    pub per_pkg: bool,
}

impl ChaEvent {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            name: text("EventName"),
            code: parse_hex(&text("EventCode")),
            umask: parse_hex(&text("UMask")),
            brief_description: text("BriefDescription"),
            public_description: text("PublicDescription"),
            unit: text("Unit"),
            filter: text("Filter"),
            per_pkg: obj.get("PerPkg").and_then(Value::as_str) == Some("1"),
        }
    }

    pub fn select(&self) -> Option<EventSelect> {
        Some(EventSelect {
            code: u32::try_from(self.code).ok()?,
            umask: u32::try_from(self.umask).ok()?,
        })
    }
}

/// Resolved `(event code, umask)` pair ready for programming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSelect {
    pub code: u32,
    pub umask: u32,
}

/// Parse a hexadecimal field with optional `0x` prefix. Parsing stops at the
/// first non-hex character; no digits at all yields -1.
pub fn parse_hex(s: &str) -> i64 {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let end = digits
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(digits.len());

    match &digits[..end] {
        "" => -1,
        hex => u32::from_str_radix(hex, 16).map_or(-1, i64::from),
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    events: Vec<ChaEvent>,
}

impl EventCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ChaSliceError::CatalogError(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::parse(&text)?;
        tracing::info!(
            "Loaded {} CHA events from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse a catalog document. The root must be an array; non-object
    /// entries are skipped and deprecated events dropped.
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let entries = root.as_array().ok_or_else(|| {
            ChaSliceError::CatalogError("root element is not an array".to_string())
        })?;

        let mut events = Vec::with_capacity(entries.len());
        let mut deprecated = 0;
        for (index, entry) in entries.iter().enumerate() {
            let Some(obj) = entry.as_object() else {
                tracing::warn!("Catalog entry {} is not an object, skipped", index);
                continue;
            };

            let event = ChaEvent::from_object(obj);
            if event.brief_description.contains(DEPRECATED_MARKER) {
                deprecated += 1;
                continue;
            }
            events.push(event);
        }

        tracing::debug!("Dropped {} deprecated events", deprecated);
        Ok(Self { events })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChaEvent> {
        self.events.iter()
    }

    /// Exact, case-sensitive lookup; the first record wins
    pub fn lookup(&self, name: &str) -> Option<&ChaEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Code and umask of `name`, when both parsed
    pub fn select(&self, name: &str) -> Option<EventSelect> {
        self.lookup(name).and_then(ChaEvent::select)
    }

    /// Case-insensitive substring match over names and brief descriptions
    pub fn search(&self, filter: &str) -> Vec<&ChaEvent> {
        let filter = filter.to_lowercase();
        self.events
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&filter)
                    || e.brief_description.to_lowercase().contains(&filter)
            })
            .collect()
    }

    pub fn by_code(&self, code: i64) -> Vec<&ChaEvent> {
        self.events.iter().filter(|e| e.code == code).collect()
    }
}
