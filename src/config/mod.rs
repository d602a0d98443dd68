// SPDX-License-Identifier: MIT
//! Config Store: the single JSON document every other component reads and
//! writes through.
//!
//! The document lives at `{data_dir}/config.json`. All writes go through an
//! atomic replace: serialize to a temp file in the same directory, re-parse
//! the written bytes as a verification step, then rename into place. A reader
//! never observes a partially written document; a failed replace leaves the
//! prior document untouched.
//!
//! A corrupt or missing file is repaired on open: defaults are regenerated,
//! a previously valid API key is preserved, and salvageable fields are merged
//! back in from whatever could still be read.

pub mod validate;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{KioskError, Result};
use validate::{generate_api_key, validate_api_key, validate_display_time, validate_url};

/// Default gateway port.
pub const DEFAULT_API_PORT: u16 = 5000;
/// Display time applied when neither the entry nor the playlist default is set.
pub const FALLBACK_DISPLAY_TIME: u64 = 30;
/// How many timestamped backups to retain.
pub const MAX_BACKUPS: usize = 10;

// ─── Document ─────────────────────────────────────────────────────────────────

/// Screen orientation, as understood by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Normal,
    Left,
    Right,
    Inverted,
}

impl std::str::FromStr for Orientation {
    type Err = KioskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "inverted" => Ok(Self::Inverted),
            other => Err(KioskError::validation(format!(
                "unknown orientation '{other}' (expected normal|left|right|inverted)"
            ))),
        }
    }
}

impl Orientation {
    /// The rotation name xrandr expects; identical to the stored form.
    pub fn xrandr_rotation(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Left => "left",
            Self::Right => "right",
            Self::Inverted => "inverted",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Left => "left",
            Self::Right => "right",
            Self::Inverted => "inverted",
        };
        write!(f, "{s}")
    }
}

/// One playlist entry. Order in the `urls` sequence is significant, it
/// defines cycling order and index addressing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistEntry {
    pub url: String,
    /// Seconds to show this entry. Falls back to the playlist default, then
    /// to [`FALLBACK_DISPLAY_TIME`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_time: Option<u64>,
    /// Human label; derived from the URL host when the caller omits it.
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskSection {
    /// The single-mode URL shown when the playlist is disabled.
    pub url: String,
}

impl Default for KioskSection {
    fn default() -> Self {
        Self {
            url: "http://localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DisplaySection {
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Shared secret every gateway request must carry.
    pub api_key: String,
    pub port: u16,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            api_key: generate_api_key(),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistSection {
    /// Whether cycling mode is active.
    pub enabled: bool,
    pub default_display_time: u64,
    pub urls: Vec<PlaylistEntry>,
}

impl Default for PlaylistSection {
    fn default() -> Self {
        Self {
            enabled: false,
            default_display_time: FALLBACK_DISPLAY_TIME,
            urls: Vec::new(),
        }
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KioskConfig {
    pub kiosk: KioskSection,
    pub display: DisplaySection,
    pub api: ApiSection,
    pub playlist: PlaylistSection,
}

impl KioskConfig {
    /// Resolve the display duration for a playlist entry.
    pub fn resolve_display_time(&self, entry: &PlaylistEntry) -> u64 {
        entry
            .display_time
            .or(Some(self.playlist.default_display_time))
            .filter(|t| *t > 0)
            .unwrap_or(FALLBACK_DISPLAY_TIME)
    }

    /// Structural + semantic validity of the document.
    pub fn is_valid(&self) -> bool {
        if validate_url(&self.kiosk.url).is_err() {
            return false;
        }
        if validate_api_key(&self.api.api_key).is_err() {
            return false;
        }
        self.playlist.urls.iter().all(|e| {
            validate_url(&e.url).is_ok()
                && e.display_time
                    .map_or(true, |t| validate_display_time(t as i64).is_ok())
        })
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// File-backed configuration store with dotted-path access.
pub struct ConfigStore {
    path: PathBuf,
    backups_dir: PathBuf,
    doc: RwLock<Value>,
}

impl ConfigStore {
    /// Open (or repair) the config document at `{data_dir}/config.json`.
    pub fn open(data_dir: &Path) -> std::io::Result<Self> {
        let path = data_dir.join("config.json");
        let backups_dir = data_dir.join("backups");
        std::fs::create_dir_all(data_dir)?;
        std::fs::create_dir_all(&backups_dir)?;

        let doc = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(v) if v.is_object() => v,
                _ => {
                    warn!(path = %path.display(), "config unreadable, regenerating with salvage");
                    let repaired = repair_document(&content);
                    write_atomic(&path, &repaired)
                        .map_err(|e| std::io::Error::other(e.to_string()))?;
                    repaired
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config found, writing defaults");
                let fresh = serde_json::to_value(KioskConfig::default())
                    .expect("default config serializes");
                write_atomic(&path, &fresh).map_err(|e| std::io::Error::other(e.to_string()))?;
                fresh
            }
        };

        Ok(Self {
            path,
            backups_dir,
            doc: RwLock::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Typed snapshot of the current document. Unknown or missing fields fall
    /// back to defaults, never to an error.
    pub async fn document(&self) -> KioskConfig {
        let doc = self.doc.read().await;
        serde_json::from_value(doc.clone()).unwrap_or_default()
    }

    /// Read a nested field by dotted path, e.g. `"display.orientation"`.
    pub async fn get(&self, key_path: &str) -> Option<Value> {
        let doc = self.doc.read().await;
        get_path(&doc, key_path).cloned()
    }

    /// Read a nested field, falling back to `default` when absent.
    pub async fn get_or(&self, key_path: &str, default: Value) -> Value {
        self.get(key_path).await.unwrap_or(default)
    }

    /// Set a nested field from string input, coercing `"true"`/`"false"` to
    /// booleans and numeric strings to integers. Missing intermediate objects
    /// are created.
    pub async fn set(&self, key_path: &str, raw: &str) -> Result<()> {
        self.set_value(key_path, coerce(raw)).await
    }

    /// Set a nested field to an already-typed value and persist atomically.
    ///
    /// On a failed replace the in-memory document is rolled back, so memory
    /// and disk never diverge.
    pub async fn set_value(&self, key_path: &str, value: Value) -> Result<()> {
        let mut doc = self.doc.write().await;
        let prior = doc.clone();
        set_path(&mut doc, key_path, value);
        if let Err(e) = write_atomic(&self.path, &doc) {
            *doc = prior;
            return Err(e);
        }
        Ok(())
    }

    /// Replace the whole document with a typed value and persist atomically.
    pub async fn replace(&self, config: &KioskConfig) -> Result<()> {
        let value = serde_json::to_value(config)?;
        let mut doc = self.doc.write().await;
        let prior = doc.clone();
        *doc = value;
        if let Err(e) = write_atomic(&self.path, &doc) {
            *doc = prior;
            return Err(e);
        }
        Ok(())
    }

    /// Whether the current document passes semantic validation.
    pub async fn validate(&self) -> bool {
        self.document().await.is_valid()
    }

    /// Write a timestamped backup of the current document and prune the set
    /// to the [`MAX_BACKUPS`] newest. Returns the backup file name.
    pub async fn backup(&self) -> Result<String> {
        // Sequence suffix keeps names unique (and sortable) even when two
        // backups land in the same millisecond.
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let doc = self.doc.read().await;
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f");
        let name = format!("config-{stamp}-{seq:04}.json");
        let target = self.backups_dir.join(&name);
        write_atomic(&target, &doc)?;
        drop(doc);
        self.prune_backups()?;
        Ok(name)
    }

    /// Restore the document from a named backup, or from the newest one when
    /// `name` is `None`.
    pub async fn restore(&self, name: Option<&str>) -> Result<String> {
        let chosen = match name {
            Some(n) => {
                let p = self.backups_dir.join(n);
                if !p.is_file() {
                    return Err(KioskError::BackupNotFound(n.to_string()));
                }
                p
            }
            None => self
                .list_backups()?
                .pop()
                .ok_or_else(|| KioskError::BackupNotFound("<latest>".to_string()))?,
        };

        let content = std::fs::read_to_string(&chosen)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| KioskError::BackupNotFound(format!("{}: {e}", chosen.display())))?;

        let mut doc = self.doc.write().await;
        let prior = doc.clone();
        *doc = value;
        if let Err(e) = write_atomic(&self.path, &doc) {
            *doc = prior;
            return Err(e);
        }
        let restored = chosen
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(backup = %restored, "config restored from backup");
        Ok(restored)
    }

    /// Backup file paths, oldest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(&self.backups_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "json")
                    && p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with("config-"))
            })
            .collect();
        // Timestamped names sort chronologically.
        found.sort();
        Ok(found)
    }

    fn prune_backups(&self) -> Result<()> {
        let found = self.list_backups()?;
        if found.len() > MAX_BACKUPS {
            for stale in &found[..found.len() - MAX_BACKUPS] {
                if let Err(e) = std::fs::remove_file(stale) {
                    warn!(path = %stale.display(), err = %e, "failed to prune backup");
                }
            }
        }
        Ok(())
    }
}

// ─── Atomic write ─────────────────────────────────────────────────────────────

/// Write `value` to `path` via temp-file-then-rename. The written bytes are
/// re-parsed before the rename; a temp file that does not round-trip is
/// discarded and the prior file is left untouched.
fn write_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| KioskError::ConfigWrite(format!("no parent dir for {}", path.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| KioskError::ConfigWrite(format!("temp file: {e}")))?;
    let bytes = serde_json::to_vec_pretty(value)?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| KioskError::ConfigWrite(format!("temp write: {e}")))?;

    // Verification step: what we wrote must parse back.
    serde_json::from_slice::<Value>(&bytes)
        .map_err(|e| KioskError::ConfigWrite(format!("round-trip verify: {e}")))?;

    tmp.persist(path)
        .map_err(|e| KioskError::ConfigWrite(format!("rename: {e}")))?;
    Ok(())
}

// ─── Dotted-path access ───────────────────────────────────────────────────────

fn get_path<'a>(root: &'a Value, key_path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in key_path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn set_path(root: &mut Value, key_path: &str, value: Value) {
    if !root.is_object() {
        *root = json!({});
    }
    let mut current = root;
    let mut parts = key_path.split('.').peekable();
    while let Some(part) = parts.next() {
        let map = current.as_object_mut().expect("current is an object");
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        let next = map.entry(part.to_string()).or_insert_with(|| json!({}));
        if !next.is_object() {
            *next = json!({});
        }
        current = next;
    }
}

/// String input coercion: `"true"`/`"false"` to booleans, integer strings to
/// numbers, everything else verbatim.
fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => Value::String(raw.to_string()),
        },
    }
}

// ─── Salvage ──────────────────────────────────────────────────────────────────

static SALVAGE_RE: Lazy<Regex> = Lazy::new(|| {
    // "key": "string" | number | true | false, enough to pick scalar fields
    // out of a truncated or mangled document.
    Regex::new(r#""([A-Za-z_]+)"\s*:\s*("(?:[^"\\]|\\.)*"|\d+|true|false)"#)
        .expect("salvage regex is valid")
});

/// Build a fresh default document, merging back whatever scalar fields can
/// still be recognised in the unreadable content. A salvaged API key is kept
/// only when it still passes validation.
fn repair_document(broken: &str) -> Value {
    let mut config = KioskConfig::default();
    let mut kiosk_url_seen = false;

    for cap in SALVAGE_RE.captures_iter(broken) {
        let key = cap[1].to_string();
        let raw = cap[2].trim_matches('"').to_string();
        match key.as_str() {
            "url" => {
                // First url in the document is the kiosk url; later ones
                // belong to playlist entries we cannot reliably reassemble.
                if !kiosk_url_seen && validate_url(&raw).is_ok() {
                    config.kiosk.url = raw;
                    kiosk_url_seen = true;
                }
            }
            "orientation" => {
                if let Ok(o) = raw.parse() {
                    config.display.orientation = o;
                }
            }
            "api_key" => {
                if validate_api_key(&raw).is_ok() {
                    config.api.api_key = raw;
                }
            }
            "port" => {
                if let Ok(p) = raw.parse::<u16>() {
                    config.api.port = p;
                }
            }
            "enabled" => {
                if let Ok(b) = raw.parse::<bool>() {
                    config.playlist.enabled = b;
                }
            }
            "default_display_time" => {
                if let Ok(t) = raw.parse::<i64>() {
                    if validate_display_time(t).is_ok() {
                        config.playlist.default_display_time = t as u64;
                    }
                }
            }
            _ => {}
        }
    }

    serde_json::to_value(config).expect("repaired config serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn set_get_round_trip_with_coercion() {
        let (_dir, store) = store();

        store.set("playlist.enabled", "true").await.unwrap();
        assert_eq!(store.get("playlist.enabled").await, Some(json!(true)));

        store.set("playlist.default_display_time", "45").await.unwrap();
        assert_eq!(
            store.get("playlist.default_display_time").await,
            Some(json!(45))
        );

        store.set("kiosk.url", "http://example.com").await.unwrap();
        assert_eq!(
            store.get("kiosk.url").await,
            Some(json!("http://example.com"))
        );
    }

    #[tokio::test]
    async fn set_creates_intermediate_objects() {
        let (_dir, store) = store();
        store.set("extra.nested.flag", "false").await.unwrap();
        assert_eq!(store.get("extra.nested.flag").await, Some(json!(false)));
    }

    #[tokio::test]
    async fn missing_path_returns_default() {
        let (_dir, store) = store();
        assert_eq!(store.get("no.such.key").await, None);
        assert_eq!(store.get_or("no.such.key", json!(7)).await, json!(7));
    }

    #[tokio::test]
    async fn corrupt_file_is_repaired_preserving_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = "preserved_key_0123456789abcdef";
        let broken = format!(
            r#"{{"kiosk": {{"url": "http://kept.example.com"}}, "api": {{"api_key": "{key}", "port": 5151 BROKEN"#
        );
        std::fs::write(dir.path().join("config.json"), broken).unwrap();

        let store = ConfigStore::open(dir.path()).unwrap();
        let doc = store.document().await;
        assert_eq!(doc.api.api_key, key);
        assert_eq!(doc.api.port, 5151);
        assert_eq!(doc.kiosk.url, "http://kept.example.com");
        // The repaired file on disk is valid JSON again.
        let on_disk = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(serde_json::from_str::<Value>(&on_disk).is_ok());
    }

    #[tokio::test]
    async fn missing_file_regenerates_defaults() {
        let (_dir, store) = store();
        let doc = store.document().await;
        assert!(!doc.playlist.enabled);
        assert_eq!(doc.playlist.default_display_time, FALLBACK_DISPLAY_TIME);
        assert!(validate_api_key(&doc.api.api_key).is_ok());
    }

    #[tokio::test]
    async fn validate_tracks_document_health() {
        let (_dir, store) = store();
        assert!(store.validate().await);

        // set_value is the raw path with no boundary checks; validate()
        // is what catches a document damaged through it.
        store
            .set_value("kiosk.url", json!("javascript:alert(1)"))
            .await
            .unwrap();
        assert!(!store.validate().await);

        store
            .set_value("kiosk.url", json!("http://ok.example.com"))
            .await
            .unwrap();
        assert!(store.validate().await);

        store
            .set_value("api.api_key", json!("too short"))
            .await
            .unwrap();
        assert!(!store.validate().await);
    }

    #[tokio::test]
    async fn backups_capped_at_ten() {
        let (_dir, store) = store();
        for _ in 0..13 {
            store.backup().await.unwrap();
        }
        assert_eq!(store.list_backups().unwrap().len(), MAX_BACKUPS);
    }

    #[tokio::test]
    async fn restore_latest_backup() {
        let (_dir, store) = store();
        store
            .set("kiosk.url", "http://before.example.com")
            .await
            .unwrap();
        store.backup().await.unwrap();
        store
            .set("kiosk.url", "http://after.example.com")
            .await
            .unwrap();

        store.restore(None).await.unwrap();
        assert_eq!(
            store.get("kiosk.url").await,
            Some(json!("http://before.example.com"))
        );
    }

    #[tokio::test]
    async fn restore_unknown_backup_fails() {
        let (_dir, store) = store();
        assert!(matches!(
            store.restore(Some("config-nope.json")).await,
            Err(KioskError::BackupNotFound(_))
        ));
    }

    #[test]
    fn resolve_display_time_chain() {
        let mut config = KioskConfig::default();
        config.playlist.default_display_time = 60;
        let with_own = PlaylistEntry {
            url: "http://a.example".into(),
            display_time: Some(10),
            title: "a".into(),
        };
        let without = PlaylistEntry {
            url: "http://b.example".into(),
            display_time: None,
            title: "b".into(),
        };
        assert_eq!(config.resolve_display_time(&with_own), 10);
        assert_eq!(config.resolve_display_time(&without), 60);

        config.playlist.default_display_time = 0;
        assert_eq!(config.resolve_display_time(&without), FALLBACK_DISPLAY_TIME);
    }
}
