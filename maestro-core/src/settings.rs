//! Maestro settings store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.maestro/
//!   settings.yaml   (profile path, source spec, selections — mode 0600)
//!   profile.yaml    (default profile location when no source is configured)
//!   source/         (default checkout target for a git-backed profile)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Current on-disk settings schema version.
pub const SETTINGS_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Persisted maestro settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    /// Path to the declarative profile YAML.
    pub profile: PathBuf,
    /// Optional git source the profile is pulled from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,
    /// Widget selections (e.g. `grant` → chosen token).
    #[serde(default)]
    pub selections: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where the profile comes from when it is managed in git.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Clone URL.
    pub repo: String,
    /// Branch to track; `main` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Checkout directory; defaults to `~/.maestro/source` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.maestro/` — created with mode `0700` if absent.
pub fn maestro_dir_at(home: &Path) -> Result<PathBuf, SettingsError> {
    let dir = home.join(".maestro");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.maestro/settings.yaml` — pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".maestro").join("settings.yaml")
}

/// `<home>/.maestro/profile.yaml` — default profile location.
pub fn default_profile_path_at(home: &Path) -> PathBuf {
    home.join(".maestro").join("profile.yaml")
}

/// `<home>/.maestro/source` — default checkout target.
pub fn default_source_path_at(home: &Path) -> PathBuf {
    home.join(".maestro").join("source")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.maestro/settings.yaml`.
///
/// Returns `SettingsError::SettingsNotFound` if absent,
/// `SettingsError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Err(SettingsError::SettingsNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save settings to `<home>/.maestro/settings.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` stays in the target directory (same filesystem — no EXDEV).
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), SettingsError> {
    maestro_dir_at(home)?;
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name("settings.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_at(&home()?, settings)
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

/// Create `<home>/.maestro/settings.yaml` pointing at `profile`.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(
    home: &Path,
    profile: Option<PathBuf>,
    source: Option<SourceSpec>,
) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if path.exists() {
        return load_at(home);
    }

    let now = Utc::now();
    let settings = Settings {
        version: SETTINGS_VERSION,
        profile: profile.unwrap_or_else(|| default_profile_path_at(home)),
        source,
        selections: BTreeMap::new(),
        created_at: now,
        updated_at: now,
    };
    save_at(home, &settings)?;
    Ok(settings)
}

/// `init_at` convenience wrapper.
pub fn init(profile: Option<PathBuf>, source: Option<SourceSpec>) -> Result<Settings, SettingsError> {
    let home = home()?;
    init_at(&home, profile, source)
}

// ---------------------------------------------------------------------------
// Selections
// ---------------------------------------------------------------------------

/// Set one selection key and persist. Returns the updated settings.
pub fn set_selection_at(
    home: &Path,
    key: &str,
    value: &str,
) -> Result<Settings, SettingsError> {
    let mut settings = load_at(home)?;
    settings.selections.insert(key.to_owned(), value.to_owned());
    settings.updated_at = Utc::now();
    save_at(home, &settings)?;
    Ok(settings)
}

/// `set_selection_at` convenience wrapper.
pub fn set_selection(key: &str, value: &str) -> Result<Settings, SettingsError> {
    set_selection_at(&home()?, key, value)
}

/// Remove one selection key and persist. Returns the updated settings.
pub fn clear_selection_at(home: &Path, key: &str) -> Result<Settings, SettingsError> {
    let mut settings = load_at(home)?;
    settings.selections.remove(key);
    settings.updated_at = Utc::now();
    save_at(home, &settings)?;
    Ok(settings)
}

/// `clear_selection_at` convenience wrapper.
pub fn clear_selection(key: &str) -> Result<Settings, SettingsError> {
    clear_selection_at(&home()?, key)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
