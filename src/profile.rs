//! Tolerance profiles: the acceptance ranges a report is judged against.
//!
//! The review core treats a profile as an opaque, already-resolved input.
//! Where it comes from (local database, cloud API, a JSON file) is the job of
//! a [`ProfileStore`]; the only contract is "given an id, return the current
//! tolerance mapping and a monotonically increasing version".

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a tolerance value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceKind {
    /// ± `value` percent of the design value.
    Percent,
    /// ± `value` in `unit`.
    Absolute,
}

/// Acceptable deviation for one measured parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    #[serde(rename = "type")]
    pub kind: ToleranceKind,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Tolerance {
    pub fn percent(value: f64) -> Self {
        Self {
            kind: ToleranceKind::Percent,
            value,
            unit: None,
        }
    }

    pub fn absolute(value: f64, unit: impl Into<String>) -> Self {
        Self {
            kind: ToleranceKind::Absolute,
            value,
            unit: Some(unit.into()),
        }
    }
}

/// A named mapping from parameter name to tolerance.
///
/// Parameters are kept in a `BTreeMap` so the serialised form (and therefore
/// the prompt) is identical across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceProfile {
    pub name: String,
    #[serde(default)]
    pub tolerances: BTreeMap<String, Tolerance>,
}

impl ToleranceProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tolerances: BTreeMap::new(),
        }
    }

    pub fn with(mut self, parameter: impl Into<String>, tolerance: Tolerance) -> Self {
        self.tolerances.insert(parameter.into(), tolerance);
        self
    }

    /// The profile seeded into a fresh installation.
    pub fn manager_default() -> Self {
        Self::new("Manager Default")
            .with("Supply", Tolerance::percent(10.0))
            .with("Return", Tolerance::percent(10.0))
            .with("Exhaust", Tolerance::percent(15.0))
            .with("OA", Tolerance::percent(5.0))
            .with("Coil_dT", Tolerance::absolute(2.0, "F"))
    }

    /// Canonical JSON used inside review prompts.
    pub fn canonical_json(&self) -> String {
        // BTreeMap keys and fixed struct field order make this stable.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A profile as served by a store, with its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedProfile {
    pub id: String,
    pub version: u64,
    #[serde(flatten)]
    pub profile: ToleranceProfile,
}

/// Source of tolerance profiles.
///
/// Implementations must return the latest stored version on every call; the
/// core never caches profiles between runs.
pub trait ProfileStore: Send + Sync {
    fn fetch(&self, id: &str) -> Result<VersionedProfile, ReviewError>;
}

/// Reads `<dir>/<id>.json` files shaped like [`VersionedProfile`].
#[derive(Debug, Clone)]
pub struct DirectoryProfileStore {
    dir: PathBuf,
}

impl DirectoryProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, ReviewError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !id.starts_with('.');
        if !valid {
            return Err(ReviewError::Profile {
                id: id.to_string(),
                detail: "profile ids may only contain letters, digits, '-', '_' and '.'".into(),
            });
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl ProfileStore for DirectoryProfileStore {
    fn fetch(&self, id: &str) -> Result<VersionedProfile, ReviewError> {
        let path = self.path_for(id)?;
        let mut profile = load_profile_file(&path).map_err(|e| match e {
            ReviewError::Profile { detail, .. } => ReviewError::Profile {
                id: id.to_string(),
                detail,
            },
            other => other,
        })?;
        if profile.id.is_empty() {
            profile.id = id.to_string();
        }
        debug!(
            "Loaded profile '{}' v{} ({} tolerances)",
            profile.profile.name,
            profile.version,
            profile.profile.tolerances.len()
        );
        Ok(profile)
    }
}

/// Load a single profile file.
///
/// Accepts either the versioned shape (`{"id", "version", "name",
/// "tolerances"}`) or a bare `{"name", "tolerances"}` profile, which is
/// treated as version 0.
pub fn load_profile_file(path: &Path) -> Result<VersionedProfile, ReviewError> {
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let raw = std::fs::read_to_string(path).map_err(|e| ReviewError::Profile {
        id: id.clone(),
        detail: format!("{}: {e}", path.display()),
    })?;
    parse_profile(&id, &raw)
}

fn parse_profile(id: &str, raw: &str) -> Result<VersionedProfile, ReviewError> {
    #[derive(Deserialize)]
    struct Loose {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        version: u64,
        #[serde(flatten)]
        profile: ToleranceProfile,
    }

    let loose: Loose = serde_json::from_str(raw).map_err(|e| ReviewError::Profile {
        id: id.to_string(),
        detail: e.to_string(),
    })?;
    Ok(VersionedProfile {
        id: loose.id.unwrap_or_else(|| id.to_string()),
        version: loose.version,
        profile: loose.profile,
    })
}
