//! Profile loading and normalization.
//!
//! Load order: source freshness check → sentinel check on the provided
//! selections → read + parse → placeholder substitution → typed validation.
//!
//! The replacement map is the union of the selections and every
//! string-valued `variables` entry (variables get a selections pass first,
//! so a variable may reference a selection). `{token}` occurrences are
//! replaced across the whole YAML tree — mappings, sequences, scalars.
//! The reserved `timestamp: now` variable resolves to the load time. The
//! `{username}` and `{account}` tokens are normally not in the map: the
//! first is expanded remotely by the scheduler, the second per instance at
//! compare/install time.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Local;

use crate::error::ProfileError;
use crate::types::{Profile, UNSELECTED};

// ---------------------------------------------------------------------------
// Source freshness
// ---------------------------------------------------------------------------

/// Outcome of the pre-load source check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// The local profile matches its source.
    Current,
    /// The local checkout was behind and has been refreshed; the caller
    /// should surface a warning so the user inspects the changes.
    Refreshed,
}

/// Collaborator consulted before the profile file is read.
///
/// The git-backed implementation lives with the pipeline; profiles without
/// a configured source use [`LocalSource`].
pub trait SourceCheck {
    fn ensure_current(&self) -> Result<SourceStatus, ProfileError>;
}

/// No-op check for a plain local profile file.
pub struct LocalSource;

impl SourceCheck for LocalSource {
    fn ensure_current(&self) -> Result<SourceStatus, ProfileError> {
        Ok(SourceStatus::Current)
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// A normalized profile plus the source-check outcome it was loaded under.
#[derive(Debug)]
pub struct LoadedProfile {
    pub profile: Profile,
    pub source: SourceStatus,
}

/// Load, substitute, and validate the profile at `path`.
///
/// Fails before touching the file if any selection still holds the
/// [`UNSELECTED`] sentinel; fails after parsing if a widget key has no
/// selection at all, or if a code references an unknown computer.
pub fn load(
    path: &Path,
    selections: &BTreeMap<String, String>,
    source: &dyn SourceCheck,
) -> Result<LoadedProfile, ProfileError> {
    let status = source.ensure_current()?;

    for (key, value) in selections {
        if value == UNSELECTED {
            return Err(ProfileError::MissingSelection { key: key.clone() });
        }
    }

    if !path.exists() {
        return Err(ProfileError::ProfileNotFound { path: path.to_path_buf() });
    }
    let contents = std::fs::read_to_string(path)?;
    let raw: serde_yaml::Value = serde_yaml::from_str(&contents)
        .map_err(|e| ProfileError::Parse { path: path.to_path_buf(), source: e })?;

    let replacements = build_replacements(&raw, selections);
    let substituted = substitute(raw, &replacements);

    let profile: Profile = serde_yaml::from_value(substituted)
        .map_err(|e| ProfileError::Parse { path: path.to_path_buf(), source: e })?;
    validate(&profile, selections)?;

    Ok(LoadedProfile { profile, source: status })
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Union of selections and resolved string variables. Variables win on key
/// collision, matching their later position in the merge.
fn build_replacements(
    raw: &serde_yaml::Value,
    selections: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut variables: BTreeMap<String, String> = BTreeMap::new();
    if let Some(serde_yaml::Value::Mapping(map)) = raw.get("variables") {
        for (k, v) in map {
            if let (serde_yaml::Value::String(key), serde_yaml::Value::String(value)) = (k, v) {
                variables.insert(key.clone(), value.clone());
            }
        }
    }

    if variables.get("timestamp").map(String::as_str) == Some("now") {
        variables.insert(
            "timestamp".to_owned(),
            Local::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
        );
    }

    for value in variables.values_mut() {
        *value = replace_tokens(value, selections);
    }

    let mut all = selections.clone();
    all.extend(variables);
    all
}

/// Replace every `{key}` occurrence in `s`.
fn replace_tokens(s: &str, replacements: &BTreeMap<String, String>) -> String {
    let mut out = s.to_owned();
    for (key, value) in replacements {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Tree-walk transform: descend mappings and sequences, rewrite string
/// scalars, leave other scalars untouched. Mapping keys are not rewritten.
pub fn substitute(
    value: serde_yaml::Value,
    replacements: &BTreeMap<String, String>,
) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Mapping(map) => serde_yaml::Value::Mapping(
            map.into_iter().map(|(k, v)| (k, substitute(v, replacements))).collect(),
        ),
        serde_yaml::Value::Sequence(seq) => serde_yaml::Value::Sequence(
            seq.into_iter().map(|v| substitute(v, replacements)).collect(),
        ),
        serde_yaml::Value::String(s) => {
            serde_yaml::Value::String(replace_tokens(&s, replacements))
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(
    profile: &Profile,
    selections: &BTreeMap<String, String>,
) -> Result<(), ProfileError> {
    for key in profile.widgets.keys() {
        match selections.get(key) {
            None => return Err(ProfileError::MissingSelection { key: key.clone() }),
            Some(value) if value == UNSELECTED => {
                return Err(ProfileError::MissingSelection { key: key.clone() })
            }
            Some(_) => {}
        }
    }

    for (code_key, code) in &profile.codes {
        if !profile.computers.contains_key(&code.computer) {
            return Err(ProfileError::UnknownComputer {
                code: code_key.clone(),
                computer: code.computer.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PROFILE: &str = r##"
variables:
  timestamp: now
  scratch: /capstor/scratch/cscs
widgets:
  grant:
    - select
    - g1
    - g2
grants:
  daint: [g1, g2]
computers:
  daint:
    setup:
      hostname: daint.alps.cscs.ch
      description: Alps ({grant})
      transport: core.ssh
      scheduler: core.slurm
      shebang: "#!/bin/bash"
      work_dir: "{scratch}/{username}/aiida"
      mpirun_command: srun -n {tot_num_mpiprocs}
      mpiprocs_per_machine: 72
      default_memory_per_machine: 64000
      prepend_text: "#SBATCH --uenv=qe/7.4:v2\n#SBATCH --account={account}"
      use_double_quotes: false
    config:
      username: "{username}"
      port: 22
      look_for_keys: true
      key_filename: ~/.ssh/cscs-key
      timeout: 60
      allow_agent: true
      compress: true
      gss_auth: false
      gss_kex: false
      gss_deleg_creds: false
      gss_host: ""
      load_system_host_keys: true
      key_policy: AutoAddPolicy
      use_login_shell: true
      safe_interval: 30.0
      proxy_jump: ela.cscs.ch
codes:
  qe:
    computer: daint
    label: pw-7.4:v2
    filepath_executable: pw.x
    description: Quantum ESPRESSO
    default_calc_job_plugin: quantumespresso.pw
    prepend_text: "#SBATCH --uenv=qe/7.4:v2"
"##;

    fn write_profile(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write profile");
        file
    }

    fn grant_selection(value: &str) -> BTreeMap<String, String> {
        let mut selections = BTreeMap::new();
        selections.insert("grant".to_owned(), value.to_owned());
        selections
    }

    #[test]
    fn load_substitutes_selections_and_variables() {
        let file = write_profile(PROFILE);
        let loaded =
            load(file.path(), &grant_selection("g1"), &LocalSource).expect("load");
        let daint = &loaded.profile.computers["daint"];
        assert_eq!(daint.setup.description, "Alps (g1)");
        assert_eq!(daint.setup.work_dir, "/capstor/scratch/cscs/{username}/aiida");
        assert_eq!(loaded.source, SourceStatus::Current);
    }

    #[test]
    fn load_keeps_reserved_tokens() {
        let file = write_profile(PROFILE);
        let loaded =
            load(file.path(), &grant_selection("g1"), &LocalSource).expect("load");
        let daint = &loaded.profile.computers["daint"];
        assert!(daint.setup.prepend_text.contains("{account}"));
        assert_eq!(daint.config.username, "{username}");
    }

    #[test]
    fn load_rejects_sentinel_selection() {
        let file = write_profile(PROFILE);
        let err = load(file.path(), &grant_selection(UNSELECTED), &LocalSource).unwrap_err();
        assert!(matches!(err, ProfileError::MissingSelection { ref key } if key == "grant"));
    }

    #[test]
    fn load_rejects_missing_widget_selection() {
        let file = write_profile(PROFILE);
        let err = load(file.path(), &BTreeMap::new(), &LocalSource).unwrap_err();
        assert!(matches!(err, ProfileError::MissingSelection { ref key } if key == "grant"));
    }

    #[test]
    fn load_rejects_unknown_computer_reference() {
        let broken = PROFILE.replace("computer: daint", "computer: ghost");
        let file = write_profile(&broken);
        let err = load(file.path(), &grant_selection("g1"), &LocalSource).unwrap_err();
        assert!(
            matches!(err, ProfileError::UnknownComputer { ref computer, .. } if computer == "ghost")
        );
    }

    #[test]
    fn load_missing_file_errors() {
        let err = load(
            Path::new("/nonexistent/profile.yaml"),
            &BTreeMap::new(),
            &LocalSource,
        )
        .unwrap_err();
        assert!(matches!(err, ProfileError::ProfileNotFound { .. }));
    }

    #[test]
    fn load_malformed_yaml_reports_path() {
        let file = write_profile(": : not yaml : [");
        let err = load(file.path(), &BTreeMap::new(), &LocalSource).unwrap_err();
        assert!(matches!(err, ProfileError::Parse { .. }), "got: {err}");
    }

    #[test]
    fn timestamp_now_resolves_to_formatted_time() {
        let raw: serde_yaml::Value =
            serde_yaml::from_str("variables:\n  timestamp: now\n").expect("yaml");
        let replacements = build_replacements(&raw, &BTreeMap::new());
        let stamp = replacements.get("timestamp").expect("timestamp");
        assert_eq!(stamp.len(), "2026-01-02-03-04-05".len());
        assert!(stamp.chars().all(|c| c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn timestamp_literal_is_kept() {
        let raw: serde_yaml::Value =
            serde_yaml::from_str("variables:\n  timestamp: 2024-01-01-00-00-00\n").expect("yaml");
        let replacements = build_replacements(&raw, &BTreeMap::new());
        assert_eq!(
            replacements.get("timestamp").map(String::as_str),
            Some("2024-01-01-00-00-00")
        );
    }

    #[test]
    fn variables_resolve_selections_before_merge() {
        let raw: serde_yaml::Value =
            serde_yaml::from_str("variables:\n  image_tag: \"prod-{grant}\"\n").expect("yaml");
        let replacements = build_replacements(&raw, &grant_selection("g2"));
        assert_eq!(replacements.get("image_tag").map(String::as_str), Some("prod-g2"));
    }

    #[test]
    fn substitute_descends_sequences_and_mappings() {
        let raw: serde_yaml::Value =
            serde_yaml::from_str("hosts:\n  - \"{site}.a\"\n  - \"{site}.b\"\nport: 22\n")
                .expect("yaml");
        let mut replacements = BTreeMap::new();
        replacements.insert("site".to_owned(), "alps".to_owned());
        let out = substitute(raw, &replacements);
        let hosts = out.get("hosts").and_then(|v| v.as_sequence()).expect("hosts");
        assert_eq!(hosts[0].as_str(), Some("alps.a"));
        assert_eq!(hosts[1].as_str(), Some("alps.b"));
        assert_eq!(out.get("port").and_then(|v| v.as_u64()), Some(22));
    }
}
