//! Domain types for the maestro profile and the observed registry.
//!
//! Declared state comes from the profile YAML (`Profile` and its blocks);
//! observed state comes from `verdi` listings (`ComputerListing`,
//! `CodeListing`). All types are serializable via serde + serde_yaml.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel value a widget selection holds before the user picks one.
pub const UNSELECTED: &str = "select";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A live registry label (computer label, or `code@computer` for codes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label(pub String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Numeric primary key of a live registry entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pk(pub u64);

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Pk {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

/// Concrete identity of a declared computer expanded with a grant:
/// `name_grant`, or the bare `name` for grant-less entries (e.g. localhost).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(name: &str, grant: Option<&str>) -> Self {
        match grant {
            Some(g) => Self(format!("{name}_{g}")),
            None => Self(name.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The declared computer key (portion before the first `_`).
    pub fn name(&self) -> &str {
        self.0.split_once('_').map_or(self.0.as_str(), |(n, _)| n)
    }

    /// The grant token, if the identity carries one.
    pub fn grant(&self) -> Option<&str> {
        self.0.split_once('_').map(|(_, g)| g)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Computer,
    Code,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Computer => write!(f, "computer"),
            ResourceKind::Code => write!(f, "code"),
        }
    }
}

/// How a custom command is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Run on the block's remote host via `ssh`.
    Ssh,
    /// Run locally.
    Shell,
}

// ---------------------------------------------------------------------------
// Declared state — the profile
// ---------------------------------------------------------------------------

/// Root of the declarative profile YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Profile {
    /// Named string values substituted into the rest of the document.
    /// The reserved `timestamp: now` entry resolves to the load time.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Selection keys and their allowed values (first entry is the sentinel).
    #[serde(default)]
    pub widgets: BTreeMap<String, Vec<String>>,
    /// Grant tokens per computer key. A computer absent here (or mapped to
    /// an empty list) expands to one grant-less instance under its bare name.
    #[serde(default)]
    pub grants: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub computers: BTreeMap<String, ComputerDef>,
    #[serde(default)]
    pub codes: BTreeMap<String, CodeDef>,
    /// Host stanza → key/value pairs written to the client SSH config.
    #[serde(default)]
    pub ssh_config: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_commands: Option<CustomCommands>,
}

impl Profile {
    /// Grant tokens declared for `computer` (empty slice if none).
    pub fn grants_for(&self, computer: &str) -> &[String] {
        self.grants.get(computer).map_or(&[], Vec::as_slice)
    }

    /// Concrete instance identities `computer` expands to.
    pub fn instances_of(&self, computer: &str) -> Vec<InstanceId> {
        let grants = self.grants_for(computer);
        if grants.is_empty() {
            vec![InstanceId::new(computer, None)]
        } else {
            grants
                .iter()
                .map(|g| InstanceId::new(computer, Some(g)))
                .collect()
        }
    }

    /// Every declared grant token across all computers, deduplicated.
    pub fn all_grants(&self) -> BTreeSet<String> {
        self.grants.values().flatten().cloned().collect()
    }

    /// The declared code matching a live `label@instance` entry, if any.
    pub fn code_for(&self, full_label: &str) -> Option<&CodeDef> {
        let (name, computer) = full_label.split_once('@')?;
        let instance = InstanceId::from(computer);
        self.codes
            .values()
            .find(|def| def.label == name && def.computer == instance.name())
    }
}

/// A declared computer: the two attribute blocks fed to
/// `verdi computer setup` and `verdi computer configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputerDef {
    pub setup: ComputerSetup,
    pub config: TransportConfig,
}

/// `verdi computer setup` attribute block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputerSetup {
    pub hostname: String,
    #[serde(default)]
    pub description: String,
    pub transport: String,
    pub scheduler: String,
    pub shebang: String,
    pub work_dir: String,
    pub mpirun_command: String,
    pub mpiprocs_per_machine: u32,
    pub default_memory_per_machine: u64,
    #[serde(default)]
    pub prepend_text: String,
    #[serde(default)]
    pub use_double_quotes: bool,
}

/// `verdi computer configure <transport>` attribute block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub username: String,
    pub port: u16,
    pub look_for_keys: bool,
    pub key_filename: String,
    pub timeout: u32,
    pub allow_agent: bool,
    pub compress: bool,
    pub gss_auth: bool,
    pub gss_kex: bool,
    pub gss_deleg_creds: bool,
    #[serde(default)]
    pub gss_host: String,
    pub load_system_host_keys: bool,
    pub key_policy: String,
    pub use_login_shell: bool,
    pub safe_interval: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_jump: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_command: Option<String>,
}

/// A declared code: references its computer definition by key and carries
/// the `verdi code create core.code.installed` attribute block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeDef {
    /// Key into [`Profile::computers`].
    pub computer: String,
    pub label: String,
    pub filepath_executable: String,
    #[serde(default)]
    pub description: String,
    pub default_calc_job_plugin: String,
    #[serde(default)]
    pub prepend_text: String,
    #[serde(default)]
    pub append_text: String,
    #[serde(default)]
    pub use_double_quotes: bool,
}

/// Post-apply command lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CustomCommands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_commands: Option<RemoteCommands>,
}

/// Named ordered command lists, all addressed to one remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommands {
    pub remotehost: String,
    #[serde(flatten)]
    pub groups: BTreeMap<String, Vec<CustomCommand>>,
}

/// One custom command entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub command: String,
}

// ---------------------------------------------------------------------------
// Observed state — registry listings
// ---------------------------------------------------------------------------

/// A live code entry: full label (`name@computer`) plus pk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeEntry {
    pub label: Label,
    pub pk: Pk,
}

impl CodeEntry {
    /// Portion of the label before `@`.
    pub fn name(&self) -> &str {
        self.label.0.split_once('@').map_or(self.label.0.as_str(), |(n, _)| n)
    }

    /// Owning computer label (portion after `@`), empty if malformed.
    pub fn computer(&self) -> &str {
        self.label.0.split_once('@').map_or("", |(_, c)| c)
    }
}

/// Registered computers partitioned by enablement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ComputerListing {
    pub active: BTreeSet<Label>,
    pub inactive: BTreeSet<Label>,
}

/// Registered codes partitioned by visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CodeListing {
    pub active: BTreeSet<CodeEntry>,
    pub inactive: BTreeSet<CodeEntry>,
}

impl CodeListing {
    /// Pk of the active entry with the given full label.
    pub fn active_pk(&self, label: &str) -> Option<Pk> {
        self.active.iter().find(|c| c.label.0 == label).map(|c| c.pk)
    }

    /// Pk of the inactive entry with the given full label.
    pub fn inactive_pk(&self, label: &str) -> Option<Pk> {
        self.inactive.iter().find(|c| c.label.0 == label).map(|c| c.pk)
    }
}

// ---------------------------------------------------------------------------
// Attribute entries for comparison
// ---------------------------------------------------------------------------

/// Flatten a serializable attribute block into ordered `key → value` entries.
///
/// Both declared blocks (structs) and exported blocks (parsed YAML maps) pass
/// through this so the comparator sees one shape.
pub fn attribute_entries<T: Serialize>(
    block: &T,
) -> Result<BTreeMap<String, serde_yaml::Value>, serde_yaml::Error> {
    let value = serde_yaml::to_value(block)?;
    let mut entries = BTreeMap::new();
    if let serde_yaml::Value::Mapping(map) = value {
        for (k, v) in map {
            if let serde_yaml::Value::String(key) = k {
                entries.insert(key, v);
            }
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
