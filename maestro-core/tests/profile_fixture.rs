//! Full-profile loading tests: a realistic multi-computer declaration with
//! ssh stanzas and custom commands, exercised through `profile::load`.

use std::collections::BTreeMap;
use std::io::Write;

use maestro_core::profile::{self, LocalSource};
use maestro_core::types::{CommandKind, InstanceId};
use maestro_core::{ProfileError, UNSELECTED};
use rstest::rstest;
use tempfile::NamedTempFile;

const FIXTURE: &str = r##"
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
      description: Alps production vcluster
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
  localhost:
    setup:
      hostname: localhost
      description: Local machine
      transport: core.local
      scheduler: core.direct
      shebang: "#!/bin/bash"
      work_dir: /home/{username}/aiida
      mpirun_command: mpirun -np {tot_num_mpiprocs}
      mpiprocs_per_machine: 4
      default_memory_per_machine: 8000
      use_double_quotes: false
    config:
      username: aiida
      port: 22
      look_for_keys: true
      key_filename: ""
      timeout: 60
      allow_agent: false
      compress: false
      gss_auth: false
      gss_kex: false
      gss_deleg_creds: false
      gss_host: ""
      load_system_host_keys: true
      key_policy: AutoAddPolicy
      use_login_shell: false
      safe_interval: 0.0
codes:
  qe:
    computer: daint
    label: pw-7.4:v2
    filepath_executable: pw.x
    description: Quantum ESPRESSO pw
    default_calc_job_plugin: quantumespresso.pw
    prepend_text: "#SBATCH --uenv=qe/7.4:v2"
  cp2k:
    computer: daint
    label: cp2k-2024.3
    filepath_executable: /user-environment/bin/cp2k.psmp
    description: CP2K
    default_calc_job_plugin: cp2k
    prepend_text: "#SBATCH --uenv=cp2k/2024.3:v1"
ssh_config:
  daint.alps.cscs.ch:
    hostname: daint.alps.cscs.ch
    user: "{username}"
    proxy_jump: ela.cscs.ch
    identity_file: ~/.ssh/cscs-key
  ela.cscs.ch:
    hostname: ela.cscs.ch
    identity_file: ~/.ssh/cscs-key
custom_commands:
  remote_commands:
    remotehost: daint.alps.cscs.ch
    post_setup:
      - type: ssh
        command: mkdir -p /capstor/scratch/cscs/aiida
      - type: shell
        command: echo done
"##;

fn write_fixture() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile");
    file.write_all(FIXTURE.as_bytes()).expect("write fixture");
    file
}

fn selections(grant: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("grant".to_owned(), grant.to_owned());
    map
}

#[test]
fn fixture_loads_and_types_every_section() {
    let file = write_fixture();
    let loaded = profile::load(file.path(), &selections("g1"), &LocalSource).expect("load");
    let profile = loaded.profile;

    assert_eq!(profile.computers.len(), 2);
    assert_eq!(profile.codes.len(), 2);
    assert_eq!(profile.ssh_config.len(), 2);

    assert_eq!(profile.grants_for("daint"), ["g1".to_owned(), "g2".to_owned()]);
    let daint = &profile.computers["daint"];
    assert_eq!(daint.config.proxy_jump.as_deref(), Some("ela.cscs.ch"));
    assert_eq!(daint.setup.mpiprocs_per_machine, 72);

    let custom = profile.custom_commands.expect("custom commands");
    let remote = custom.remote_commands.expect("remote commands");
    assert_eq!(remote.remotehost, "daint.alps.cscs.ch");
    let post_setup = &remote.groups["post_setup"];
    assert_eq!(post_setup.len(), 2);
    assert_eq!(post_setup[0].kind, CommandKind::Ssh);
    assert_eq!(post_setup[1].kind, CommandKind::Shell);
}

#[test]
fn fixture_variable_substitution_reaches_nested_blocks() {
    let file = write_fixture();
    let loaded = profile::load(file.path(), &selections("g2"), &LocalSource).expect("load");
    let daint = &loaded.profile.computers["daint"];
    assert!(daint.setup.work_dir.starts_with("/capstor/scratch/cscs/"));
}

#[test]
fn fixture_instance_expansion() {
    let file = write_fixture();
    let loaded = profile::load(file.path(), &selections("g1"), &LocalSource).expect("load");

    let daint = loaded.profile.instances_of("daint");
    assert_eq!(daint, vec![InstanceId::from("daint_g1"), InstanceId::from("daint_g2")]);

    let localhost = loaded.profile.instances_of("localhost");
    assert_eq!(localhost, vec![InstanceId::from("localhost")]);
}

#[rstest]
#[case::sentinel_value(Some(UNSELECTED))]
#[case::no_entry_at_all(None)]
fn fixture_rejects_unselected_grant(#[case] value: Option<&str>) {
    let file = write_fixture();
    let provided = match value {
        Some(v) => selections(v),
        None => BTreeMap::new(),
    };
    let err = profile::load(file.path(), &provided, &LocalSource).unwrap_err();
    assert!(matches!(err, ProfileError::MissingSelection { ref key } if key == "grant"));
}
