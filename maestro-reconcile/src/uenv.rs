//! Remote uenv image management.
//!
//! Codes that are installed or verified may reference a uenv image in their
//! submission header (`#SBATCH --uenv=<image>`). Those images must exist in
//! the user's repository on the target host before any job can run. The
//! lookup is three-tiered: already pulled for the user, pullable from the
//! host registry, or pullable from the `service::` namespace. An image
//! available nowhere is a hard failure that needs manual intervention.

use std::collections::{BTreeMap, BTreeSet};

use maestro_core::text::first_column;
use maestro_core::Profile;
use maestro_exec::{CommandRunner, CommandSpec};

use crate::error::ReconcileError;
use crate::plan::UpdatePlan;

const UENV_MARKER: &str = "#SBATCH --uenv=";

/// The image name referenced by a submission header, if any.
///
/// The name runs from the marker to the first character outside
/// `[A-Za-z0-9_\-/.:]`, e.g. `qe/7.4:v2`.
pub fn extract_image(prepend_text: &str) -> Option<String> {
    let start = prepend_text.find(UENV_MARKER)? + UENV_MARKER.len();
    let image: String = prepend_text[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.' | ':'))
        .collect();
    (!image.is_empty()).then_some(image)
}

/// `(host, image)` pairs required by the plan: one per code being installed
/// or verified whose declaration references an image. Order follows the
/// plan; duplicates collapse.
pub fn required_images(profile: &Profile, plan: &UpdatePlan) -> Vec<(String, String)> {
    let mut required = Vec::new();
    for (label, directive) in &plan.codes {
        if !(directive.install || directive.check_uenv) {
            continue;
        }
        let Some(def) = profile.code_for(label.as_str()) else {
            continue;
        };
        let Some(host) = profile
            .computers
            .get(&def.computer)
            .map(|c| c.setup.hostname.clone())
        else {
            continue;
        };
        if let Some(image) = extract_image(&def.prepend_text) {
            let pair = (host, image);
            if !required.contains(&pair) {
                required.push(pair);
            }
        }
    }
    required
}

/// Make every required image available in the user repository of its host.
pub fn ensure_images(
    runner: &dyn CommandRunner,
    required: &[(String, String)],
) -> Result<(), ReconcileError> {
    let hosts: BTreeSet<&str> = required.iter().map(|(host, _)| host.as_str()).collect();
    let mut available = BTreeMap::new();
    for host in hosts {
        ensure_repo(runner, host)?;
        available.insert(host, HostImages::fetch(runner, host)?);
    }

    for (host, image) in required {
        let images = &available[host.as_str()];
        if images.user.contains(image) {
            tracing::debug!(host = host.as_str(), image = image.as_str(), "image present");
        } else if images.host.contains(image) {
            tracing::info!(host = host.as_str(), image = image.as_str(), "pulling image");
            pull(runner, host, image)?;
        } else if images.service.contains(image) {
            tracing::info!(
                host = host.as_str(),
                image = image.as_str(),
                "pulling image from service namespace"
            );
            pull(runner, host, &format!("service::{image}"))?;
        } else {
            return Err(uenv_err(
                host,
                format!("image `{image}` is not available from any repository"),
            ));
        }
    }
    Ok(())
}

/// Create the user repository when `uenv repo status` reports none.
fn ensure_repo(runner: &dyn CommandRunner, host: &str) -> Result<(), ReconcileError> {
    let status = remote(runner, host, &["uenv", "repo", "status"])?;
    let text = status.to_lowercase();
    if status.is_empty() || text.contains("not found") || text.contains("no repository") {
        tracing::info!(host, "creating uenv repository");
        remote(runner, host, &["uenv", "repo", "create"])?;
    }
    Ok(())
}

fn pull(runner: &dyn CommandRunner, host: &str, image: &str) -> Result<(), ReconcileError> {
    remote(runner, host, &["uenv", "image", "pull", image])?;
    Ok(())
}

fn remote(
    runner: &dyn CommandRunner,
    host: &str,
    argv: &[&str],
) -> Result<String, ReconcileError> {
    let outcome = runner.run(&CommandSpec::remote(host, argv.iter().copied()));
    if outcome.success {
        Ok(outcome.output)
    } else {
        Err(uenv_err(
            host,
            format!("`{}` failed: {}", argv.join(" "), outcome.output),
        ))
    }
}

fn uenv_err(host: &str, message: String) -> ReconcileError {
    ReconcileError::Uenv {
        host: host.to_owned(),
        message,
    }
}

/// Image names visible on one host, per lookup tier.
struct HostImages {
    user: BTreeSet<String>,
    host: BTreeSet<String>,
    service: BTreeSet<String>,
}

impl HostImages {
    fn fetch(runner: &dyn CommandRunner, host: &str) -> Result<Self, ReconcileError> {
        Ok(Self {
            user: listing(runner, host, &["uenv", "image", "ls"])?,
            host: listing(runner, host, &["uenv", "image", "find"])?,
            service: listing(runner, host, &["uenv", "image", "find", "service::"])?,
        })
    }
}

fn listing(
    runner: &dyn CommandRunner,
    host: &str,
    argv: &[&str],
) -> Result<BTreeSet<String>, ReconcileError> {
    Ok(first_column(&remote(runner, host, argv)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use maestro_core::{CodeDef, ComputerDef, ComputerSetup, Label, TransportConfig};
    use maestro_exec::ScriptedRunner;

    use crate::plan::UpdateDirective;

    const HOST: &str = "daint.alps.cscs.ch";
    const IMAGE: &str = "qe/7.4:v2";

    fn runner_with(user: &str, host: &str, service: &str) -> ScriptedRunner {
        ScriptedRunner::new()
            .respond("repo status", "main repo at /capstor/scratch")
            .respond("image find service::", service)
            .respond("image find", host)
            .respond("image ls", user)
    }

    fn with_header(rows: &[&str]) -> String {
        let mut listing = String::from("uenv           arch\n");
        for row in rows {
            listing.push_str(row);
            listing.push('\n');
        }
        listing
    }

    #[test]
    fn image_in_marker_is_extracted_up_to_the_first_foreign_character() {
        assert_eq!(
            extract_image("#SBATCH --uenv=qe/7.4:v2\n#SBATCH --account=g1"),
            Some("qe/7.4:v2".into())
        );
        assert_eq!(
            extract_image("#SBATCH --uenv=cp2k/2024.3:v1 --views=default"),
            Some("cp2k/2024.3:v1".into())
        );
        assert_eq!(extract_image("module load cray"), None);
        assert_eq!(extract_image("#SBATCH --uenv="), None);
    }

    #[test]
    fn present_image_needs_no_pull() {
        let runner = runner_with(&with_header(&[IMAGE]), "", "");
        ensure_images(&runner, &[(HOST.into(), IMAGE.into())]).expect("ensure");
        assert!(!runner.commands().iter().any(|c| c.contains("pull")));
    }

    #[test]
    fn host_image_is_pulled_directly() {
        let runner = runner_with("", &with_header(&[IMAGE]), "");
        ensure_images(&runner, &[(HOST.into(), IMAGE.into())]).expect("ensure");
        assert!(runner
            .commands()
            .contains(&format!("ssh {HOST} uenv image pull {IMAGE}")));
    }

    #[test]
    fn service_image_is_pulled_through_the_namespace() {
        let runner = runner_with("", "", &with_header(&[IMAGE]));
        ensure_images(&runner, &[(HOST.into(), IMAGE.into())]).expect("ensure");
        assert!(runner
            .commands()
            .contains(&format!("ssh {HOST} uenv image pull service::{IMAGE}")));
    }

    #[test]
    fn unavailable_image_is_a_hard_failure() {
        let runner = runner_with("", "", "");
        let err = ensure_images(&runner, &[(HOST.into(), IMAGE.into())])
            .expect_err("image is nowhere");
        assert!(err.to_string().contains(IMAGE), "got: {err}");
    }

    #[test]
    fn missing_repo_is_created_before_any_listing() {
        let runner = ScriptedRunner::new()
            .respond("repo status", "no repository found")
            .respond("image ls", &with_header(&[IMAGE]));
        ensure_images(&runner, &[(HOST.into(), IMAGE.into())]).expect("ensure");

        let create = runner
            .position_of("uenv repo create")
            .expect("repo created");
        let list = runner.position_of("uenv image ls").expect("listed");
        assert!(create < list);
    }

    #[test]
    fn healthy_repo_is_left_alone() {
        let runner = runner_with(&with_header(&[IMAGE]), "", "");
        ensure_images(&runner, &[(HOST.into(), IMAGE.into())]).expect("ensure");
        assert!(!runner.commands().iter().any(|c| c.contains("repo create")));
    }

    #[test]
    fn listing_failure_aborts_with_the_command_context() {
        let runner = ScriptedRunner::new()
            .respond("repo status", "main repo ready")
            .fail("image ls", "Connection closed by remote host");
        let err =
            ensure_images(&runner, &[(HOST.into(), IMAGE.into())]).expect_err("listing failed");
        assert!(err.to_string().contains("uenv image ls"), "got: {err}");
    }

    // ------------------------------------------------------------------
    // required_images
    // ------------------------------------------------------------------

    fn profile_with_code(prepend_text: &str) -> Profile {
        let mut profile = Profile::default();
        profile.computers.insert(
            "daint".into(),
            ComputerDef {
                setup: ComputerSetup {
                    hostname: HOST.into(),
                    description: String::new(),
                    transport: "core.ssh".into(),
                    scheduler: "core.slurm".into(),
                    shebang: "#!/bin/bash".into(),
                    work_dir: "/scratch/{username}/aiida".into(),
                    mpirun_command: "srun -n {tot_num_mpiprocs}".into(),
                    mpiprocs_per_machine: 72,
                    default_memory_per_machine: 64000,
                    prepend_text: String::new(),
                    use_double_quotes: false,
                },
                config: TransportConfig {
                    username: "{username}".into(),
                    port: 22,
                    look_for_keys: true,
                    key_filename: "~/.ssh/cscs-key".into(),
                    timeout: 60,
                    allow_agent: true,
                    compress: true,
                    gss_auth: false,
                    gss_kex: false,
                    gss_deleg_creds: false,
                    gss_host: String::new(),
                    load_system_host_keys: true,
                    key_policy: "AutoAddPolicy".into(),
                    use_login_shell: true,
                    safe_interval: 30.0,
                    proxy_jump: None,
                    proxy_command: None,
                },
            },
        );
        profile.codes.insert(
            "pw".into(),
            CodeDef {
                computer: "daint".into(),
                label: "pw-7.4".into(),
                filepath_executable: "/user-environment/env/bin/pw.x".into(),
                description: String::new(),
                default_calc_job_plugin: "quantumespresso.pw".into(),
                prepend_text: prepend_text.into(),
                append_text: String::new(),
                use_double_quotes: false,
            },
        );
        profile
    }

    #[test]
    fn plan_codes_contribute_their_images_once() {
        let profile = profile_with_code("#SBATCH --uenv=qe/7.4:v2");
        let mut plan = UpdatePlan::default();
        plan.codes.insert(
            Label::from("pw-7.4@daint_g1"),
            UpdateDirective {
                install: true,
                ..Default::default()
            },
        );
        plan.codes.insert(
            Label::from("pw-7.4@daint_g2"),
            UpdateDirective {
                check_uenv: true,
                ..Default::default()
            },
        );

        let required = required_images(&profile, &plan);
        assert_eq!(required, vec![(HOST.to_owned(), IMAGE.to_owned())]);
    }

    #[test]
    fn untouched_and_markerless_codes_contribute_nothing() {
        let profile = profile_with_code("module load quantum-espresso");
        let mut plan = UpdatePlan::default();
        plan.codes.insert(
            Label::from("pw-7.4@daint_g1"),
            UpdateDirective {
                install: true,
                ..Default::default()
            },
        );
        assert!(required_images(&profile, &plan).is_empty());

        let profile = profile_with_code("#SBATCH --uenv=qe/7.4:v2");
        let mut plan = UpdatePlan::default();
        plan.codes.insert(
            Label::from("pw-7.4@daint_g1"),
            UpdateDirective {
                hide: true,
                ..Default::default()
            },
        );
        assert!(required_images(&profile, &plan).is_empty());
    }
}
