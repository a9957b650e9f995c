//! Mutating `verdi` verbs.
//!
//! Each function builds one argv vector with flags derived 1:1 from the
//! profile's attribute blocks and runs it through the injected runner.
//! Naming policy (archive labels, which pk to touch) stays with the
//! executor; these stay dumb.
//!
//! Flag asymmetry to keep straight: `verdi computer setup` negates the
//! quoting flag as `--not-use-double-quotes`, `verdi code create` as
//! `--no-use-double-quotes`.

use maestro_core::types::{CodeDef, ComputerSetup, InstanceId, Label, Pk, TransportConfig};
use maestro_exec::{CommandRunner, CommandSpec};

use crate::error::VerdiError;

/// Profile user passed to `verdi computer disable`.
pub const DEFAULT_USER: &str = "aiida@localhost";

/// Token in declared submission-header text that resolves to the grant of
/// the instance being installed.
pub const ACCOUNT_TOKEN: &str = "{account}";

fn run_verdi(runner: &dyn CommandRunner, spec: CommandSpec) -> Result<String, VerdiError> {
    let outcome = runner.run(&spec);
    if outcome.success {
        Ok(outcome.output)
    } else {
        Err(VerdiError::Command { command: spec.rendered(), output: outcome.output })
    }
}

// ---------------------------------------------------------------------------
// Computers
// ---------------------------------------------------------------------------

pub fn computer_relabel(
    runner: &dyn CommandRunner,
    from: &Label,
    to: &Label,
) -> Result<(), VerdiError> {
    tracing::info!(%from, %to, "relabel computer");
    run_verdi(
        runner,
        CommandSpec::local(["verdi", "computer", "relabel", from.as_str(), to.as_str()]),
    )?;
    Ok(())
}

pub fn computer_disable(
    runner: &dyn CommandRunner,
    label: &Label,
    user: &str,
) -> Result<(), VerdiError> {
    tracing::info!(%label, "disable computer");
    run_verdi(
        runner,
        CommandSpec::local(["verdi", "computer", "disable", label.as_str(), user]),
    )?;
    Ok(())
}

/// Register `instance` with the declared setup block.
///
/// The [`ACCOUNT_TOKEN`] in the submission-header text resolves to the
/// instance's grant (empty for grant-less instances).
pub fn computer_setup(
    runner: &dyn CommandRunner,
    instance: &InstanceId,
    setup: &ComputerSetup,
) -> Result<(), VerdiError> {
    tracing::info!(%instance, "setup computer");
    let account = instance.grant().unwrap_or("");
    let prepend = setup.prepend_text.replace(ACCOUNT_TOKEN, account);
    let procs = setup.mpiprocs_per_machine.to_string();
    let memory = setup.default_memory_per_machine.to_string();
    let quotes = if setup.use_double_quotes {
        "--use-double-quotes"
    } else {
        "--not-use-double-quotes"
    };

    let argv = [
        "verdi",
        "computer",
        "setup",
        "--label",
        instance.as_str(),
        "--hostname",
        &setup.hostname,
        "--description",
        &setup.description,
        "--transport",
        &setup.transport,
        "--scheduler",
        &setup.scheduler,
        "--shebang",
        &setup.shebang,
        "--work-dir",
        &setup.work_dir,
        "--mpirun-command",
        &setup.mpirun_command,
        "--mpiprocs-per-machine",
        &procs,
        "--default-memory-per-machine",
        &memory,
        "--prepend-text",
        &prepend,
        "--non-interactive",
        quotes,
    ];
    run_verdi(runner, CommandSpec::local(argv))?;
    Ok(())
}

/// Configure `instance`'s transport with the declared config block.
///
/// The proxy flags are appended only when declared non-empty.
pub fn computer_configure(
    runner: &dyn CommandRunner,
    instance: &InstanceId,
    setup: &ComputerSetup,
    config: &TransportConfig,
) -> Result<(), VerdiError> {
    tracing::info!(%instance, transport = %setup.transport, "configure computer");
    let port = config.port.to_string();
    let timeout = config.timeout.to_string();
    let gss_auth = config.gss_auth.to_string();
    let gss_kex = config.gss_kex.to_string();
    let gss_deleg = config.gss_deleg_creds.to_string();
    let safe_interval = config.safe_interval.to_string();

    let mut argv: Vec<String> = [
        "verdi",
        "computer",
        "configure",
        &setup.transport,
        instance.as_str(),
        "--username",
        &config.username,
        "--port",
        &port,
        toggle(config.look_for_keys, "--look-for-keys", "--no-look-for-keys"),
        "--key-filename",
        &config.key_filename,
        "--timeout",
        &timeout,
        toggle(config.allow_agent, "--allow-agent", "--no-allow-agent"),
        toggle(config.compress, "--compress", "--no-compress"),
        "--gss-auth",
        &gss_auth,
        "--gss-kex",
        &gss_kex,
        "--gss-deleg-creds",
        &gss_deleg,
        "--gss-host",
        &config.gss_host,
        toggle(
            config.load_system_host_keys,
            "--load-system-host-keys",
            "--no-load-system-host-keys",
        ),
        "--key-policy",
        &config.key_policy,
        toggle(config.use_login_shell, "--use-login-shell", "--no-use-login-shell"),
        "--safe-interval",
        &safe_interval,
        "--non-interactive",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();

    if let Some(proxy) = config.proxy_jump.as_deref().filter(|p| !p.is_empty()) {
        argv.push("--proxy-jump".to_owned());
        argv.push(proxy.to_owned());
    }
    if let Some(proxy) = config.proxy_command.as_deref().filter(|p| !p.is_empty()) {
        argv.push("--proxy-command".to_owned());
        argv.push(proxy.to_owned());
    }

    run_verdi(runner, CommandSpec::local(argv))?;
    Ok(())
}

fn toggle(on: bool, yes: &'static str, no: &'static str) -> &'static str {
    if on {
        yes
    } else {
        no
    }
}

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

pub fn code_relabel(runner: &dyn CommandRunner, pk: Pk, to: &str) -> Result<(), VerdiError> {
    tracing::info!(%pk, %to, "relabel code");
    let pk = pk.to_string();
    run_verdi(runner, CommandSpec::local(["verdi", "code", "relabel", &pk, to]))?;
    Ok(())
}

pub fn code_hide(runner: &dyn CommandRunner, pk: Pk) -> Result<(), VerdiError> {
    tracing::info!(%pk, "hide code");
    let pk = pk.to_string();
    run_verdi(runner, CommandSpec::local(["verdi", "code", "hide", &pk]))?;
    Ok(())
}

/// Register `label` on `computer` with the declared code block.
pub fn code_create(
    runner: &dyn CommandRunner,
    computer: &InstanceId,
    label: &str,
    def: &CodeDef,
) -> Result<(), VerdiError> {
    tracing::info!(code = %label, %computer, "create code");
    let prepend = text_or_blank(&def.prepend_text);
    let append = text_or_blank(&def.append_text);
    let quotes = if def.use_double_quotes {
        "--use-double-quotes"
    } else {
        "--no-use-double-quotes"
    };

    let argv = [
        "verdi",
        "code",
        "create",
        "core.code.installed",
        "--computer",
        computer.as_str(),
        "--filepath-executable",
        &def.filepath_executable,
        "--label",
        label,
        "--description",
        &def.description,
        "--default-calc-job-plugin",
        &def.default_calc_job_plugin,
        "--prepend-text",
        prepend,
        "--append-text",
        append,
        quotes,
    ];
    run_verdi(runner, CommandSpec::local(argv))?;
    Ok(())
}

// Undeclared snippets go out as a single blank, which the registry stores
// and the comparator normalizes away.
fn text_or_blank(text: &str) -> &str {
    if text.is_empty() {
        " "
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

/// Resume the given paused processes. No-op on an empty list.
pub fn process_play(runner: &dyn CommandRunner, pks: &[Pk]) -> Result<String, VerdiError> {
    if pks.is_empty() {
        return Ok(String::new());
    }
    tracing::info!(count = pks.len(), "play paused processes");
    let mut argv = vec!["verdi".to_owned(), "process".to_owned(), "play".to_owned()];
    argv.extend(pks.iter().map(Pk::to_string));
    run_verdi(runner, CommandSpec::local(argv))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_exec::ScriptedRunner;

    fn sample_setup() -> ComputerSetup {
        ComputerSetup {
            hostname: "daint.alps.cscs.ch".into(),
            description: "Alps".into(),
            transport: "core.ssh".into(),
            scheduler: "core.slurm".into(),
            shebang: "#!/bin/bash".into(),
            work_dir: "/scratch/{username}/aiida".into(),
            mpirun_command: "srun -n {tot_num_mpiprocs}".into(),
            mpiprocs_per_machine: 72,
            default_memory_per_machine: 64000,
            prepend_text: "#SBATCH --account={account}".into(),
            use_double_quotes: false,
        }
    }

    fn sample_config() -> TransportConfig {
        TransportConfig {
            username: "ada".into(),
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
            proxy_jump: Some("ela.cscs.ch".into()),
            proxy_command: None,
        }
    }

    #[test]
    fn setup_substitutes_grant_and_negates_quoting() {
        let runner = ScriptedRunner::new();
        computer_setup(&runner, &InstanceId::from("daint_g1"), &sample_setup())
            .expect("setup");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let argv = calls[0].resolved();
        assert_eq!(argv[..3], ["verdi", "computer", "setup"]);
        assert!(argv.contains(&"--label".to_owned()));
        assert!(argv.contains(&"daint_g1".to_owned()));
        assert!(argv.contains(&"#SBATCH --account=g1".to_owned()));
        assert!(argv.contains(&"--not-use-double-quotes".to_owned()));
        assert!(argv.contains(&"--non-interactive".to_owned()));
    }

    #[test]
    fn setup_on_grantless_instance_blanks_the_account() {
        let runner = ScriptedRunner::new();
        computer_setup(&runner, &InstanceId::from("localhost"), &sample_setup())
            .expect("setup");
        let argv = runner.calls()[0].resolved();
        assert!(argv.contains(&"#SBATCH --account=".to_owned()));
    }

    #[test]
    fn configure_appends_proxy_jump_only_when_declared() {
        let runner = ScriptedRunner::new();
        let instance = InstanceId::from("daint_g1");
        computer_configure(&runner, &instance, &sample_setup(), &sample_config())
            .expect("configure");

        let rendered = runner.commands().remove(0);
        assert!(rendered.starts_with("verdi computer configure core.ssh daint_g1"));
        assert!(rendered.contains("--look-for-keys"));
        assert!(rendered.contains("--gss-auth false"));
        assert!(rendered.contains("--safe-interval 30"));
        assert!(rendered.ends_with("--proxy-jump ela.cscs.ch"));
        assert!(!rendered.contains("--proxy-command"));

        let mut config = sample_config();
        config.proxy_jump = None;
        let runner = ScriptedRunner::new();
        computer_configure(&runner, &instance, &sample_setup(), &config)
            .expect("configure");
        assert!(!runner.commands()[0].contains("--proxy-jump"));
    }

    #[test]
    fn code_create_blanks_missing_snippets() {
        let def = CodeDef {
            computer: "daint".into(),
            label: "pw-7.4:v2".into(),
            filepath_executable: "pw.x".into(),
            description: "QE pw".into(),
            default_calc_job_plugin: "quantumespresso.pw".into(),
            prepend_text: "#SBATCH --uenv=qe/7.4:v2".into(),
            append_text: String::new(),
            use_double_quotes: false,
        };
        let runner = ScriptedRunner::new();
        code_create(&runner, &InstanceId::from("daint_g1"), "pw-7.4:v2", &def)
            .expect("create");

        let argv = runner.calls()[0].resolved();
        assert_eq!(argv[..4], ["verdi", "code", "create", "core.code.installed"]);
        let append_at = argv.iter().position(|a| a == "--append-text").expect("flag");
        assert_eq!(argv[append_at + 1], " ");
        assert!(argv.contains(&"--no-use-double-quotes".to_owned()));
    }

    #[test]
    fn relabel_and_hide_address_codes_by_pk() {
        let runner = ScriptedRunner::new();
        code_relabel(&runner, Pk(88), "202401011200_pw-7.4:v2").expect("relabel");
        code_hide(&runner, Pk(88)).expect("hide");
        assert_eq!(
            runner.commands(),
            vec![
                "verdi code relabel 88 202401011200_pw-7.4:v2".to_owned(),
                "verdi code hide 88".to_owned(),
            ]
        );
    }

    #[test]
    fn disable_names_the_profile_user() {
        let runner = ScriptedRunner::new();
        computer_disable(&runner, &Label::from("daint_g1"), DEFAULT_USER).expect("disable");
        assert_eq!(
            runner.commands(),
            vec!["verdi computer disable daint_g1 aiida@localhost".to_owned()]
        );
    }

    #[test]
    fn failed_verb_carries_command_context() {
        let runner = ScriptedRunner::new().fail("computer relabel", "label exists");
        let err = computer_relabel(&runner, &Label::from("a"), &Label::from("b")).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("verdi computer relabel a b"));
        assert!(text.contains("label exists"));
    }

    #[test]
    fn play_skips_empty_pk_list() {
        let runner = ScriptedRunner::new();
        let output = process_play(&runner, &[]).expect("play");
        assert!(output.is_empty());
        assert!(runner.calls().is_empty());

        process_play(&runner, &[Pk(4), Pk(9)]).expect("play");
        assert_eq!(runner.commands(), vec!["verdi process play 4 9".to_owned()]);
    }
}
