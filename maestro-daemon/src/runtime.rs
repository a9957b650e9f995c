use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use maestro_audit::{load_snapshot, scan, StaleWorkChainReport, DEFAULT_CUTOFF_DAYS};
use maestro_exec::ShellRunner;
use maestro_reconcile::{ApplyReport, CheckReport, RunContext};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    logs_dir, maestro_root, run_dir, snapshot_path, socket_path, DAEMON_LABEL, DEBOUNCE_WINDOW,
    TICK_INTERVAL,
};
use crate::protocol::{AuditArgs, DaemonRequest, DaemonResponse};

/// Last successful pass plus the Unix time it finished.
type LastPass = Option<(PassSummary, u64)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Check,
    Apply,
}

impl PassKind {
    fn label(self) -> &'static str {
        match self {
            PassKind::Check => "check",
            PassKind::Apply => "apply",
        }
    }
}

struct PassJob {
    kind: PassKind,
    source: &'static str,
    respond_to: oneshot::Sender<Result<PassSummary, String>>,
}

/// Compact record of one check or apply pass, as sent over the socket.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub kind: &'static str,
    pub source: &'static str,
    pub in_sync: bool,
    pub grant: Option<String>,
    pub computers_planned: usize,
    pub codes_planned: usize,
    pub ssh_rewrite: bool,
    pub applied: Vec<String>,
    pub failed: Vec<String>,
    pub duration_ms: u128,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let last_pass: Arc<RwLock<LastPass>> = Arc::new(RwLock::new(None));
    let busy = Arc::new(AtomicBool::new(false));
    let started_at_unix = unix_seconds_now();

    let (pass_tx, pass_rx) = mpsc::channel::<PassJob>(8);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let tick_handle = {
        let shutdown = shutdown_tx.clone();
        let pass_tx = pass_tx.clone();
        let busy = busy.clone();
        tokio::spawn(async move {
            let result = tick_task(pass_tx, busy, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let pass_tx = pass_tx.clone();
        let busy = busy.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, pass_tx, busy, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let last_pass = last_pass.clone();
        let busy = busy.clone();
        tokio::spawn(async move {
            let result = pass_processor_task(home, last_pass, busy, pass_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let last_pass = last_pass.clone();
        let busy = busy.clone();
        let pass_tx = pass_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                last_pass,
                busy,
                pass_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (tick_result, watcher_result, processor_result, socket_result, rotation_result, signal_result) =
        tokio::join!(
            tick_handle,
            watcher_handle,
            processor_handle,
            socket_handle,
            rotation_handle,
            signal_handle
        );

    handle_join("tick", tick_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("pass_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

async fn tick_task(
    pass_tx: mpsc::Sender<PassJob>,
    busy: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match enqueue_pass(&pass_tx, &busy, PassKind::Check, "tick").await {
                    Ok(summary) if summary.in_sync => {
                        tracing::debug!(duration_ms = summary.duration_ms, "tick check: registry in sync");
                    }
                    Ok(summary) => {
                        tracing::warn!(
                            computers = summary.computers_planned,
                            codes = summary.codes_planned,
                            ssh = summary.ssh_rewrite,
                            "tick check found drift; run `maestro apply`",
                        );
                    }
                    Err(DaemonError::Busy) => {
                        tracing::debug!("pass in flight, tick skipped");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "tick check failed");
                    }
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    home: PathBuf,
    pass_tx: mpsc::Sender<PassJob>,
    busy: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = maestro_root(&home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let root = fs::canonicalize(&root).unwrap_or(root);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut watched_dirs = HashSet::new();
    register_tree(&mut _watcher, &mut watched_dirs, &root)?;

    // The declared profile may live outside ~/.maestro; watch its directory
    // as well when the settings name one.
    match maestro_core::settings::load_at(&home) {
        Ok(settings) => {
            if let Some(parent) = settings.profile.parent() {
                if parent.exists() {
                    register_tree(&mut _watcher, &mut watched_dirs, parent)?;
                }
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "no settings yet, watching the maestro root only");
        }
    }

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    // Register directories as they appear under the root.
                    if let Some(watch_dir) = directory_to_watch(&path) {
                        if watch_dir.starts_with(&root) && watch_dir.exists() {
                            register_tree(&mut _watcher, &mut watched_dirs, &watch_dir)?;
                        }
                    }

                    if !is_declaration_yaml(&path) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    match enqueue_pass(&pass_tx, &busy, PassKind::Check, "watcher").await {
                        Ok(summary) if summary.in_sync => {
                            tracing::info!(
                                path = %path.display(),
                                "declaration changed, registry still in sync",
                            );
                        }
                        Ok(summary) => {
                            tracing::warn!(
                                path = %path.display(),
                                computers = summary.computers_planned,
                                codes = summary.codes_planned,
                                "declaration changed and the registry drifted; run `maestro apply`",
                            );
                        }
                        Err(DaemonError::Busy) => {
                            tracing::debug!("pass in flight, watcher trigger skipped");
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "watcher-triggered check failed");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Pass processor
// ---------------------------------------------------------------------------

async fn pass_processor_task(
    home: PathBuf,
    last_pass: Arc<RwLock<LastPass>>,
    busy: Arc<AtomicBool>,
    mut pass_rx: mpsc::Receiver<PassJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = pass_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let kind = job.kind;
                let source = job.source;
                let home_for_pass = home.clone();
                let outcome = match tokio::task::spawn_blocking(move || {
                    run_pass_blocking(&home_for_pass, kind, source)
                })
                .await
                {
                    Ok(Ok(mut summary)) => {
                        summary.duration_ms = started.elapsed().as_millis();
                        *last_pass.write().await = Some((summary.clone(), unix_seconds_now()));
                        tracing::info!(
                            kind = kind.label(),
                            source,
                            in_sync = summary.in_sync,
                            duration_ms = summary.duration_ms,
                            "pass finished",
                        );
                        Ok(summary)
                    }
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(err) => Err(format!("pass task join error: {err}")),
                };

                busy.store(false, Ordering::SeqCst);
                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

fn run_pass_blocking(
    home: &Path,
    kind: PassKind,
    source: &'static str,
) -> Result<PassSummary, DaemonError> {
    let settings = maestro_core::settings::load_at(home)?;
    let runner = ShellRunner::new();
    let ctx = RunContext::new(&runner, home, settings);
    let grant = ctx.selected_grant().map(str::to_owned);
    match kind {
        PassKind::Check => Ok(summarize_check(&ctx.check()?, grant, source)),
        PassKind::Apply => Ok(summarize_apply(&ctx.apply()?, grant, source)),
    }
}

fn planned_counts(check: &CheckReport) -> (usize, usize, bool) {
    let plan = &check.report.plan;
    let computers = plan.computers.values().filter(|d| !d.is_noop()).count();
    let codes = plan.codes.values().filter(|d| !d.is_noop()).count();
    (computers, codes, plan.ssh.is_some())
}

fn summarize_check(check: &CheckReport, grant: Option<String>, source: &'static str) -> PassSummary {
    let (computers_planned, codes_planned, ssh_rewrite) = planned_counts(check);
    PassSummary {
        kind: "check",
        source,
        in_sync: check.in_sync(),
        grant,
        computers_planned,
        codes_planned,
        ssh_rewrite,
        applied: Vec::new(),
        failed: Vec::new(),
        duration_ms: 0,
    }
}

fn summarize_apply(report: &ApplyReport, grant: Option<String>, source: &'static str) -> PassSummary {
    let (computers_planned, codes_planned, ssh_rewrite) = planned_counts(&report.check);
    let mut failed = report.summary.failed.clone();
    for command in &report.summary.commands {
        if let Some(err) = &command.failure {
            failed.push(format!("commands {}: {err}", command.group));
        }
    }
    PassSummary {
        kind: "apply",
        source,
        in_sync: report.check.in_sync(),
        grant,
        computers_planned,
        codes_planned,
        ssh_rewrite,
        applied: report.summary.applied.clone(),
        failed,
        duration_ms: 0,
    }
}

/// Hand a pass to the processor unless one is already in flight.
///
/// The busy flag is taken here and released by the processor when the pass
/// ends, so a tick or request arriving mid-pass is answered busy instead of
/// queueing behind it.
async fn enqueue_pass(
    pass_tx: &mpsc::Sender<PassJob>,
    busy: &AtomicBool,
    kind: PassKind,
    source: &'static str,
) -> Result<PassSummary, DaemonError> {
    if busy.swap(true, Ordering::SeqCst) {
        return Err(DaemonError::Busy);
    }

    let (tx, rx) = oneshot::channel();
    if pass_tx
        .send(PassJob {
            kind,
            source,
            respond_to: tx,
        })
        .await
        .is_err()
    {
        busy.store(false, Ordering::SeqCst);
        return Err(DaemonError::ChannelClosed("pass queue"));
    }

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("pass response"))?;
    outcome.map_err(DaemonError::Protocol)
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    home: PathBuf,
    last_pass: Arc<RwLock<LastPass>>,
    busy: Arc<AtomicBool>,
    pass_tx: mpsc::Sender<PassJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let last_pass = last_pass.clone();
                let busy = busy.clone();
                let pass_tx = pass_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        last_pass,
                        busy,
                        pass_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    last_pass: Arc<RwLock<LastPass>>,
    busy: Arc<AtomicBool>,
    pass_tx: mpsc::Sender<PassJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => DaemonResponse::ok(
                build_status_payload(&home, last_pass.clone(), &busy, started_at_unix).await,
            ),
            "check" => {
                pass_response(enqueue_pass(&pass_tx, &busy, PassKind::Check, "socket").await)
            }
            "apply" => {
                pass_response(enqueue_pass(&pass_tx, &busy, PassKind::Apply, "socket").await)
            }
            "audit" => match parse_audit_args(request.args.as_ref()) {
                Ok(args) => match run_audit(home.clone(), args).await {
                    Ok(report) => DaemonResponse::ok(json!(report)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                Err(err) => DaemonResponse::error(err),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

fn pass_response(result: Result<PassSummary, DaemonError>) -> DaemonResponse {
    match result {
        Ok(summary) => DaemonResponse::ok(json!(summary)),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

fn parse_audit_args(args: Option<&Value>) -> Result<AuditArgs, String> {
    match args {
        None => Ok(AuditArgs::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| format!("invalid audit args: {err}")),
    }
}

async fn build_status_payload(
    home: &Path,
    last_pass: Arc<RwLock<LastPass>>,
    busy: &AtomicBool,
    started_at_unix: u64,
) -> Value {
    let last = { last_pass.read().await.clone() };
    let (pass_json, last_pass_at_unix) = match last {
        Some((summary, at)) => (json!(summary), at),
        None => (Value::Null, 0),
    };

    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "busy": busy.load(Ordering::SeqCst),
        "last_pass": pass_json,
        "last_pass_at_unix": last_pass_at_unix,
        "socket": socket_path(home).display().to_string(),
        "root": maestro_root(home).display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

async fn run_audit(home: PathBuf, args: AuditArgs) -> Result<StaleWorkChainReport, DaemonError> {
    tokio::task::spawn_blocking(move || run_audit_blocking(&home, args))
        .await
        .map_err(|err| DaemonError::Protocol(format!("audit task join error: {err}")))?
}

fn run_audit_blocking(home: &Path, args: AuditArgs) -> Result<StaleWorkChainReport, DaemonError> {
    let snapshot = snapshot_path(home);
    if !snapshot.exists() {
        return Err(DaemonError::Protocol(format!(
            "no provenance snapshot at {}; export one first",
            snapshot.display()
        )));
    }
    let store = load_snapshot(&snapshot)?;
    Ok(scan(
        &store,
        args.cutoff_days.unwrap_or(DEFAULT_CUTOFF_DAYS),
        args.reverse,
        args.paused_only,
    ))
}

// ---------------------------------------------------------------------------
// Housekeeping tasks and helpers
// ---------------------------------------------------------------------------

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok();
            }
        }
    }
    Ok(())
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    watched_dirs: &mut HashSet<PathBuf>,
    root: &Path,
) -> Result<(), DaemonError> {
    if !root.exists() {
        fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
    }
    for dir in collect_dirs(root)? {
        let canonical = match fs::canonicalize(&dir) {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&dir, err)),
        };
        if watched_dirs.insert(canonical.clone()) {
            watcher.watch(&canonical, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %canonical.display(), "watching declaration directory");
        }
    }
    Ok(())
}

fn collect_dirs(root: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_declaration_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

fn directory_to_watch(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        Some(path.to_path_buf())
    } else {
        path.parent().map(Path::to_path_buf)
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [maestro_root(home), run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("MAESTRO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
