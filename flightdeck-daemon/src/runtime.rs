use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use flightdeck_core::types::{PhaseKind, Project, ProjectId};
use flightdeck_core::Store;
use flightdeck_sync::{Resolution, SyncConfig, SyncEngine};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    logs_dir, plans_dir, resolve_plan_dir, socket_path, watching_configured, PLAN_DIR_ENV,
    SYNC_ENABLED_ENV,
};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Shared handles every socket client needs.
#[derive(Clone)]
struct DaemonContext {
    home: PathBuf,
    store: Arc<Store>,
    engine: SyncEngine,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
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

/// Run the daemon runtime: sync engine, socket server, log rotation, and
/// ctrl-c handling, all wired to one shutdown broadcast.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let store = Arc::new(Store::open_at(&home)?);
    let plan_dir = resolve_plan_dir(&home);
    if !plan_dir.exists() {
        fs::create_dir_all(&plan_dir).map_err(|e| io_err(&plan_dir, e))?;
    }

    let engine = SyncEngine::new(store.clone(), SyncConfig::new(&plan_dir));
    if watching_configured() {
        engine.start()?;
    } else {
        tracing::info!(
            "file watching off; set {PLAN_DIR_ENV} and {SYNC_ENABLED_ENV}=true to enable"
        );
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let context = DaemonContext {
        home: home.clone(),
        store,
        engine: engine.clone(),
        shutdown_tx: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
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

    let (socket_result, rotation_result, signal_result) =
        tokio::join!(socket_handle, rotation_handle, signal_handle);

    engine.stop();

    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    context: DaemonContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon socket ready");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
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
    context: DaemonContext,
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
        let response = handle_request(&context, request).await;
        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn handle_request(context: &DaemonContext, request: DaemonRequest) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(context)),
        "conflicts" => DaemonResponse::ok(json!({ "conflicts": context.engine.conflicts() })),
        "resolve" => handle_resolve(context, request).await,
        "write" => handle_write(context, request).await,
        "log" => handle_log(context, request).await,
        "stop" => {
            let _ = context.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

fn build_status_payload(context: &DaemonContext) -> Value {
    let sync = context.engine.status();
    json!({
        "running": true,
        "started_at_unix": context.started_at_unix,
        "watching": context.engine.is_running(),
        "plan_dir": context.engine.config().plan_dir.display().to_string(),
        "sync": sync,
        "socket": socket_path(&context.home).display().to_string(),
    })
}

async fn handle_resolve(context: &DaemonContext, request: DaemonRequest) -> DaemonResponse {
    let Some(conflict_id) = request.conflict_id else {
        return DaemonResponse::error("resolve requires 'conflict_id'");
    };
    let resolution = match request.resolution.as_deref() {
        Some(raw) => match raw.parse::<Resolution>() {
            Ok(resolution) => resolution,
            Err(err) => return DaemonResponse::error(err),
        },
        None => return DaemonResponse::error("resolve requires 'resolution'"),
    };

    match context.engine.resolve_conflict(conflict_id, resolution).await {
        Ok(()) => DaemonResponse::ok(json!({
            "resolved": conflict_id,
            "resolution": resolution.as_str(),
        })),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn handle_write(context: &DaemonContext, request: DaemonRequest) -> DaemonResponse {
    let Some(project) = request.project else {
        return DaemonResponse::error("write requires 'project'");
    };
    let Some(phase) = request.phase else {
        return DaemonResponse::error("write requires 'phase'");
    };
    let kind = match phase.parse::<PhaseKind>() {
        Ok(kind) => kind,
        Err(err) => return DaemonResponse::error(err),
    };
    let updates = match request.updates {
        Some(updates) => match yaml_updates(updates) {
            Ok(updates) => updates,
            Err(err) => return DaemonResponse::error(err),
        },
        None => return DaemonResponse::error("write requires 'updates'"),
    };

    let resolved = {
        let store = context.store.clone();
        tokio::task::spawn_blocking(move || resolve_project(&store, &project)).await
    };
    let project = match resolved {
        Ok(Ok(project)) => project,
        Ok(Err(err)) => return DaemonResponse::error(err.to_string()),
        Err(err) => return DaemonResponse::error(format!("project lookup failed: {err}")),
    };

    match context
        .engine
        .write_to_file(&project.id, kind, updates)
        .await
    {
        Ok(()) => DaemonResponse::ok(json!({
            "project": project.id,
            "phase": kind.as_str(),
            "written": true,
        })),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn handle_log(context: &DaemonContext, request: DaemonRequest) -> DaemonResponse {
    let limit = request.limit.unwrap_or(50);
    let store = context.store.clone();
    let entries = tokio::task::spawn_blocking(move || store.sync_log(limit)).await;
    match entries {
        Ok(Ok(entries)) => DaemonResponse::ok(json!({ "entries": entries })),
        Ok(Err(err)) => DaemonResponse::error(err.to_string()),
        Err(err) => DaemonResponse::error(format!("log read failed: {err}")),
    }
}

/// Accepts either a project name or a project id.
fn resolve_project(store: &Store, name_or_id: &str) -> Result<Project, DaemonError> {
    if let Some(project) = store.project_by_name(name_or_id)? {
        return Ok(project);
    }
    Ok(store.project(&ProjectId::from(name_or_id))?)
}

fn yaml_updates(value: Value) -> Result<BTreeMap<String, serde_yaml::Value>, String> {
    let Value::Object(map) = value else {
        return Err("'updates' must be a JSON object".to_string());
    };
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let yaml = serde_yaml::to_value(&value)
            .map_err(|err| format!("unrepresentable update value for '{key}': {err}"))?;
        out.insert(key, yaml);
    }
    Ok(out)
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok(); // rotation failures are logged inside rotate_logs
            }
        }
    }
    Ok(())
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [plans_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
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

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_context(home: &Path) -> DaemonContext {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let engine = SyncEngine::new(store.clone(), SyncConfig::new(home.join("plans")));
        let (shutdown_tx, _) = broadcast::channel(4);
        DaemonContext {
            home: home.to_path_buf(),
            store,
            engine,
            shutdown_tx,
            started_at_unix: 1_000_000,
        }
    }

    #[tokio::test]
    async fn status_reports_idle_engine() {
        let home = TempDir::new().expect("home");
        let context = test_context(home.path());

        let response = handle_request(&context, DaemonRequest::new("status")).await;
        assert!(response.ok);
        let data = response.data.expect("data");
        assert_eq!(data["running"], json!(true));
        assert_eq!(data["watching"], json!(false));
        assert_eq!(data["sync"]["status"], json!("synced"));
        assert_eq!(data["sync"]["conflict_count"], json!(0));
    }

    #[tokio::test]
    async fn conflicts_are_empty_on_a_fresh_daemon() {
        let home = TempDir::new().expect("home");
        let context = test_context(home.path());

        let response = handle_request(&context, DaemonRequest::new("conflicts")).await;
        assert!(response.ok);
        let data = response.data.expect("data");
        assert_eq!(data["conflicts"], json!([]));
    }

    #[tokio::test]
    async fn resolve_without_id_or_with_unknown_id_fails() {
        let home = TempDir::new().expect("home");
        let context = test_context(home.path());

        let bare = handle_request(&context, DaemonRequest::new("resolve")).await;
        assert!(!bare.ok);

        let mut request = DaemonRequest::new("resolve");
        request.conflict_id = Some(17);
        request.resolution = Some("use_file".to_string());
        let missing = handle_request(&context, request).await;
        assert!(!missing.ok);
        assert!(missing.error.expect("error").contains("17"));
    }

    #[tokio::test]
    async fn write_validates_phase_and_updates_shape() {
        let home = TempDir::new().expect("home");
        let context = test_context(home.path());
        let project = context
            .store
            .create_project("apollo", None)
            .expect("project");

        let mut request = DaemonRequest::new("write");
        request.project = Some(project.name.clone());
        request.phase = Some("shipping".to_string());
        request.updates = Some(json!({"status": "active"}));
        let bad_phase = handle_request(&context, request).await;
        assert!(!bad_phase.ok);

        let mut request = DaemonRequest::new("write");
        request.project = Some(project.name.clone());
        request.phase = Some("implementation".to_string());
        request.updates = Some(json!(["status"]));
        let bad_updates = handle_request(&context, request).await;
        assert!(!bad_updates.ok);

        // Valid shape; the phase has no backing file, so this is a no-op.
        let mut request = DaemonRequest::new("write");
        request.project = Some(project.name);
        request.phase = Some("implementation".to_string());
        request.updates = Some(json!({"status": "active"}));
        let ok = handle_request(&context, request).await;
        assert!(ok.ok);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let home = TempDir::new().expect("home");
        let context = test_context(home.path());

        let response = handle_request(&context, DaemonRequest::new("frobnicate")).await;
        assert!(!response.ok);
        assert!(response.error.expect("error").contains("frobnicate"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runtime_serves_the_socket_until_stopped() {
        let home = TempDir::new().expect("home");
        let home_path = home.path().to_path_buf();

        let daemon = tokio::spawn(run(home_path.clone()));

        let socket = socket_path(&home_path);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while !socket.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(socket.exists(), "daemon never bound its socket");

        let status_home = home_path.clone();
        let status = tokio::task::spawn_blocking(move || {
            crate::protocol::request_status(&status_home)
        })
        .await
        .expect("join")
        .expect("status");
        assert_eq!(status["running"], json!(true));

        let stop_home = home_path.clone();
        tokio::task::spawn_blocking(move || crate::protocol::request_stop(&stop_home))
            .await
            .expect("join")
            .expect("stop");

        tokio::time::timeout(Duration::from_secs(3), daemon)
            .await
            .expect("daemon did not shut down")
            .expect("join")
            .expect("runtime error");
    }
}
