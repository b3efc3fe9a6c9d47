//! Runtime diagnostics served under `/pprof/`.
//!
//! One handler serves the whole tree: `/pprof/` is the index and
//! `/pprof/{profile}` a named profile.
//!
//! Profiles:
//! - `profile`: CPU profile over `?seconds=N`, rendered as a flamegraph SVG
//! - `cmdline`: process arguments, NUL separated
//! - `runtime`: tokio runtime counters as JSON
//! - `status`: `/proc/self/status` (Linux only)
//! - `threads`: thread count and process ID as JSON

use std::time::Duration;

use axum::{
    extract::Query,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Sampling window when `seconds` is not given.
pub const DEFAULT_PROFILE_SECONDS: u64 = 10;

/// Longest sampling window accepted.
pub const MAX_PROFILE_SECONDS: u64 = 300;

/// Samples per second taken by the CPU profiler.
const PROFILE_FREQUENCY: i32 = 99;

/// Profile names in the order the index lists them.
pub const PROFILES: &[(&str, &str)] = &[
    ("profile", "CPU profile as a flamegraph SVG, sampled for ?seconds=N"),
    ("cmdline", "The command line of the running process"),
    ("runtime", "Async runtime worker and task counters"),
    ("status", "Kernel view of process memory and scheduling"),
    ("threads", "OS thread count of the process"),
];

#[derive(Serialize)]
pub(crate) struct ProfileEntry {
    name: &'static str,
    path: String,
    description: &'static str,
}

/// Query parameters of a profile request.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProfileParams {
    seconds: Option<u64>,
}

#[derive(Serialize)]
struct RuntimeProfile {
    workers: usize,
    alive_tasks: usize,
    global_queue_depth: usize,
}

#[derive(Serialize)]
struct ThreadsProfile {
    pid: u32,
    threads: Option<usize>,
}

/// `GET /pprof/` and `GET /pprof/{profile}`, keyed on the last path segment.
pub(crate) async fn serve(uri: Uri, Query(params): Query<ProfileParams>) -> Response {
    let name = uri.path().rsplit('/').next().unwrap_or_default();
    match name {
        "" => index().into_response(),
        "profile" => cpu_profile(params.seconds).await,
        _ => profile(name),
    }
}

fn index() -> Json<Vec<ProfileEntry>> {
    Json(
        PROFILES
            .iter()
            .map(|&(name, description)| ProfileEntry {
                name,
                path: format!("/pprof/{name}"),
                description,
            })
            .collect(),
    )
}

async fn cpu_profile(seconds: Option<u64>) -> Response {
    let seconds = seconds.unwrap_or(DEFAULT_PROFILE_SECONDS);
    if seconds == 0 || seconds > MAX_PROFILE_SECONDS {
        return (
            StatusCode::BAD_REQUEST,
            format!("seconds must be between 1 and {MAX_PROFILE_SECONDS}"),
        )
            .into_response();
    }

    // The sampler blocks for the whole window.
    let sampled = tokio::task::spawn_blocking(move || flamegraph(Duration::from_secs(seconds))).await;
    match sampled {
        Ok(Ok(svg)) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, seconds, "CPU profile failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("cpu profile failed: {e}")).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "CPU profile task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "cpu profile failed").into_response()
        }
    }
}

fn flamegraph(window: Duration) -> Result<Vec<u8>, pprof::Error> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(PROFILE_FREQUENCY)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()?;
    std::thread::sleep(window);

    let report = guard.report().build()?;
    let mut svg = Vec::new();
    report.flamegraph(&mut svg)?;
    Ok(svg)
}

fn profile(name: &str) -> Response {
    match name {
        "cmdline" => {
            let args: Vec<String> = std::env::args().collect();
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                args.join("\0"),
            )
                .into_response()
        }
        "runtime" => {
            let metrics = tokio::runtime::Handle::current().metrics();
            Json(RuntimeProfile {
                workers: metrics.num_workers(),
                alive_tasks: metrics.num_alive_tasks(),
                global_queue_depth: metrics.global_queue_depth(),
            })
            .into_response()
        }
        "status" => match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => status.into_response(),
            Err(e) => (StatusCode::NOT_IMPLEMENTED, format!("status profile unavailable: {e}")).into_response(),
        },
        "threads" => Json(ThreadsProfile {
            pid: std::process::id(),
            threads: thread_count(),
        })
        .into_response(),
        _ => (StatusCode::NOT_FOUND, format!("unknown profile: {name}")).into_response(),
    }
}

fn thread_count() -> Option<usize> {
    std::fs::read_dir("/proc/self/task").ok().map(|dir| dir.count())
}
