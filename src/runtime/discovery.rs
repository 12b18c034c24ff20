//! Engine socket discovery: a priority list of candidate sockets, tried in
//! order until one answers a ping. Kept as data, not code, per §9 — the
//! list below is the only place the priority order is expressed.

use std::path::PathBuf;

/// Candidate socket paths, most-specific (explicit override honoured
/// upstream) to least-specific (system Docker socket), matching the
/// rootless-Podman-first convention this runtime inherited.
pub fn candidate_sockets() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(format!("{}/podman/podman.sock", xdg_runtime_dir)));
    }

    candidates.push(PathBuf::from("/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));

    if let Ok(home) = std::env::var("HOME") {
        candidates.push(PathBuf::from(format!(
            "{}/.local/share/containers/podman/machine/podman.sock",
            home
        )));
    }

    candidates.push(PathBuf::from("/var/run/docker.sock"));

    candidates
}
