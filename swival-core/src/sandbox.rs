//! Overlay sandbox re-exec contract.
//!
//! The overlay filesystem itself is an external collaborator; this module
//! only derives the session ID and re-execs the process under the overlay
//! helper when `--sandbox` is requested. The marker environment variable
//! stops the re-exec from recursing.

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Set on the re-exec'd child so it knows it is already inside the overlay.
pub const SANDBOXED_ENV: &str = "SWIVAL_SANDBOXED";

/// Deterministic, collision-resistant session ID for overlay reuse:
/// sha-256 of the canonical project path, first 16 hex characters.
pub fn derive_session_id(project_dir: &Path) -> String {
    let canonical = dunce::canonicalize(project_dir)
        .unwrap_or_else(|_| project_dir.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let hex: String = digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("swival-{hex}")
}

/// Whether this process is already running inside the overlay.
pub fn inside_sandbox() -> bool {
    std::env::var_os(SANDBOXED_ENV).is_some()
}

/// Strict-read depends on overlay tracking that is not available in this
/// build; requesting it is a configuration error with a way out.
pub fn reject_strict_read() -> Result<()> {
    bail!(
        "--sandbox-strict-read requires overlay read tracking, which this build \
         does not include; drop the flag or run without --sandbox-strict-read"
    )
}

/// Re-exec the current binary under the `agentfs` helper. Only returns on
/// failure to launch; on Unix the exec replaces the process image.
pub fn reexec_under_overlay(session_id: &str) -> Result<()> {
    let helper = which::which("agentfs").context(
        "--sandbox agentfs requires the `agentfs` helper on PATH; install it or drop --sandbox",
    )?;
    let current = std::env::current_exe().context("cannot determine current executable")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut command = std::process::Command::new(helper);
    command
        .arg("run")
        .arg("--session")
        .arg(session_id)
        .arg("--")
        .arg(current)
        .args(args)
        .env(SANDBOXED_ENV, "1");

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = command.exec();
        bail!("failed to re-exec under agentfs: {err}");
    }
    #[cfg(not(unix))]
    {
        let status = command.status().context("failed to launch agentfs")?;
        std::process::exit(status.code().unwrap_or(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn session_id_is_stable_and_distinct() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let id_a = derive_session_id(a.path());
        assert_eq!(id_a, derive_session_id(a.path()));
        assert_ne!(id_a, derive_session_id(b.path()));
        assert!(id_a.starts_with("swival-"));
        assert_eq!(id_a.len(), "swival-".len() + 16);
    }
}
