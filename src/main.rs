mod calc;
mod db;
mod ipc;
mod logging;
mod payload;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Workspace to open at startup, so hosts can skip `workspace.select`.
const WORKSPACE_ENV: &str = "GRADECALCD_WORKSPACE";

fn main() {
    if let Err(e) = logging::init_tracing() {
        eprintln!("gradecalcd: logging disabled: {e}");
    }

    let mut state = ipc::AppState::detached();

    if let Some(path) = std::env::var_os(WORKSPACE_ENV).map(PathBuf::from) {
        match db::open_db(&path) {
            Ok(conn) => {
                tracing::info!(workspace = %path.display(), "workspace opened from environment");
                state.attach(path, conn);
            }
            Err(e) => tracing::warn!(workspace = %path.display(), error = %e, "workspace open failed"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed; shutting down");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::debug!(error = %e, "unparseable request line");
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", reply);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
