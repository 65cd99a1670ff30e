use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One line of stdin: `{id, method, params}`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Sidecar session. Calculations work without a workspace; settings and
/// stored GPA scales need one.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    pub fn detached() -> Self {
        Self {
            workspace: None,
            db: None,
        }
    }

    /// Switch to `path`, replacing any previously opened database.
    pub fn attach(&mut self, path: PathBuf, conn: Connection) {
        self.workspace = Some(path);
        self.db = Some(conn);
    }

    pub fn workspace_display(&self) -> Option<String> {
        self.workspace
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }
}
