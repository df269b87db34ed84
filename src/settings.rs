//! Runtime configuration
//!
//! Everything configurable lives in one explicit [`Settings`] value that is loaded once and
//! passed to the components that need it. There is deliberately no process-wide configuration
//! state to reach for.

use std::error::Error;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// Whether the application talks to the server at all.
///
/// This is decided once, up front, from the configuration. Operations check it explicitly
/// instead of "trying the network and seeing what happens".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionMode {
    Online,
    Offline,
}

/// The configuration file contents
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the CalDAV server
    pub server_url: Url,
    pub username: String,
    pub password: String,

    /// When set, the server is never contacted and every operation works on the local snapshot
    /// only
    #[serde(default)]
    pub offline_mode: bool,

    /// Where the local task snapshot lives
    pub tasks_file: PathBuf,

    /// How often (in seconds) the periodic checks run: the recurrence tick and, when online, the
    /// background server refresh
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
}

fn default_check_interval() -> u64 {
    300
}

impl Settings {
    /// Load the configuration from a JSON file.
    ///
    /// Unlike the task snapshot, a broken configuration is a hard error: there is no sensible
    /// default for "which server should I talk to". Callers decide whether to prompt the user or
    /// to give up.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let file = std::fs::File::open(path)
            .map_err(|err| format!("Unable to open configuration file {:?}: {}", path, err))?;
        let settings = serde_json::from_reader(file)
            .map_err(|err| format!("Invalid configuration file {:?}: {}", path, err))?;
        Ok(settings)
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        if self.offline_mode {
            ConnectionMode::Offline
        } else {
            ConnectionMode::Online
        }
    }
}
