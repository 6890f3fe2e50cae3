use std::env;
use std::path::PathBuf;
use std::sync::{LazyLock, Mutex};

pub struct Paths {
    pub tmp_path: PathBuf,
}

impl Paths {
    /// Returns the directory where the binary writes its log files when no
    /// explicit log file is configured.
    pub fn log_dir(&self) -> PathBuf {
        self.tmp_path.join("logs")
    }
}

impl Default for Paths {
    fn default() -> Self {
        let tmpdir: PathBuf = if cfg!(target_os = "macos") {
            PathBuf::from(env::var("HOME").unwrap_or("/".to_string()))
                .join("Library/Caches/flow-replay/")
        } else {
            env::temp_dir().join("flow-replay/")
        };
        Self {
            tmp_path: PathBuf::from(&tmpdir),
        }
    }
}

pub static FLOW_REPLAY_PATHS: LazyLock<Mutex<Paths>> =
    LazyLock::new(|| Mutex::new(Paths::default()));
