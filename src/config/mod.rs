use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

/// Key/value configuration loaded from `.tabexecrc` with environment
/// variables layered on top (environment wins).
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self {
            inner: map,
            config_path,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // ENV first
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "PYTHON_BIN",
        "CACHE_CAPACITY",
        "LISTEN_ADDR",
        "REQUEST_TIMEOUT",
        "PLOT_FORMAT",
        "EXEC_BASE_URL",
        "MAX_ATTEMPTS",
    ];

    KEYS.contains(&k) || k.starts_with("TABEXEC_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("tabexec").join(".tabexecrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("PYTHON_BIN".into(), "python3".into());
    m.insert("CACHE_CAPACITY".into(), "1".into());
    m.insert("LISTEN_ADDR".into(), "127.0.0.1:8731".into());
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("PLOT_FORMAT".into(), "png".into());
    m.insert("MAX_ATTEMPTS".into(), "5".into());

    m
}
