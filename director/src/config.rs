use std::path::PathBuf;
use std::time::Duration;

/// Timing knobs of the readiness gate and the backend supervisor.
#[derive(Debug, Clone)]
pub struct ProbeTiming {
    /// Bound on a single health probe
    pub timeout: Duration,
    /// Period of the re-probe task while the backend is not ready
    pub interval: Duration,
    /// Delay between seeing a startup sentinel and probing
    pub sentinel_delay: Duration,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(5),
            sentinel_delay: Duration::from_secs(2),
        }
    }
}

/// Timing knobs of the turn scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerTiming {
    /// How long a human turn waits before resolving as a skip
    pub human_turn_timeout: Duration,
    /// Pacing delay between rounds
    pub round_pause: Duration,
    /// Rounds used when a start request does not name a positive count
    pub default_rounds: u32,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            human_turn_timeout: Duration::from_secs(60),
            round_pause: Duration::from_millis(1000),
            default_rounds: 5,
        }
    }
}

/// How to launch the script backend.
#[derive(Debug, Clone)]
pub struct BackendLaunch {
    /// Interpreter or executable
    pub program: String,
    /// Arguments, usually the entry point script
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Port the backend must bind
    pub port: u16,
    /// Name of the environment variable the backend reads its port from
    pub port_env: String,
    /// Output fragments that announce the backend has begun listening
    pub sentinels: Vec<String>,
}

impl BackendLaunch {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the local proxy listens on
    pub port: u16,
    pub backend: BackendLaunch,
    pub probe: ProbeTiming,
    /// Bound on a forwarded API call
    pub forward_timeout: Duration,
    pub scheduler: SchedulerTiming,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let entry = env_str("BACKEND_ENTRY", "backg/electron_bridge.py");
        Ok(Self {
            port: env_parse("DIRECTOR_PORT", 8899)?,
            backend: BackendLaunch {
                program: env_str("BACKEND_PROGRAM", "python"),
                args: vec![absolute_from_cwd(&entry)],
                workdir: PathBuf::from(absolute_from_cwd(&env_str("BACKEND_WORKDIR", "backg"))),
                port: env_parse("BACKEND_PORT", 8900)?,
                port_env: env_str("BACKEND_PORT_ENV", "FLASK_PORT"),
                sentinels: env_csv(
                    "BACKEND_SENTINELS",
                    &["Electron Bridge", "Running on", "Press CTRL+C to quit"],
                ),
            },
            probe: ProbeTiming {
                timeout: Duration::from_secs(env_parse("PROBE_TIMEOUT_SECS", 5)?),
                interval: Duration::from_secs(env_parse("PROBE_INTERVAL_SECS", 5)?),
                sentinel_delay: Duration::from_secs(env_parse("SENTINEL_PROBE_DELAY_SECS", 2)?),
            },
            forward_timeout: Duration::from_secs(env_parse("FORWARD_TIMEOUT_SECS", 30)?),
            scheduler: SchedulerTiming {
                human_turn_timeout: Duration::from_secs(env_parse("HUMAN_TURN_TIMEOUT_SECS", 60)?),
                round_pause: Duration::from_millis(env_parse("ROUND_PAUSE_MS", 1000)?),
                default_rounds: env_parse("DEFAULT_ROUNDS", 5)?,
            },
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => parse_csv(&raw),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// The director may be launched from any directory; relative backend paths
/// are resolved against the directory it was started in.
fn absolute_from_cwd(path: &str) -> String {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return path.to_string_lossy().to_string();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
