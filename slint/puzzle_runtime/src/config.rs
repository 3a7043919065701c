use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;

pub const TRANSPORT_VAR: &str = "PUZZLE_TRANSPORT";
pub const OUTBOUND_QUEUE_CAP_VAR: &str = "PUZZLE_OUTBOUND_QUEUE_CAP";
pub const BUNDLE_DIR_VAR: &str = "PUZZLE_BUNDLE_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Length-prefixed frames on stdout.
    #[default]
    Stdio,
    /// In-process [`crate::DevHost`].
    Dev,
    /// No host at all; messages are logged and dropped.
    None,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportMode::Stdio),
            "dev" => Ok(TransportMode::Dev),
            "none" => Ok(TransportMode::None),
            other => Err(format!("unknown transport mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub transport: TransportMode,
    pub outbound_queue_cap: usize,
    pub bundle_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            bundle_dir: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let transport = match lookup(TRANSPORT_VAR) {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!("{err}; using stdio transport");
                TransportMode::default()
            }),
            None => TransportMode::default(),
        };

        let outbound_queue_cap = lookup(OUTBOUND_QUEUE_CAP_VAR)
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAP);

        let bundle_dir = lookup(BUNDLE_DIR_VAR)
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Self {
            transport,
            outbound_queue_cap,
            bundle_dir,
        }
    }
}
