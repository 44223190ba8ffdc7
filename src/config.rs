//! User configuration.
//!
//! Stored as TOML in `config.toml` under [`BeamConfig::config_dir`].
//!
//! A missing file means defaults. `BEAM_MODE`, `BEAM_RELAY_ENDPOINT` and
//! `BEAM_RELAY_TOKEN` override what the file says.

use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    channel::tcp::{TcpConfig, DEFAULT_MAX_FRAME_LEN},
    mode::{SessionMode, DEFAULT_RELAY_RECOMMEND_MAX_BYTES},
    relay::RelayConfig,
    BeamError, Result,
};

const APP_DIR: &str = "beam";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BeamConfig {
    pub default_mode: SessionMode,
    /// Where received files go when no directory is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_out_dir: Option<PathBuf>,
    pub relay: RelaySection,
    pub direct: DirectSection,
    pub advisory: AdvisorySection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_token: Option<String>,
    pub upload_attempts: u32,
    pub recommend_max_bytes: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            endpoint: None,
            upload_token: None,
            upload_attempts: 1,
            recommend_max_bytes: DEFAULT_RELAY_RECOMMEND_MAX_BYTES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectSection {
    pub bind: String,
    /// Host put into the session host id instead of the bound address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise: Option<String>,
    /// Largest frame accepted from a peer.
    pub max_frame_bytes: u64,
}

impl Default for DirectSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:0".to_string(),
            advertise: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorySection {
    pub timeout_ms: u64,
}

impl Default for AdvisorySection {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

impl BeamConfig {
    /// `$XDG_CONFIG_HOME/beam`, else `$HOME/.config/beam`, else
    /// `%APPDATA%\beam`.
    pub fn config_dir() -> Result<PathBuf> {
        let base = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                env::var_os("HOME")
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .or_else(|| env::var_os("APPDATA").map(PathBuf::from))
            .ok_or_else(|| {
                BeamError::Config(
                    "no XDG_CONFIG_HOME, HOME or APPDATA to keep config in"
                        .to_string(),
                )
            })?;
        Ok(base.join(APP_DIR))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Reads the user's config file and applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Self::config_file()?)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Reads `path`, or returns defaults when it does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            BeamError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_file()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    BeamError::Config(format!(
                        "failed to create {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            BeamError::Config(format!(
                "failed to write {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies `BEAM_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("BEAM_MODE") {
            self.default_mode = mode.parse()?;
        }
        if let Some(endpoint) = lookup("BEAM_RELAY_ENDPOINT") {
            self.relay.endpoint = Some(Url::parse(&endpoint)?);
        }
        if let Some(token) = lookup("BEAM_RELAY_TOKEN") {
            self.relay.upload_token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_mode == SessionMode::Relay
            && self.relay.endpoint.is_none()
        {
            return Err(BeamError::Config(
                "relay mode needs relay.endpoint".to_string(),
            ));
        }
        if self.relay.upload_attempts == 0 {
            return Err(BeamError::Config(
                "relay.upload_attempts must be at least 1".to_string(),
            ));
        }
        self.direct.bind.parse::<SocketAddr>().map_err(|e| {
            BeamError::Config(format!(
                "direct.bind {:?} is not an address: {}",
                self.direct.bind, e
            ))
        })?;
        if self.direct.max_frame_bytes == 0 {
            return Err(BeamError::Config(
                "direct.max_frame_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            max_frame_len: self.direct.max_frame_bytes,
            ..TcpConfig::default()
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            upload_attempts: self.relay.upload_attempts,
        }
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory.timeout_ms)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.default_out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
