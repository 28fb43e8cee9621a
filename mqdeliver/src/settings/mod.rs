use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use config::{Config, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::database::MessageDatabase;
use crate::role::{BrokerRole, ClientRole, RoleAdapter};
use crate::types::{Limits, RoleKind, MAX_QUEUED_DEFAULT, RECEIVE_MAXIMUM_DEFAULT, RETRY_INTERVAL_DEFAULT};
use crate::utils::deserialize_duration;

pub use self::log::Log;

pub mod log;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub delivery: Delivery,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Reads `mqdeliver.toml` from the working directory, then `cfg_name` if
    /// given, then `MQDELIVER_*` environment variables, e.g.
    /// `MQDELIVER_DELIVERY__RECEIVE_MAXIMUM=20`.
    pub fn new(cfg_name: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::with_name("mqdeliver").required(false));
        if let Some(cfg) = cfg_name {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }
        builder = builder
            .add_source(config::Environment::with_prefix("mqdeliver").separator("__").try_parsing(true));

        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }

    #[inline]
    pub fn instance() -> Result<&'static Self> {
        SETTINGS.get().ok_or_else(|| anyhow!("Settings not initialized"))
    }

    #[inline]
    pub fn init(cfg_name: Option<&str>) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(cfg_name)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() -> Result<()> {
        let cfg = Self::instance()?;
        ::log::debug!("Config info is {:?}", cfg.0);
        ::log::info!("role is {:?}", cfg.delivery.role);
        ::log::info!("receive_maximum is {}", cfg.delivery.receive_maximum);
        ::log::info!("max_queued_messages is {}", cfg.delivery.max_queued_messages);
        ::log::info!("retry_interval is {:?}", cfg.delivery.retry_interval);
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self(Arc::new(Inner { log: Log::default(), delivery: Delivery::default() }))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub role: RoleKind,
    #[serde(default = "Delivery::receive_maximum_default")]
    pub receive_maximum: u16,
    #[serde(default = "Delivery::max_queued_messages_default")]
    pub max_queued_messages: usize,
    #[serde(default = "Delivery::retry_interval_default", deserialize_with = "deserialize_duration")]
    pub retry_interval: Duration,
}

impl Default for Delivery {
    #[inline]
    fn default() -> Self {
        Self {
            role: RoleKind::default(),
            receive_maximum: Self::receive_maximum_default(),
            max_queued_messages: Self::max_queued_messages_default(),
            retry_interval: Self::retry_interval_default(),
        }
    }
}

impl Delivery {
    #[inline]
    fn receive_maximum_default() -> u16 {
        RECEIVE_MAXIMUM_DEFAULT
    }
    #[inline]
    fn max_queued_messages_default() -> usize {
        MAX_QUEUED_DEFAULT
    }
    #[inline]
    fn retry_interval_default() -> Duration {
        RETRY_INTERVAL_DEFAULT
    }
    #[inline]
    pub fn limits(&self) -> Limits {
        Limits::new(self.receive_maximum, self.max_queued_messages)
    }

    /// Role adapter for the configured role. A broker keeps its records in
    /// `db`; a client role is created per connection and ignores it. Limits
    /// come from the session the adapter serves, see `Session::from_settings`.
    pub fn role_adapter(&self, db: Arc<dyn MessageDatabase>) -> Arc<dyn RoleAdapter> {
        match self.role {
            RoleKind::Broker => Arc::new(BrokerRole::new(db)),
            RoleKind::Client => Arc::new(ClientRole::new()),
        }
    }
}
