use std::ops::Deref;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(default = "Log::to_default")]
    pub to: To,
    #[serde(default = "Log::level_default")]
    pub level: Level,
    #[serde(default = "Log::dir_default")]
    pub dir: String,
    #[serde(default = "Log::file_default")]
    pub file: String,
}

impl Default for Log {
    #[inline]
    fn default() -> Self {
        Self {
            to: Self::to_default(),
            level: Self::level_default(),
            dir: Self::dir_default(),
            file: Self::file_default(),
        }
    }
}

impl Log {
    #[inline]
    fn to_default() -> To {
        To::Console
    }
    #[inline]
    fn level_default() -> Level {
        Level { inner: slog::Level::Info }
    }
    #[inline]
    fn dir_default() -> String {
        "/var/log/mqdeliver".into()
    }
    #[inline]
    fn file_default() -> String {
        "mqdeliver.log".into()
    }
    #[inline]
    pub fn filename(&self) -> String {
        let file = &self.file;
        if file.is_empty() {
            return "".into();
        }
        if self.dir.is_empty() {
            return file.to_owned();
        }
        let dir = self.dir.trim_end_matches(['/', '\\']);
        format!("{}/{}", dir, file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum To {
    Off,
    File,
    Console,
    Both,
}

impl To {
    #[inline]
    pub fn file(&self) -> bool {
        matches!(self, To::Both | To::File)
    }
    #[inline]
    pub fn console(&self) -> bool {
        matches!(self, To::Both | To::Console)
    }
    #[inline]
    pub fn off(&self) -> bool {
        matches!(self, To::Off)
    }
}

impl<'de> Deserialize<'de> for To {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        const VARIANTS: &[&str] = &["off", "file", "console", "both"];
        let to = String::deserialize(deserializer)?;
        match to.to_ascii_lowercase().as_str() {
            "off" => Ok(To::Off),
            "file" => Ok(To::File),
            "console" => Ok(To::Console),
            "both" => Ok(To::Both),
            _ => Err(de::Error::unknown_variant(&to, VARIANTS)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Level {
    inner: slog::Level,
}

impl Level {
    #[inline]
    pub fn inner(&self) -> slog::Level {
        self.inner
    }
}

impl Deref for Level {
    type Target = slog::Level;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'de> Deserialize<'de> for Level {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level = String::deserialize(deserializer)?;
        let level = slog::Level::from_str(&level)
            .map_err(|_| de::Error::custom(format!("invalid log level '{}'", level)))?;
        Ok(Level { inner: level })
    }
}
