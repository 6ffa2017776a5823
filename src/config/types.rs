use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

// -----------------------------------------------------------------------------
// ----- LogLevel --------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Durations -------------------------------------------------------------

/// Human readable durations ("5s", "10m", "1h 30m").
pub(crate) fn de_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Unexpected, Visitor};
    use std::fmt;

    struct HumanVisitor;

    impl<'de> Visitor<'de> for HumanVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration such as \"5s\" or \"10m\"")
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            humantime::parse_duration(v).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_str(HumanVisitor)
}

// -----------------------------------------------------------------------------
// ----- Secrets ---------------------------------------------------------------

pub(crate) fn de_secret<'de, D>(d: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    Ok(SecretString::new(raw.into_boxed_str()))
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
