use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "ledgerdash-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "LEDGERDASH_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "LEDGERDASH_TIME_CONFIG";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT_SHORT: &str = "%H:%M";
const TIME_FORMAT_LONG: &str =
  "%H:%M:%S";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Source of "now" for due-time
/// comparisons.
pub trait Clock: Send + Sync {
  fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the configured zone,
/// or the system zone when none is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> NaiveDateTime {
    match display_timezone() {
      | Some(tz) => {
        Utc::now()
          .with_timezone(tz)
          .naive_local()
      }
      | None => {
        Local::now().naive_local()
      }
    }
  }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<NaiveDateTime>
}

impl ManualClock {
  pub fn new(
    now: NaiveDateTime
  ) -> Self {
    Self {
      now: Mutex::new(now)
    }
  }

  pub fn set(
    &self,
    now: NaiveDateTime
  ) {
    *self.now.lock() = now;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> NaiveDateTime {
    *self.now.lock()
  }
}

pub fn display_timezone()
-> Option<&'static Tz> {
  static DISPLAY_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  DISPLAY_TZ
    .get_or_init(
      resolve_display_timezone
    )
    .as_ref()
}

fn resolve_display_timezone()
-> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
  {
    return Some(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return Some(tz);
  }

  tracing::debug!(
    "no timezone configured; using \
     system local time"
  );
  None
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "resolved display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone; ignoring"
      );
      None
    }
  }
}

/// Parses an ISO 8601 calendar date
/// (`YYYY-MM-DD`).
pub fn parse_reminder_date(
  raw: &str
) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(
    raw.trim(),
    DATE_FORMAT
  )
  .ok()
}

/// Parses an ISO 8601 time of day,
/// with or without seconds.
pub fn parse_reminder_time(
  raw: &str
) -> Option<NaiveTime> {
  let trimmed = raw.trim();
  NaiveTime::parse_from_str(
    trimmed,
    TIME_FORMAT_LONG
  )
  .or_else(|_| {
    NaiveTime::parse_from_str(
      trimmed,
      TIME_FORMAT_SHORT
    )
  })
  .ok()
}

#[must_use]
pub fn format_reminder_time(
  time: NaiveTime
) -> String {
  if time.second() == 0 {
    time
      .format(TIME_FORMAT_SHORT)
      .to_string()
  } else {
    time
      .format(TIME_FORMAT_LONG)
      .to_string()
  }
}

#[must_use]
pub fn format_due(
  due: NaiveDateTime
) -> String {
  due
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

pub mod reminder_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &date
        .format(super::DATE_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_reminder_date(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid date: {raw}"
          )
        )
      })
  }
}

pub mod reminder_time_serde {
  use chrono::NaiveTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    time: &NaiveTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_reminder_time(
        *time
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_reminder_time(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid time: {raw}"
          )
        )
      })
  }
}
