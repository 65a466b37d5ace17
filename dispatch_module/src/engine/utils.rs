use chrono::{DateTime, Utc};
use std::str::FromStr;

use super::types::EngineError;

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, EngineError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_datetime(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn parse_enum<T>(value: &str) -> Result<T, EngineError>
where
    T: FromStr<Err = String>,
{
    T::from_str(value).map_err(EngineError::Storage)
}

pub(crate) fn parse_optional_enum<T>(value: Option<&str>) -> Result<Option<T>, EngineError>
where
    T: FromStr<Err = String>,
{
    match value {
        Some(raw) => Ok(Some(parse_enum(raw)?)),
        None => Ok(None),
    }
}
