//! Helpers for reading settings out of a key/value source.
//!
//! Configuration structs take a lookup function instead of reading
//! `std::env` directly so they can be built from a fixed map in tests.
//! Values are trimmed; an empty value counts as missing.

use std::str::FromStr;

use crate::error::ConfigError;

/// Look up `var` and fail if it is unset or blank.
pub fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

/// Look up `var`, returning `None` if it is unset or blank.
pub fn optional<F>(lookup: &F, var: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a required value.
pub fn required_parsed<F, T>(lookup: &F, var: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse(var, required(lookup, var)?)
}

/// Parse an optional value, falling back to `default` when unset.
pub fn parsed_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, var) {
        Some(value) => parse(var, value),
        None => Ok(default),
    }
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

/// Lookup backed by the process environment.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn required_trims_value() {
        let lookup = source(&[("URL", "  http://zabbix/ \n")]);
        assert_eq!(required(&lookup, "URL").unwrap(), "http://zabbix/");
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let lookup = source(&[("URL", "   ")]);
        assert_matches!(required(&lookup, "URL"), Err(ConfigError::Missing("URL")));
    }

    #[test]
    fn parse_failure_reports_var_and_value() {
        let lookup = source(&[("TIMEOUT", "soon")]);
        let err = required_parsed::<_, u64>(&lookup, "TIMEOUT").unwrap_err();
        assert_matches!(&err, ConfigError::Invalid { var: "TIMEOUT", value, .. } if value == "soon");
    }

    #[test]
    fn parsed_or_uses_default_when_unset() {
        let lookup = source(&[]);
        assert_eq!(parsed_or(&lookup, "ATTEMPTS", 3u32).unwrap(), 3);
    }
}
