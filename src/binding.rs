//! Query-string binding.
//!
//! Fields are declared at the call site, one descriptor per field: its
//! query name, its target type, and whether it is required. Every field is
//! attempted; failures are collected and reported together by
//! [`QueryBinder::finish`].
//!
//! ```rust
//! use std::time::Duration;
//! # fn handle(ctx: &tern::Context) -> Result<(), tern::Error> {
//! let mut q = ctx.query_binder();
//! let term = q.required::<String>("q");
//! let page = q.optional::<u32>("page").unwrap_or(1);
//! let tags = q.optional::<Vec<String>>("tags").unwrap_or_default();
//! let wait = q.optional::<Duration>("wait");
//! q.finish()?;
//! # let _ = (term, page, tags, wait);
//! # Ok(())
//! # }
//! ```
//!
//! Supported targets: `String`, `bool`, all integer and float primitives,
//! [`Duration`] (`300ms`, `1h30m`, …) and `Vec<T>` of any of those, parsed
//! from a comma-separated list. Implement [`FromQueryValue`] for more.

use std::time::Duration;

use crate::error::Error;

/// Parses one raw query value into `Self`.
pub trait FromQueryValue: Sized {
    /// On failure, returns a message naming the value and the expected type.
    fn from_query_value(raw: &str) -> Result<Self, String>;
}

impl FromQueryValue for String {
    fn from_query_value(raw: &str) -> Result<Self, String> {
        Ok(raw.to_owned())
    }
}

impl FromQueryValue for bool {
    fn from_query_value(raw: &str) -> Result<Self, String> {
        match raw {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(format!("cannot convert '{raw}' to bool: invalid syntax")),
        }
    }
}

macro_rules! from_str_values {
    ($kind:literal => $($ty:ty),+) => {$(
        impl FromQueryValue for $ty {
            fn from_query_value(raw: &str) -> Result<Self, String> {
                raw.parse()
                    .map_err(|e| format!("cannot convert '{raw}' to {}: {e}", $kind))
            }
        }
    )+};
}

from_str_values!("int" => i8, i16, i32, i64, i128, isize);
from_str_values!("uint" => u8, u16, u32, u64, u128, usize);
from_str_values!("float" => f32, f64);

impl FromQueryValue for Duration {
    fn from_query_value(raw: &str) -> Result<Self, String> {
        parse_duration(raw).map_err(|e| format!("cannot convert '{raw}' to duration: {e}"))
    }
}

/// Comma-separated list; each element is trimmed before parsing.
impl<T: FromQueryValue> FromQueryValue for Vec<T> {
    fn from_query_value(raw: &str) -> Result<Self, String> {
        raw.split(',')
            .map(|item| T::from_query_value(item.trim()))
            .collect()
    }
}

/// Binds query values field by field, collecting every failure.
#[derive(Debug)]
pub struct QueryBinder {
    pairs: Vec<(String, String)>,
    errors: Vec<String>,
}

impl QueryBinder {
    pub(crate) fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs, errors: Vec::new() }
    }

    /// Binds a field that must be present and non-empty.
    pub fn required<T: FromQueryValue>(&mut self, name: &str) -> Option<T> {
        self.bind(name, true)
    }

    /// Binds a field that may be absent. Empty values count as absent.
    pub fn optional<T: FromQueryValue>(&mut self, name: &str) -> Option<T> {
        self.bind(name, false)
    }

    /// Fails with every field error recorded so far.
    pub fn finish(self) -> Result<(), Error> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Binding(self.errors))
        }
    }

    fn bind<T: FromQueryValue>(&mut self, name: &str, required: bool) -> Option<T> {
        let raw = self
            .pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty());

        let Some(raw) = raw else {
            if required {
                self.errors.push(format!("required query parameter {name} missing"));
            }
            return None;
        };

        match T::from_query_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(format!("parameter {name}: {e}"));
                None
            }
        }
    }
}

/// Parses durations like `1.5h`, `300ms` or `2h45m`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is allowed;
/// any other number needs a unit. Negative durations are rejected.
fn parse_duration(input: &str) -> Result<Duration, &'static str> {
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest.starts_with('-') {
        return Err("negative duration");
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err("invalid duration");
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err("invalid duration");
        }
        let value: f64 = number.parse().map_err(|_| "invalid duration")?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err("missing unit in duration"),
            _ => return Err("unknown unit in duration"),
        };

        nanos += value * scale;
        rest = tail;
    }

    if nanos > u64::MAX as f64 {
        return Err("invalid duration");
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}
