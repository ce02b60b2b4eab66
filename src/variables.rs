//! Template variable expansion for per-call argument variation.
//!
//! [`VariableExpander`] resolves `{{...}}` placeholders inside arbitrarily
//! nested argument structures so repeated invocations are not byte-identical.
//! Recognized placeholders:
//!
//! - `{{timestamp}}` -- current wall-clock time as f64 seconds since epoch
//! - `{{counter}}` -- shared monotonic counter, first resolution yields 1
//! - `{{random.randint(min,max)}}` -- uniform draw from the inclusive range
//!
//! A string consisting of exactly one placeholder resolves to the native
//! value (number types are preserved); placeholders embedded in longer
//! strings are inlined as text. Unrecognized names degrade to a literal
//! `{{unknown:<name>}}` marker so the run continues; only malformed
//! `random.*` expressions are fatal.
//!
//! The counter is shared across every worker for the lifetime of the
//! expander, so counter values observed by the server are globally unique
//! within a run.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::RngExt;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::TemplateError;

/// Resolves template placeholders inside nested argument structures.
///
/// Cheap to share: all per-run state is one atomic counter. The compiled
/// patterns are built once in [`new`](Self::new).
pub struct VariableExpander {
    counter: AtomicU64,
    pattern: Regex,
    exact: Regex,
    randint: Regex,
}

impl VariableExpander {
    /// Creates an expander with the counter at zero.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            pattern: Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern is valid"),
            exact: Regex::new(r"^\{\{([^{}]+)\}\}$").expect("exact pattern is valid"),
            randint: Regex::new(r"^random\.randint\((\d+),(\d+)\)$").expect("randint pattern is valid"),
        }
    }

    /// Expands a full argument template.
    ///
    /// A `null` (absent) template expands to an empty map; everything else is
    /// expanded structurally via [`expand`](Self::expand).
    pub fn expand_arguments(&self, args: &Value) -> Result<Value, TemplateError> {
        match args {
            Value::Null => Ok(Value::Object(Map::new())),
            other => self.expand(other),
        }
    }

    /// Recursively expands placeholders in a value.
    ///
    /// Maps keep all keys and expand values in insertion order; arrays keep
    /// element order; strings resolve per the type-preservation rule;
    /// other scalars pass through unchanged. Expansion is depth-first and
    /// left-to-right, so counter consumption is deterministic.
    pub fn expand(&self, value: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, val) in map {
                    out.insert(key.clone(), self.expand(val)?);
                }
                Ok(Value::Object(out))
            },
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.expand(item)?);
                }
                Ok(Value::Array(out))
            },
            Value::String(text) => self.expand_string(text),
            other => Ok(other.clone()),
        }
    }

    /// Checks every `random.*` expression in a template without consuming
    /// counter or randomness state.
    ///
    /// The orchestrator runs this before spawning workers so a malformed
    /// template aborts the run instead of corrupting samples mid-flight.
    pub fn validate(&self, value: &Value) -> Result<(), TemplateError> {
        match value {
            Value::Object(map) => map.values().try_for_each(|v| self.validate(v)),
            Value::Array(items) => items.iter().try_for_each(|v| self.validate(v)),
            Value::String(text) => {
                for body in self.placeholder_bodies(text) {
                    if body.starts_with("random.") {
                        self.parse_randint_bounds(body)?;
                    }
                }
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// Resets the shared counter so the next `{{counter}}` yields 1 again.
    pub fn reset_counter(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    /// Expands a single string per the type-preservation rule.
    fn expand_string(&self, text: &str) -> Result<Value, TemplateError> {
        if let Some(caps) = self.exact.captures(text) {
            return self.resolve(caps[1].trim());
        }

        if !self.pattern.is_match(text) {
            return Ok(Value::String(text.to_string()));
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.pattern.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            // Strip the {{ }} delimiters to get the placeholder body.
            let body = text[m.start() + 2..m.end() - 2].trim();
            let resolved = self.resolve(body)?;
            out.push_str(&value_to_text(&resolved));
            last = m.end();
        }
        out.push_str(&text[last..]);
        Ok(Value::String(out))
    }

    /// Resolves one trimmed placeholder body to its native value.
    fn resolve(&self, name: &str) -> Result<Value, TemplateError> {
        if name == "timestamp" {
            return Ok(epoch_seconds_value());
        }
        if name == "counter" {
            let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(Value::from(next));
        }
        if name.starts_with("random.") {
            let (min, max) = self.parse_randint_bounds(name)?;
            let drawn = rand::rng().random_range(min..=max);
            return Ok(Value::from(drawn));
        }
        Ok(Value::String(format!("{{{{unknown:{name}}}}}")))
    }

    /// Parses `random.randint(min,max)` bounds without drawing.
    ///
    /// Anything under the `random.` namespace that is not a well-formed
    /// randint call is a fatal template error.
    fn parse_randint_bounds(&self, expr: &str) -> Result<(u64, u64), TemplateError> {
        let caps = self
            .randint
            .captures(expr)
            .ok_or_else(|| TemplateError::InvalidRandint {
                expr: expr.to_string(),
            })?;
        let min: u64 = caps[1].parse().map_err(|_| TemplateError::InvalidRandint {
            expr: expr.to_string(),
        })?;
        let max: u64 = caps[2].parse().map_err(|_| TemplateError::InvalidRandint {
            expr: expr.to_string(),
        })?;
        if min > max {
            return Err(TemplateError::EmptyRange {
                expr: expr.to_string(),
            });
        }
        Ok((min, max))
    }

    /// Iterates the trimmed bodies of every placeholder in a string.
    fn placeholder_bodies<'t>(&'t self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.pattern
            .find_iter(text)
            .map(|m| text[m.start() + 2..m.end() - 2].trim())
    }
}

impl Default for VariableExpander {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time as an f64 seconds-since-epoch JSON number.
fn epoch_seconds_value() -> Value {
    let secs = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    Value::from(secs)
}

/// Textual form of a resolved value for inline substitution.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
