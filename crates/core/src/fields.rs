//! Strict typed access to loosely-typed corpus objects.
//!
//! Corpus documents are plain JSON. A [`FieldReader`] wraps one JSON object
//! together with the scenario label and the object's path inside the
//! scenario, so every accessor can fail with a precise, field-qualified
//! [`CorpusError`]. Integer accessors reject floats and strings instead of
//! coercing them.

use crate::CorpusError;
use foxwhisper_types::ErrorCategory;
use serde_json::{Map, Value};

/// Typed view over one JSON object of a scenario.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    scenario: &'a str,
    path: String,
    object: &'a Map<String, Value>,
}

impl<'a> FieldReader<'a> {
    /// Wrap an object found at `path` (empty for the scenario root).
    pub fn new(scenario: &'a str, path: impl Into<String>, object: &'a Map<String, Value>) -> Self {
        Self {
            scenario,
            path: path.into(),
            object,
        }
    }

    /// Wrap a value that must be an object.
    pub fn from_value(
        scenario: &'a str,
        path: impl Into<String>,
        value: &'a Value,
    ) -> Result<Self, CorpusError> {
        let path = path.into();
        match value {
            Value::Object(object) => Ok(Self::new(scenario, path, object)),
            _ => Err(CorpusError::schema(
                scenario,
                format!("{} must be an object", display_path(&path)),
            )),
        }
    }

    /// Scenario label used in error messages.
    pub fn scenario(&self) -> &'a str {
        self.scenario
    }

    /// Path of this object inside the scenario.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The underlying JSON object.
    pub fn raw(&self) -> &'a Map<String, Value> {
        self.object
    }

    /// Build a schema error for this scenario.
    pub fn error(&self, detail: impl Into<String>) -> CorpusError {
        CorpusError::schema(self.scenario, detail)
    }

    /// Fully qualified name of a field of this object.
    pub fn field_name(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn type_error(&self, key: &str, expected: &str) -> CorpusError {
        self.error(format!("{} must be {}", self.field_name(key), expected))
    }

    fn missing(&self, key: &str) -> CorpusError {
        if self.path.is_empty() {
            self.error(format!("missing required field {key}"))
        } else {
            self.error(format!("{} missing {}", self.path, key))
        }
    }

    /// Whether the key is present (an explicit `null` counts as present).
    pub fn contains(&self, key: &str) -> bool {
        self.object.contains_key(key)
    }

    /// Get a value, treating `null` as absent.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.object.get(key).filter(|value| !value.is_null())
    }

    /// Get a value that must be present.
    pub fn require(&self, key: &str) -> Result<&'a Value, CorpusError> {
        self.object.get(key).ok_or_else(|| self.missing(key))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════════════

    /// Required string.
    pub fn str(&self, key: &str) -> Result<&'a str, CorpusError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| self.type_error(key, "a string"))
    }

    /// Required string that is non-empty after trimming.
    pub fn non_empty_str(&self, key: &str) -> Result<&'a str, CorpusError> {
        let value = self.str(key)?.trim();
        if value.is_empty() {
            return Err(self.type_error(key, "a non-empty string"));
        }
        Ok(value)
    }

    /// Optional string; absent or `null` yields `None`.
    pub fn opt_str(&self, key: &str) -> Result<Option<&'a str>, CorpusError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.type_error(key, "a string or null")),
        }
    }

    /// Required integer.
    pub fn i64(&self, key: &str) -> Result<i64, CorpusError> {
        let value = self.require(key)?;
        as_integer(value).ok_or_else(|| self.type_error(key, "an integer"))
    }

    /// Optional integer.
    pub fn opt_i64(&self, key: &str) -> Result<Option<i64>, CorpusError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => as_integer(value)
                .map(Some)
                .ok_or_else(|| self.type_error(key, "an integer")),
        }
    }

    /// Required non-negative integer.
    pub fn u64(&self, key: &str) -> Result<u64, CorpusError> {
        let value = self.i64(key)?;
        u64::try_from(value).map_err(|_| self.type_error(key, "a non-negative integer"))
    }

    /// Optional non-negative integer.
    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>, CorpusError> {
        match self.opt_i64(key)? {
            None => Ok(None),
            Some(value) => u64::try_from(value)
                .map(Some)
                .map_err(|_| self.type_error(key, "a non-negative integer")),
        }
    }

    /// Required number (integer or float).
    pub fn f64(&self, key: &str) -> Result<f64, CorpusError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| self.type_error(key, "a number"))
    }

    /// Optional number.
    pub fn opt_f64(&self, key: &str) -> Result<Option<f64>, CorpusError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.type_error(key, "a number")),
        }
    }

    /// Required boolean.
    pub fn bool(&self, key: &str) -> Result<bool, CorpusError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| self.type_error(key, "a boolean"))
    }

    /// Optional boolean.
    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>, CorpusError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.type_error(key, "a boolean")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Collections
    // ═══════════════════════════════════════════════════════════════════════

    /// Required array.
    pub fn array(&self, key: &str) -> Result<&'a [Value], CorpusError> {
        self.require(key)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.type_error(key, "an array"))
    }

    /// Required array with at least one element.
    pub fn non_empty_array(&self, key: &str) -> Result<&'a [Value], CorpusError> {
        let items = self
            .require(key)?
            .as_array()
            .ok_or_else(|| self.type_error(key, "a non-empty array"))?;
        if items.is_empty() {
            return Err(self.type_error(key, "a non-empty array"));
        }
        Ok(items)
    }

    /// Optional array.
    pub fn opt_array(&self, key: &str) -> Result<Option<&'a [Value]>, CorpusError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_array()
                .map(|items| Some(items.as_slice()))
                .ok_or_else(|| self.type_error(key, "an array")),
        }
    }

    /// Required nested object.
    pub fn object(&self, key: &str) -> Result<FieldReader<'a>, CorpusError> {
        let value = self.require(key)?;
        match value {
            Value::Object(object) => {
                Ok(FieldReader::new(self.scenario, self.field_name(key), object))
            }
            _ => Err(self.type_error(key, "an object")),
        }
    }

    /// Optional nested object.
    pub fn opt_object(&self, key: &str) -> Result<Option<FieldReader<'a>>, CorpusError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(object)) => Ok(Some(FieldReader::new(
                self.scenario,
                self.field_name(key),
                object,
            ))),
            Some(_) => Err(self.type_error(key, "an object")),
        }
    }

    /// Elements of an array that must all be objects.
    pub fn objects(
        &self,
        key: &str,
        items: &'a [Value],
    ) -> Result<Vec<FieldReader<'a>>, CorpusError> {
        let name = self.field_name(key);
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                FieldReader::from_value(self.scenario, format!("{name}[{index}]"), item)
            })
            .collect()
    }

    /// Optional array of strings; absent yields an empty list.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, CorpusError> {
        match self.opt_array(key)? {
            None => Ok(Vec::new()),
            Some(items) => self.strings(key, items),
        }
    }

    /// Required array of strings.
    pub fn required_string_list(&self, key: &str) -> Result<Vec<String>, CorpusError> {
        let items = self.array(key)?;
        self.strings(key, items)
    }

    /// Required array of error category names.
    pub fn categories(&self, key: &str) -> Result<Vec<ErrorCategory>, CorpusError> {
        let names = self.required_string_list(key)?;
        self.parse_categories(key, names)
    }

    /// Optional array of error category names; absent yields an empty list.
    pub fn opt_categories(&self, key: &str) -> Result<Vec<ErrorCategory>, CorpusError> {
        let names = self.string_list(key)?;
        self.parse_categories(key, names)
    }

    fn parse_categories(
        &self,
        key: &str,
        names: Vec<String>,
    ) -> Result<Vec<ErrorCategory>, CorpusError> {
        names
            .iter()
            .map(|name| {
                name.parse::<ErrorCategory>().map_err(|err| {
                    self.error(format!("{} contains {}", self.field_name(key), err))
                })
            })
            .collect()
    }

    fn strings(&self, key: &str, items: &[Value]) -> Result<Vec<String>, CorpusError> {
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| self.type_error(key, "an array of strings"))
            })
            .collect()
    }
}

/// Integer view of a JSON value; floats and strings are rejected.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "scenario"
    } else {
        path
    }
}
