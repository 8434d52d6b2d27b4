//! Ad unit patterns (AUPs): validation and compilation of configured templates.
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    error::PatternError,
    sizes::{normalize_sizes, Size},
    Error, Result,
};

pub(crate) const SLOT_PATTERN: &str = "slotPattern";
pub(crate) const DIV_PATTERN: &str = "divPattern";

const REGEX_META: &[char] = &[
    '\\', '.', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '^', '$',
];

/// A pattern string together with its compiled, case-insensitive regex.
#[derive(Debug, Clone)]
pub struct PatternRegex {
    source: String,
    regex: Regex,
}

impl PatternRegex {
    /// Compile `pattern` as a case-insensitive regex.
    pub fn new(pattern: &str) -> Result<PatternRegex> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| Error::InvalidRegex {
                pattern: pattern.to_owned(),
                source: Arc::new(err),
            })?;
        Ok(PatternRegex {
            source: pattern.to_owned(),
            regex,
        })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Return `true` if the pattern contains no regex metacharacters, i.e., it names exactly one
    /// slot path or div id and can be used as a display value.
    pub fn is_literal(&self) -> bool {
        !self.source.contains(REGEX_META)
    }
}

/// A validated ad unit pattern.
///
/// `body` is an independent copy of the configured JSON object (with sizes normalized). Compiled
/// regexes live next to it rather than inside it, so the body can be serialized as-is.
#[derive(Debug, Clone)]
pub struct AdUnitPattern {
    slot_pattern: Option<PatternRegex>,
    div_pattern: Option<PatternRegex>,
    sizes: Option<Vec<Size>>,
    body: Map<String, Value>,
}

impl AdUnitPattern {
    /// Validate and compile a raw pattern. `raw` is not modified.
    pub fn compile(raw: &Value) -> Result<AdUnitPattern> {
        let Value::Object(raw) = raw else {
            return Err(PatternError::NotAnObject.into());
        };

        let mut body = raw.clone();
        validate_pattern(&mut body)?;

        let slot_pattern = pattern_string(&body, SLOT_PATTERN)
            .map(PatternRegex::new)
            .transpose()?;
        let div_pattern = pattern_string(&body, DIV_PATTERN)
            .map(PatternRegex::new)
            .transpose()?;
        let sizes = banner_sizes(&body).map(|sizes| {
            sizes
                .iter()
                .filter_map(Size::from_value)
                .collect::<Vec<_>>()
        });

        Ok(AdUnitPattern {
            slot_pattern,
            div_pattern,
            sizes,
            body,
        })
    }

    pub fn slot_pattern(&self) -> Option<&PatternRegex> {
        self.slot_pattern.as_ref()
    }

    pub fn div_pattern(&self) -> Option<&PatternRegex> {
        self.div_pattern.as_ref()
    }

    /// Declared banner sizes, `None` if the pattern declares none.
    pub fn sizes(&self) -> Option<&[Size]> {
        self.sizes.as_deref()
    }

    /// Explicitly configured ad unit code.
    pub fn code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }

    /// The validated pattern object, including `slotPattern`/`divPattern`.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

impl Serialize for AdUnitPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// Check the pattern invariants and normalize its sizes in place.
///
/// Validating an already-valid pattern leaves it unchanged.
pub(crate) fn validate_pattern(
    pattern: &mut Map<String, Value>,
) -> std::result::Result<(), PatternError> {
    if pattern_string(pattern, SLOT_PATTERN).is_none()
        && pattern_string(pattern, DIV_PATTERN).is_none()
    {
        return Err(PatternError::MissingPattern);
    }

    let Some(sizes) = banner_sizes_value(pattern) else {
        return Ok(());
    };
    let sizes = normalize_sizes(sizes).ok_or(PatternError::SizesNotArray)?;
    if let Some(index) = sizes.iter().position(|size| Size::from_value(size).is_none()) {
        return Err(PatternError::InvalidSize { index });
    }

    // banner_sizes_value() returned Some, so the path exists.
    if let Some(Value::Object(banner)) = pattern
        .get_mut("mediaTypes")
        .and_then(|media_types| media_types.get_mut("banner"))
    {
        banner.insert("sizes".to_owned(), Value::Array(sizes));
    }

    Ok(())
}

fn pattern_string<'a>(pattern: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    pattern
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// `mediaTypes.banner.sizes`, ignoring explicit nulls.
fn banner_sizes_value(pattern: &Map<String, Value>) -> Option<&Value> {
    pattern
        .get("mediaTypes")?
        .get("banner")?
        .get("sizes")
        .filter(|sizes| !sizes.is_null())
}

fn banner_sizes(pattern: &Map<String, Value>) -> Option<&Vec<Value>> {
    banner_sizes_value(pattern)?.as_array()
}
