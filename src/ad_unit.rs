use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    hash::content_code,
    pattern::{AdUnitPattern, DIV_PATTERN, SLOT_PATTERN},
    sizes::{filter_sizes_by_intersection, sort_sizes, sizes_to_value, Size},
    Error, Result,
};

/// Ad unit definition submitted to the auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct AdUnit(Map<String, Value>);

impl AdUnit {
    pub fn code(&self) -> Option<&str> {
        self.0.get("code").and_then(Value::as_str)
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.0.get("transactionId").and_then(Value::as_str)
    }

    /// `mediaTypes.banner.sizes`.
    pub fn sizes(&self) -> Option<Vec<Size>> {
        let sizes = self.0.get("mediaTypes")?.get("banner")?.get("sizes")?;
        Some(sizes.as_array()?.iter().filter_map(Size::from_value).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Build an ad unit from `pattern`, restricted to `size_limits`.
///
/// Returns `None` (and logs an error) if the ad unit can't be built. The transaction object
/// should then be treated as unmatched.
pub fn create_ad_unit(pattern: &AdUnitPattern, size_limits: &[Size]) -> Option<AdUnit> {
    try_create_ad_unit(pattern, size_limits)
        .inspect_err(|err| {
            log::error!(target: "ppi",
                        pattern:serde = pattern;
                        "error building ad unit: {err}");
        })
        .ok()
}

fn try_create_ad_unit(pattern: &AdUnitPattern, size_limits: &[Size]) -> Result<AdUnit> {
    // The body is an owned copy, compiled regexes live outside of it.
    let mut ad_unit = pattern.body().clone();

    if !size_limits.is_empty() {
        let sizes = match pattern.sizes() {
            Some(pattern_sizes) if !pattern_sizes.is_empty() => {
                filter_sizes_by_intersection(pattern_sizes, size_limits)
            }
            _ => size_limits.to_vec(),
        };
        set_banner_sizes(&mut ad_unit, &sort_sizes(sizes))?;
    }

    // Code is hashed from the size-finalized body, so sizes must be settled before this point.
    // Map keys serialize in sorted order, so the code doesn't depend on configured key order.
    if !has_value(&ad_unit, "code") {
        let serialized = serde_json::to_string(&ad_unit)?;
        ad_unit.insert("code".to_owned(), content_code(&serialized).into());
    }

    ad_unit.remove(SLOT_PATTERN);
    ad_unit.remove(DIV_PATTERN);

    if !has_value(&ad_unit, "transactionId") {
        ad_unit.insert(
            "transactionId".to_owned(),
            Uuid::new_v4().to_string().into(),
        );
    }

    Ok(AdUnit(ad_unit))
}

fn set_banner_sizes(ad_unit: &mut Map<String, Value>, sizes: &[Size]) -> Result<()> {
    let media_types = object_entry(ad_unit, "mediaTypes")?;
    let banner = object_entry(media_types, "banner")?;
    banner.insert("sizes".to_owned(), sizes_to_value(sizes));
    Ok(())
}

/// Get `key` as an object, creating it if missing or null.
fn object_entry<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>> {
    let entry = map.entry(key).or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(object) => Ok(object),
        other => Err(Error::AdUnitSynthesis(format!(
            "{key} should be an object, found {other}"
        ))),
    }
}

/// `false` for missing, null, `false`, `0` and empty-string values.
fn has_value(map: &Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}
