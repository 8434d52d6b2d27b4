//! First-party data: fill bid parameter placeholders from page targeting and attach the ad slot
//! context to ad units.
use serde_json::{json, Map, Value};

use crate::{ad_unit::AdUnit, display::slot_name, pattern::AdUnitPattern, TransactionObject};

const PLACEHOLDER_PREFIX: &str = "##data.";
const PLACEHOLDER_SUFFIX: &str = "##";

/// Apply the transaction object's targeting and slot name to `ad_unit`.
///
/// Every string bid parameter of the form `##data.<key>##` is replaced with `targeting[<key>]`, or
/// removed if the key isn't set. The resolved slot name, if any, goes to
/// `ortb2Imp.ext.data.pbadslot` and `ortb2Imp.ext.data.adserver`.
pub fn apply_first_party_data(
    ad_unit: &mut AdUnit,
    pattern: &AdUnitPattern,
    transaction_object: &TransactionObject,
) {
    let ad_unit = ad_unit.as_map_mut();

    if let Some(Value::Array(bids)) = ad_unit.get_mut("bids") {
        for bid in bids {
            if let Some(Value::Object(params)) = bid.get_mut("params") {
                replace_in_object(params, &transaction_object.targeting);
            }
        }
    }

    let slot_name = slot_name(transaction_object, Some(pattern));
    if slot_name.is_empty() {
        return;
    }

    let data = ad_unit
        .entry("ortb2Imp")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .map(|ortb2_imp| ortb2_imp.entry("ext").or_insert_with(|| json!({})))
        .and_then(Value::as_object_mut)
        .map(|ext| ext.entry("data").or_insert_with(|| json!({})))
        .and_then(Value::as_object_mut);
    let Some(data) = data else {
        log::warn!(target: "ppi",
                   code:display = ad_unit.get("code").unwrap_or(&Value::Null);
                   "ortb2Imp.ext.data is not an object, skipping ad slot context");
        return;
    };
    data.insert("pbadslot".to_owned(), slot_name.as_str().into());
    data.insert(
        "adserver".to_owned(),
        json!({"name": "gam", "adslot": slot_name}),
    );
}

fn replace_in_object(params: &mut Map<String, Value>, targeting: &Map<String, Value>) {
    let keys = params.keys().cloned().collect::<Vec<_>>();
    for key in keys {
        let Some(value) = params.get_mut(&key) else {
            continue;
        };
        match resolve(value, targeting) {
            Resolution::Keep => {}
            Resolution::Replace(replacement) => *value = replacement,
            Resolution::Remove => {
                params.remove(&key);
            }
        }
    }
}

fn replace_in_array(values: &mut Vec<Value>, targeting: &Map<String, Value>) {
    let mut result = Vec::with_capacity(values.len());
    for mut value in values.drain(..) {
        match resolve(&mut value, targeting) {
            Resolution::Keep => result.push(value),
            Resolution::Replace(replacement) => result.push(replacement),
            Resolution::Remove => {}
        }
    }
    *values = result;
}

enum Resolution {
    Keep,
    Replace(Value),
    Remove,
}

/// Resolve placeholders in `value`, recursing into objects and arrays in place.
fn resolve(value: &mut Value, targeting: &Map<String, Value>) -> Resolution {
    match value {
        Value::Object(object) => {
            replace_in_object(object, targeting);
            Resolution::Keep
        }
        Value::Array(array) => {
            replace_in_array(array, targeting);
            Resolution::Keep
        }
        Value::String(s) => match placeholder_key(s) {
            None => Resolution::Keep,
            Some(key) => match targeting.get(key).filter(|v| is_truthy(v)) {
                Some(replacement) => {
                    log::debug!(target: "ppi", placeholder:display = s, key;
                                "replacing placeholder with targeting value");
                    Resolution::Replace(replacement.clone())
                }
                None => {
                    log::debug!(target: "ppi", placeholder:display = s, key;
                                "no targeting value for placeholder, removing bid parameter");
                    Resolution::Remove
                }
            },
        },
        _ => Resolution::Keep,
    }
}

fn placeholder_key(value: &str) -> Option<&str> {
    value
        .strip_prefix(PLACEHOLDER_PREFIX)?
        .strip_suffix(PLACEHOLDER_SUFFIX)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}
