//! Div id and slot name of a resolved transaction object.
use crate::{
    pattern::{AdUnitPattern, PatternRegex},
    transaction::{Inventory, TransactionObject},
};

/// Id of the page element the transaction object renders into, or `""` if unknown.
pub(crate) fn div_id(
    transaction_object: &TransactionObject,
    pattern: Option<&AdUnitPattern>,
) -> String {
    if let Inventory::SlotObject(slot) = &transaction_object.inventory {
        return slot.element_id();
    }
    let Some(pattern) = pattern else {
        return String::new();
    };
    match &transaction_object.inventory {
        Inventory::Div(name) => name.clone(),
        _ => literal(pattern.div_pattern()),
    }
}

/// Ad server slot name of the transaction object, or `""` if unknown.
pub(crate) fn slot_name(
    transaction_object: &TransactionObject,
    pattern: Option<&AdUnitPattern>,
) -> String {
    match &transaction_object.inventory {
        Inventory::Slot(name) => name.clone(),
        Inventory::Div(_) => literal(pattern.and_then(AdUnitPattern::slot_pattern)),
        Inventory::SlotObject(slot) => slot.ad_unit_path(),
        Inventory::AutoSlots => String::new(),
    }
}

fn literal(regex: Option<&PatternRegex>) -> String {
    regex
        .filter(|regex| regex.is_literal())
        .map(|regex| regex.as_str().to_owned())
        .unwrap_or_default()
}
