use std::sync::Arc;

use crate::{
    ad_server::slot_sizes,
    custom_mapping::CustomMapping,
    pattern::AdUnitPattern,
    sizes::{intersects, Size},
    transaction::{Inventory, TransactionObject},
    Error, Result,
};

/// Find all patterns compatible with `transaction_object`, in store order.
///
/// A pattern is a candidate if it matches the inventory structurally, shares at least one size
/// with the transaction's size limits (when both declare sizes), and is approved by
/// `custom_mapping` (if any).
///
/// Slot-object transactions without size limits get the slot's registered sizes filled in the
/// first time they are needed.
pub fn find_matching_patterns(
    transaction_object: &mut TransactionObject,
    patterns: &[Arc<AdUnitPattern>],
    custom_mapping: Option<&dyn CustomMapping>,
) -> Vec<Arc<AdUnitPattern>> {
    let mut candidates = Vec::new();

    for pattern in patterns {
        match matches_inventory(&transaction_object.inventory, pattern) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                // Fail closed: the pattern is excluded for this transaction object.
                log::error!(target: "ppi",
                            transaction_object:serde = transaction_object;
                            "{err}");
                continue;
            }
        }

        if !matches_sizes(limit_sizes(transaction_object), pattern.sizes()) {
            log::trace!(target: "ppi",
                        pattern:serde = pattern.as_ref();
                        "pattern rejected, no common size");
            continue;
        }

        if let Some(custom_mapping) = custom_mapping {
            if !custom_mapping.approve(transaction_object, pattern) {
                log::trace!(target: "ppi",
                            pattern:serde = pattern.as_ref();
                            "pattern rejected by custom mapping");
                continue;
            }
        }

        candidates.push(pattern.clone());
    }

    candidates
}

fn matches_inventory(inventory: &Inventory, pattern: &AdUnitPattern) -> Result<bool> {
    Ok(match inventory {
        Inventory::Slot(name) => pattern
            .slot_pattern()
            .is_some_and(|regex| regex.is_match(name)),
        Inventory::Div(name) => pattern
            .div_pattern()
            .is_some_and(|regex| regex.is_match(name)),
        Inventory::SlotObject(slot) => {
            // An absent slot or div pattern doesn't constrain slot objects.
            pattern
                .slot_pattern()
                .map_or(true, |regex| regex.is_match(&slot.ad_unit_path()))
                && pattern
                    .div_pattern()
                    .map_or(true, |regex| regex.is_match(&slot.element_id()))
        }
        // Auto slots are expanded before matching.
        Inventory::AutoSlots => return Err(Error::InvalidTransactionType("autoSlots")),
    })
}

/// Size limits of the transaction object, backfilled from the ad server slot if missing.
fn limit_sizes(transaction_object: &mut TransactionObject) -> Option<&[Size]> {
    if transaction_object.sizes.is_none() {
        if let Inventory::SlotObject(slot) = &transaction_object.inventory {
            transaction_object.sizes = Some(slot_sizes(slot.as_ref()));
        }
    }
    transaction_object.sizes.as_deref()
}

/// Missing or empty size sets on either side impose no constraint.
fn matches_sizes(limits: Option<&[Size]>, pattern_sizes: Option<&[Size]>) -> bool {
    match (limits, pattern_sizes) {
        (Some(limits), Some(pattern_sizes)) if !limits.is_empty() && !pattern_sizes.is_empty() => {
            intersects(pattern_sizes, limits)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde_json::{json, Value};

    use super::find_matching_patterns;
    use crate::{
        ad_server::{testing::FakeSlot, SlotSize},
        pattern::AdUnitPattern,
        transaction::TransactionObject,
        CustomMapping, Size,
    };

    fn patterns(raw: &[Value]) -> Vec<Arc<AdUnitPattern>> {
        raw.iter()
            .map(|raw| Arc::new(AdUnitPattern::compile(raw).unwrap()))
            .collect()
    }

    fn matched_codes(to: &mut TransactionObject, patterns: &[Arc<AdUnitPattern>]) -> Vec<String> {
        find_matching_patterns(to, patterns, None)
            .iter()
            .map(|p| p.code().unwrap_or_default().to_owned())
            .collect()
    }

    #[test]
    fn slot_matches_slot_pattern_only() {
        let patterns = patterns(&[
            json!({"code": "slot", "slotPattern": "^/1234/home$"}),
            json!({"code": "div", "divPattern": "^/1234/home$"}),
            json!({"code": "other-slot", "slotPattern": "^/1234/news$"}),
        ]);
        let mut to = TransactionObject::slot("/1234/HOME");
        assert_eq!(matched_codes(&mut to, &patterns), vec!["slot"]);
    }

    #[test]
    fn div_matches_div_pattern_only() {
        let patterns = patterns(&[
            json!({"code": "slot", "slotPattern": "div-1"}),
            json!({"code": "div", "divPattern": "div-\\d+"}),
        ]);
        let mut to = TransactionObject::div("div-42");
        assert_eq!(matched_codes(&mut to, &patterns), vec!["div"]);
    }

    #[test]
    fn slot_object_requires_both_declared_patterns() {
        let patterns = patterns(&[
            json!({"code": "both", "slotPattern": "^/1234/home$", "divPattern": "^div-1$"}),
            json!({"code": "slot-only", "slotPattern": "^/1234/home$"}),
            json!({"code": "wrong-div", "slotPattern": "^/1234/home$", "divPattern": "^div-2$"}),
            json!({"code": "div-only", "divPattern": "^div-1$"}),
        ]);
        let mut to =
            TransactionObject::slot_object(FakeSlot::new("/1234/home", "div-1", vec![]));
        assert_eq!(
            matched_codes(&mut to, &patterns),
            vec!["both", "slot-only", "div-only"]
        );
    }

    #[test]
    fn auto_slots_never_match() {
        let patterns = patterns(&[json!({"slotPattern": ".*", "divPattern": ".*"})]);
        let mut to = TransactionObject::auto_slots();
        assert!(find_matching_patterns(&mut to, &patterns, None).is_empty());
    }

    #[test]
    fn requires_common_size() {
        let patterns = patterns(&[
            json!({"code": "leaderboard", "divPattern": "ad", "mediaTypes": {"banner": {"sizes": [[728, 90]]}}}),
            json!({"code": "mpu", "divPattern": "ad", "mediaTypes": {"banner": {"sizes": [[300, 250], [300, 600]]}}}),
            json!({"code": "any", "divPattern": "ad"}),
        ]);
        let mut to = TransactionObject::div("ad").with_sizes(vec![Size::new(300, 600)]);
        assert_eq!(matched_codes(&mut to, &patterns), vec!["mpu", "any"]);
    }

    #[test]
    fn empty_size_limits_do_not_constrain() {
        let patterns = patterns(&[
            json!({"code": "mpu", "divPattern": "ad", "mediaTypes": {"banner": {"sizes": [[300, 250]]}}}),
        ]);
        let mut to = TransactionObject::div("ad").with_sizes(vec![]);
        assert_eq!(matched_codes(&mut to, &patterns), vec!["mpu"]);
    }

    #[test]
    fn backfills_slot_object_sizes() {
        let patterns = patterns(&[
            json!({"code": "leaderboard", "slotPattern": "home", "mediaTypes": {"banner": {"sizes": [[728, 90]]}}}),
            json!({"code": "mpu", "slotPattern": "home", "mediaTypes": {"banner": {"sizes": [[300, 250]]}}}),
        ]);
        let mut to = TransactionObject::slot_object(FakeSlot::new(
            "/1234/home",
            "div-1",
            vec![SlotSize::Fluid, Size::new(300, 250).into()],
        ));
        assert_eq!(matched_codes(&mut to, &patterns), vec!["mpu"]);
        assert_eq!(to.sizes, Some(vec![Size::new(300, 250)]));
    }

    #[test]
    fn explicit_slot_object_sizes_are_kept() {
        let patterns = patterns(&[
            json!({"code": "leaderboard", "slotPattern": "home", "mediaTypes": {"banner": {"sizes": [[728, 90]]}}}),
        ]);
        let mut to = TransactionObject::slot_object(FakeSlot::new(
            "/1234/home",
            "div-1",
            vec![Size::new(300, 250).into()],
        ))
        .with_sizes(vec![Size::new(728, 90)]);
        assert_eq!(matched_codes(&mut to, &patterns), vec!["leaderboard"]);
    }

    #[test]
    fn custom_mapping_filters_candidates() {
        let patterns = patterns(&[
            json!({"code": "sports", "divPattern": "ad", "section": "sports"}),
            json!({"code": "news", "divPattern": "ad", "section": "news"}),
        ]);
        let calls = AtomicUsize::new(0);
        let mapping = |to: &TransactionObject, pattern: &AdUnitPattern| {
            calls.fetch_add(1, Ordering::SeqCst);
            pattern.body().get("section") == to.targeting.get("section")
        };

        let mut to = TransactionObject::div("ad").with_targeting(
            json!({"section": "news"}).as_object().unwrap().clone(),
        );
        let matched =
            find_matching_patterns(&mut to, &patterns, Some(&mapping as &dyn CustomMapping));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].code(), Some("news"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_mapping_is_not_called_for_structural_mismatch() {
        let patterns = patterns(&[json!({"divPattern": "other"})]);
        let mapping = |_: &TransactionObject, _: &AdUnitPattern| -> bool {
            panic!("should not be called")
        };
        let mut to = TransactionObject::div("ad");
        assert!(
            find_matching_patterns(&mut to, &patterns, Some(&mapping as &dyn CustomMapping))
                .is_empty()
        );
    }
}
