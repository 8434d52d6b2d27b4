use std::{collections::HashSet, sync::Arc};

use crate::{
    custom_mapping::CustomMapping, matcher::find_matching_patterns, pattern::AdUnitPattern,
    transaction::TransactionObject,
};

/// A transaction object and the pattern it was resolved to, if any.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub transaction_object: TransactionObject,
    pub pattern: Option<Arc<AdUnitPattern>>,
}

/// Resolve each transaction object to at most one pattern.
///
/// Within one call a pattern is assigned to at most one transaction object: once taken, it is
/// skipped for the rest of the batch. When several patterns remain, the first one in store order
/// wins. The output has one entry per input, in input order.
pub fn get_to_aup_pair(
    transaction_objects: Vec<TransactionObject>,
    patterns: &[Arc<AdUnitPattern>],
    custom_mapping: Option<&dyn CustomMapping>,
) -> Vec<MatchResult> {
    let mut lock: HashSet<*const AdUnitPattern> = HashSet::new();

    transaction_objects
        .into_iter()
        .map(|mut transaction_object| {
            let mut candidates =
                find_matching_patterns(&mut transaction_object, patterns, custom_mapping);
            candidates.retain(|pattern| {
                let is_locked = lock.contains(&Arc::as_ptr(pattern));
                if is_locked {
                    log::warn!(target: "ppi",
                               pattern:serde = pattern.as_ref();
                               "pattern was already matched for one of the previous transaction objects, will skip it");
                }
                !is_locked
            });

            let pattern = match candidates.len() {
                0 => {
                    log::warn!(target: "ppi",
                               transaction_object:serde = transaction_object;
                               "no pattern matched for transaction object");
                    None
                }
                1 => candidates.pop(),
                _ => {
                    log::warn!(target: "ppi",
                               transaction_object:serde = transaction_object,
                               candidates:serde = candidates.iter().map(|p| &**p).collect::<Vec<&AdUnitPattern>>();
                               "more than one pattern matched for transaction object, will take the first one");
                    Some(candidates.swap_remove(0))
                }
            };

            if let Some(pattern) = &pattern {
                lock.insert(Arc::as_ptr(pattern));
            }

            MatchResult {
                transaction_object,
                pattern,
            }
        })
        .collect()
}
