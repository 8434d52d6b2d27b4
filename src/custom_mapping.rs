use crate::{pattern::AdUnitPattern, transaction::TransactionObject};

/// Extra approval step applied after structural and size matching.
///
/// Any `Fn(&TransactionObject, &AdUnitPattern) -> bool` closure can be used.
///
/// ```
/// # use ppi::{AdUnitPattern, ClientConfig, TransactionObject};
/// let client = ClientConfig::new()
///     .custom_mapping(|to: &TransactionObject, pattern: &AdUnitPattern| {
///         pattern.body().get("section") == to.targeting.get("section")
///     })
///     .to_client();
/// ```
pub trait CustomMapping {
    /// Return `true` if `pattern` may be used for `transaction_object`.
    fn approve(&self, transaction_object: &TransactionObject, pattern: &AdUnitPattern) -> bool;
}

impl<T: Fn(&TransactionObject, &AdUnitPattern) -> bool> CustomMapping for T {
    fn approve(&self, transaction_object: &TransactionObject, pattern: &AdUnitPattern) -> bool {
        self(transaction_object, pattern)
    }
}
