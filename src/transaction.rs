//! Transaction objects: the units of page inventory that get matched against patterns.
use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::{
    ad_server::AdServerSlot,
    sizes::{normalize_sizes, sizes_to_value, Size},
};

/// Inventory a transaction object refers to.
#[derive(Clone)]
pub enum Inventory {
    /// Ad server slot identified by its ad unit path.
    Slot(String),
    /// Page element identified by its div id.
    Div(String),
    /// Live ad server slot.
    SlotObject(Arc<dyn AdServerSlot>),
    /// Expands into one [`Inventory::SlotObject`] per registered ad server slot before matching.
    AutoSlots,
}

impl Inventory {
    /// Name of the inventory type as used in JSON configuration.
    pub fn type_name(&self) -> &'static str {
        match self {
            Inventory::Slot(_) => "slot",
            Inventory::Div(_) => "div",
            Inventory::SlotObject(_) => "slotObject",
            Inventory::AutoSlots => "autoSlots",
        }
    }

    fn value(&self) -> Value {
        match self {
            Inventory::Slot(name) | Inventory::Div(name) => Value::String(name.clone()),
            Inventory::SlotObject(slot) => json!({
                "adUnitPath": slot.ad_unit_path(),
                "elementId": slot.element_id(),
            }),
            Inventory::AutoSlots => Value::Null,
        }
    }
}

impl fmt::Debug for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inventory::Slot(name) => f.debug_tuple("Slot").field(name).finish(),
            Inventory::Div(name) => f.debug_tuple("Div").field(name).finish(),
            Inventory::SlotObject(slot) => f
                .debug_struct("SlotObject")
                .field("ad_unit_path", &slot.ad_unit_path())
                .field("element_id", &slot.element_id())
                .finish(),
            Inventory::AutoSlots => f.write_str("AutoSlots"),
        }
    }
}

/// Where the bids for a transaction object come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HbSource {
    /// Hold a new auction.
    Auction,
    /// Use cached bids, re-auctioning only what is missing.
    Cache,
}

/// Destination kind for the bids of a transaction object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    /// Set targeting on ad server slots and refresh them.
    Gpt,
    /// Keep bids in the bid cache.
    Cache,
    /// Hand bids to a caller-supplied callback.
    Callback,
}

impl DestinationType {
    fn parse(value: &str) -> Option<DestinationType> {
        match value.to_ascii_lowercase().as_str() {
            "gpt" => Some(DestinationType::Gpt),
            "cache" => Some(DestinationType::Cache),
            "callback" => Some(DestinationType::Callback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HbDestination {
    #[serde(rename = "type")]
    pub kind: DestinationType,
    /// Destination-specific values, e.g. `div` for an explicit target element.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub values: Map<String, Value>,
}

impl From<DestinationType> for HbDestination {
    fn from(kind: DestinationType) -> Self {
        HbDestination {
            kind,
            values: Map::new(),
        }
    }
}

/// One inventory-matching request.
#[derive(Debug, Clone)]
pub struct TransactionObject {
    pub inventory: Inventory,
    /// Size limits. `None` means unconstrained; an explicitly empty list is kept as-is.
    pub sizes: Option<Vec<Size>>,
    pub source: HbSource,
    pub destination: HbDestination,
    /// Page targeting, used to fill `##data.<key>##` bid parameter placeholders.
    pub targeting: Map<String, Value>,
    /// Div id resolved after matching.
    pub div_id: Option<String>,
    /// Slot name resolved after matching.
    pub slot_name: Option<String>,
}

impl TransactionObject {
    /// Create a transaction object for `inventory` that requests a new auction and targets GPT.
    pub fn new(inventory: Inventory) -> TransactionObject {
        TransactionObject {
            inventory,
            sizes: None,
            source: HbSource::Auction,
            destination: DestinationType::Gpt.into(),
            targeting: Map::new(),
            div_id: None,
            slot_name: None,
        }
    }

    pub fn slot(name: impl Into<String>) -> TransactionObject {
        TransactionObject::new(Inventory::Slot(name.into()))
    }

    pub fn div(name: impl Into<String>) -> TransactionObject {
        TransactionObject::new(Inventory::Div(name.into()))
    }

    pub fn slot_object(slot: Arc<dyn AdServerSlot>) -> TransactionObject {
        TransactionObject::new(Inventory::SlotObject(slot))
    }

    pub fn auto_slots() -> TransactionObject {
        TransactionObject::new(Inventory::AutoSlots)
    }

    pub fn with_sizes(mut self, sizes: Vec<Size>) -> Self {
        self.sizes = Some(sizes);
        self
    }

    pub fn with_source(mut self, source: HbSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<HbDestination>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_targeting(mut self, targeting: Map<String, Value>) -> Self {
        self.targeting = targeting;
        self
    }

    /// Copy of this transaction object pointing at a different inventory item. Routing, size
    /// limits and targeting are kept; resolved display fields are not.
    pub(crate) fn with_inventory(&self, inventory: Inventory) -> TransactionObject {
        TransactionObject {
            inventory,
            div_id: None,
            slot_name: None,
            ..self.clone()
        }
    }

    /// JSON view used in logs and transaction results.
    pub fn to_value(&self) -> Value {
        let mut value = Map::new();
        value.insert("type".to_owned(), self.inventory.type_name().into());
        let inventory_value = self.inventory.value();
        if !inventory_value.is_null() {
            value.insert("value".to_owned(), inventory_value);
        }
        if let Some(sizes) = &self.sizes {
            value.insert("sizes".to_owned(), sizes_to_value(sizes));
        }
        value.insert("hbSource".to_owned(), json!(self.source));
        value.insert("hbDestination".to_owned(), json!(self.destination));
        if !self.targeting.is_empty() {
            value.insert("targeting".to_owned(), Value::Object(self.targeting.clone()));
        }
        if let Some(div_id) = &self.div_id {
            value.insert("divId".to_owned(), div_id.as_str().into());
        }
        if let Some(slot_name) = &self.slot_name {
            value.insert("slotName".to_owned(), slot_name.as_str().into());
        }
        Value::Object(value)
    }
}

impl Serialize for TransactionObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// A raw transaction object that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidTransactionObject {
    pub raw: Value,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: Vec<TransactionObject>,
    pub invalid: Vec<InvalidTransactionObject>,
}

/// Parse raw JSON transaction objects, splitting them into valid and invalid ones.
///
/// Live slot objects can't be described in JSON, so only `slot`, `div` and `autoSlots` types are
/// accepted here. Build slot-object transactions with [`TransactionObject::slot_object`].
pub fn validate_transaction_objects(raw: Vec<Value>) -> ValidationResult {
    let mut result = ValidationResult::default();
    for raw in raw {
        match parse_transaction_object(&raw) {
            Ok(to) => result.valid.push(to),
            Err(error) => {
                log::error!(target: "ppi",
                            transaction_object:serde = raw;
                            "provided invalid transaction object: {error}");
                result.invalid.push(InvalidTransactionObject { raw, error });
            }
        }
    }
    result
}

fn parse_transaction_object(raw: &Value) -> Result<TransactionObject, String> {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    let value = raw
        .get("value")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty());
    let inventory = match (kind, value) {
        ("autoSlots", _) => Inventory::AutoSlots,
        ("slot", Some(name)) => Inventory::Slot(name.to_owned()),
        ("div", Some(name)) => Inventory::Div(name.to_owned()),
        ("slot" | "div", None) => {
            return Err(format!(
                "for type {kind}, value must be provided, it can't be: {}",
                raw.get("value").unwrap_or(&Value::Null)
            ))
        }
        _ => return Err(format!("provided type {kind} not found")),
    };

    let source = match raw.get("hbSource").and_then(Value::as_str) {
        Some("auction") => HbSource::Auction,
        Some("cache") => HbSource::Cache,
        other => {
            return Err(format!(
                "hbSource: {} is not equal to auction or cache",
                other.unwrap_or("undefined")
            ))
        }
    };

    let destination = raw.get("hbDestination");
    let Some(destination_type) = destination
        .and_then(|d| d.get("type"))
        .and_then(Value::as_str)
    else {
        return Err("hbDestination.type not provided".to_owned());
    };
    let Some(kind) = DestinationType::parse(destination_type) else {
        return Err(format!("destination type {destination_type} not supported"));
    };
    if kind == DestinationType::Cache && source == HbSource::Cache {
        return Err("destination and source can't be cache at the same time".to_owned());
    }
    let values = destination
        .and_then(|d| d.get("values"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let sizes = match raw.get("sizes").filter(|s| !s.is_null()) {
        None => None,
        Some(sizes) => {
            let sizes = normalize_sizes(sizes).ok_or("sizes should be an array")?;
            Some(
                sizes
                    .iter()
                    .filter_map(|size| {
                        let parsed = Size::from_value(size);
                        if parsed.is_none() {
                            log::error!(target: "ppi", size:serde = size; "invalid size");
                        }
                        parsed
                    })
                    .collect(),
            )
        }
    };

    let targeting = raw
        .get("targeting")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(TransactionObject {
        inventory,
        sizes,
        source,
        destination: HbDestination { kind, values },
        targeting,
        div_id: None,
        slot_name: None,
    })
}

/// Transaction objects sharing a source and a destination type.
#[derive(Debug, Clone)]
pub struct TransactionGroup {
    pub source: HbSource,
    pub destination: DestinationType,
    pub transaction_objects: Vec<TransactionObject>,
}

/// Group transaction objects by source and destination type, keeping first-seen group order and
/// the original order within each group.
pub fn group_transaction_objects(
    transaction_objects: Vec<TransactionObject>,
) -> Vec<TransactionGroup> {
    let mut groups: Vec<TransactionGroup> = Vec::new();
    for to in transaction_objects {
        let (source, destination) = (to.source, to.destination.kind);
        match groups
            .iter_mut()
            .find(|g| g.source == source && g.destination == destination)
        {
            Some(group) => group.transaction_objects.push(to),
            None => groups.push(TransactionGroup {
                source,
                destination,
                transaction_objects: vec![to],
            }),
        }
    }
    groups
}
