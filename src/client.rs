use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, PoisonError, RwLock,
};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    ad_server::AdServer,
    ad_unit::{create_ad_unit, AdUnit},
    amazon::{create_amazon_slots, AmazonSlot},
    custom_mapping::CustomMapping,
    display::{div_id, slot_name},
    first_party_data::apply_first_party_data,
    pattern::AdUnitPattern,
    pattern_store::PatternStore,
    resolver::get_to_aup_pair,
    transaction::{
        group_transaction_objects, validate_transaction_objects, DestinationType, HbSource,
        Inventory, TransactionObject,
    },
    ClientConfig,
};

/// Matches page inventory against ad unit patterns.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use ppi::{Client, ClientConfig, TransactionObject};
/// # use serde_json::json;
/// let client = Client::new(ClientConfig::new().ad_unit_patterns(vec![json!({
///     "slotPattern": "^/1234/home$",
///     "mediaTypes": {"banner": {"sizes": [[300, 250]]}},
///     "bids": [{"bidder": "appnexus", "params": {"placementId": 13144370}}],
/// })]));
/// let matches = client.create_ad_units(vec![TransactionObject::slot("/1234/home")]);
/// assert!(matches[0].ad_unit.is_some());
/// ```
pub struct Client<'a> {
    pattern_store: Arc<PatternStore>,
    ad_server: Box<dyn AdServer + Send + Sync + 'a>,
    custom_mapping: RwLock<Option<Arc<dyn CustomMapping + Send + Sync + 'a>>>,
    // Set once the first batch is matched.
    matched: AtomicBool,
}

/// A transaction object (with resolved display fields) and the ad unit built for it, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchObject {
    pub transaction_object: TransactionObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_unit: Option<AdUnit>,
}

/// Outcome of [`Client::request_bids`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBidsResult {
    /// One entry per input transaction object: invalid ones first, then the valid ones in batch
    /// order.
    pub transaction_results: Vec<TransactionResult>,
    /// Resolved batches, ready for auction or cache dispatch.
    pub batches: Vec<Batch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub transaction_object: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "match")]
    pub match_status: MatchStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchStatus {
    /// `true` if a pattern matched and an ad unit was built from it.
    pub status: bool,
    /// The matched pattern as configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aup: Option<Map<String, Value>>,
}

/// Match objects sharing a source and a destination type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub source: HbSource,
    pub destination: DestinationType,
    pub match_objects: Vec<MatchObject>,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    ///
    /// ```
    /// # use ppi::{Client, ClientConfig};
    /// let client = Client::new(ClientConfig::new());
    /// ```
    pub fn new(config: ClientConfig<'a>) -> Self {
        let pattern_store = Arc::new(PatternStore::new());
        pattern_store.add_ad_unit_patterns(&config.ad_unit_patterns);
        Client {
            pattern_store,
            ad_server: config.ad_server,
            custom_mapping: RwLock::new(config.custom_mapping),
            matched: AtomicBool::new(false),
        }
    }

    pub fn pattern_store(&self) -> &PatternStore {
        &self.pattern_store
    }

    /// Validate and store ad unit patterns. Invalid patterns are logged and skipped.
    ///
    /// Returns the number of patterns added.
    pub fn add_ad_unit_patterns(&self, raw_patterns: &[Value]) -> usize {
        self.pattern_store.add_ad_unit_patterns(raw_patterns)
    }

    /// Replace the custom mapping function.
    ///
    /// Batches that are already matched are not affected.
    pub fn set_custom_mapping_function(
        &self,
        custom_mapping: impl CustomMapping + Send + Sync + 'a,
    ) {
        if self.matched.load(Ordering::Relaxed) {
            log::warn!(target: "ppi",
                       "custom mapping function set after ad unit patterns were already matched, it will apply to subsequent batches only");
        }
        *self
            .custom_mapping
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(custom_mapping));
    }

    /// Expand an `autoSlots` transaction object into one slot-object transaction per slot
    /// currently registered on the ad server.
    pub fn transform_auto_slots(
        &self,
        transaction_object: &TransactionObject,
    ) -> Vec<TransactionObject> {
        let slots = self.ad_server.slots();
        if slots.is_empty() {
            log::warn!(target: "ppi",
                       transaction_object:serde;
                       "no ad server slots registered, nothing to expand auto slots into");
        }
        let expanded = slots
            .into_iter()
            .map(|slot| transaction_object.with_inventory(Inventory::SlotObject(slot)))
            .collect::<Vec<_>>();
        log::debug!(target: "ppi",
                    transaction_object:serde,
                    slots = expanded.len();
                    "expanded auto slots");
        expanded
    }

    /// Match a batch of transaction objects and build an ad unit for each match.
    ///
    /// `autoSlots` transaction objects are expanded first. Every other input yields exactly one
    /// [`MatchObject`], in input order, with `div_id` and `slot_name` resolved; unmatched ones
    /// carry no ad unit.
    pub fn create_ad_units(
        &self,
        transaction_objects: Vec<TransactionObject>,
    ) -> Vec<MatchObject> {
        self.resolve_batch(self.expand_auto_slots(transaction_objects))
            .into_iter()
            .map(|(match_object, _)| match_object)
            .collect()
    }

    /// Validate raw transaction objects, then match each (source, destination) group as its own
    /// batch and fill in first-party data.
    ///
    /// The auction or cache dispatch of the returned batches is up to the caller.
    pub fn request_bids(&self, raw_transaction_objects: Vec<Value>) -> RequestBidsResult {
        let validation = validate_transaction_objects(raw_transaction_objects);

        let mut result = RequestBidsResult {
            transaction_results: validation
                .invalid
                .into_iter()
                .map(|invalid| TransactionResult {
                    transaction_object: invalid.raw,
                    error: Some(invalid.error),
                    match_status: MatchStatus {
                        status: false,
                        aup: None,
                    },
                })
                .collect(),
            batches: Vec::new(),
        };

        let transaction_objects = self.expand_auto_slots(validation.valid);
        for group in group_transaction_objects(transaction_objects) {
            let mut match_objects = Vec::with_capacity(group.transaction_objects.len());
            for (mut match_object, pattern) in self.resolve_batch(group.transaction_objects) {
                if let (Some(ad_unit), Some(pattern)) = (&mut match_object.ad_unit, &pattern) {
                    apply_first_party_data(ad_unit, pattern, &match_object.transaction_object);
                }
                // A pattern whose ad unit couldn't be built leaves the transaction object unmatched.
                let pattern = pattern.filter(|_| match_object.ad_unit.is_some());
                result.transaction_results.push(TransactionResult {
                    transaction_object: match_object.transaction_object.to_value(),
                    error: None,
                    match_status: MatchStatus {
                        status: pattern.is_some(),
                        aup: pattern.map(|pattern| pattern.body().clone()),
                    },
                });
                match_objects.push(match_object);
            }
            result.batches.push(Batch {
                source: group.source,
                destination: group.destination,
                match_objects,
            });
        }

        result
    }

    /// Amazon slot descriptors for `match_objects`, resolving missing slot names through the
    /// configured ad server.
    pub fn create_amazon_slots(&self, match_objects: &[MatchObject]) -> Vec<AmazonSlot> {
        create_amazon_slots(match_objects, self.ad_server.as_ref())
    }

    fn expand_auto_slots(
        &self,
        transaction_objects: Vec<TransactionObject>,
    ) -> Vec<TransactionObject> {
        let mut expanded = Vec::with_capacity(transaction_objects.len());
        for to in transaction_objects {
            match to.inventory {
                Inventory::AutoSlots => expanded.extend(self.transform_auto_slots(&to)),
                _ => expanded.push(to),
            }
        }
        expanded
    }

    fn resolve_batch(
        &self,
        transaction_objects: Vec<TransactionObject>,
    ) -> Vec<(MatchObject, Option<Arc<AdUnitPattern>>)> {
        self.matched.store(true, Ordering::Relaxed);

        // One snapshot per batch: concurrent additions and mapping changes apply to the next one.
        let patterns = self.pattern_store.patterns();
        let custom_mapping = self
            .custom_mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        get_to_aup_pair(
            transaction_objects,
            &patterns,
            custom_mapping
                .as_deref()
                .map(|mapping| mapping as &dyn CustomMapping),
        )
        .into_iter()
        .map(|result| {
            let mut transaction_object = result.transaction_object;
            let pattern = result.pattern;

            let ad_unit = pattern.as_deref().and_then(|pattern| {
                create_ad_unit(pattern, transaction_object.sizes.as_deref().unwrap_or_default())
            });
            transaction_object.div_id = Some(div_id(&transaction_object, pattern.as_deref()));
            transaction_object.slot_name = Some(slot_name(&transaction_object, pattern.as_deref()));

            (
                MatchObject {
                    transaction_object,
                    ad_unit,
                },
                pattern,
            )
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use crate::{
        ad_server::{testing::FakeSlot, AdServerSlot},
        pattern::AdUnitPattern,
        transaction::{DestinationType, HbSource, Inventory, TransactionObject},
        Client, ClientConfig, Size,
    };

    fn client<'a>(patterns: Vec<Value>) -> Client<'a> {
        let _ = env_logger::builder().is_test(true).try_init();
        ClientConfig::new().ad_unit_patterns(patterns).to_client()
    }

    #[test]
    fn slot_transaction_gets_intersected_sizes() {
        let client = client(vec![json!({
            "slotPattern": "^div-ad-1$",
            "mediaTypes": {"banner": {"sizes": [[300, 250], [728, 90]]}},
        })]);
        let result = client.create_ad_units(vec![
            TransactionObject::slot("div-ad-1").with_sizes(vec![Size::new(300, 250)])
        ]);
        assert_eq!(result.len(), 1);
        let ad_unit = result[0].ad_unit.as_ref().unwrap();
        assert_eq!(ad_unit.sizes(), Some(vec![Size::new(300, 250)]));
        assert_eq!(result[0].transaction_object.slot_name.as_deref(), Some("div-ad-1"));
    }

    #[test]
    fn ambiguous_match_takes_first_and_keeps_second_available() {
        let client = client(vec![
            json!({"code": "first", "divPattern": "^ad-"}),
            json!({"code": "second", "divPattern": "ad-\\d"}),
        ]);
        let result = client.create_ad_units(vec![
            TransactionObject::div("ad-1"),
            TransactionObject::div("ad-2"),
        ]);
        let codes = result
            .iter()
            .map(|m| m.ad_unit.as_ref().and_then(|a| a.code()))
            .collect::<Vec<_>>();
        assert_eq!(codes, vec![Some("first"), Some("second")]);
    }

    #[test]
    fn empty_size_limits_keep_pattern_sizes() {
        let client = client(vec![json!({
            "divPattern": "ad",
            "mediaTypes": {"banner": {"sizes": [[300, 250]]}},
        })]);
        let result = client.create_ad_units(vec![TransactionObject::div("ad").with_sizes(vec![])]);
        let ad_unit = result[0].ad_unit.as_ref().unwrap();
        assert_eq!(ad_unit.sizes(), Some(vec![Size::new(300, 250)]));
    }

    #[test]
    fn pattern_without_inventory_pattern_is_not_stored() {
        let client = client(vec![
            json!({"code": "nothing", "mediaTypes": {"banner": {"sizes": [[300, 250]]}}}),
            json!({"code": "div", "divPattern": "ad"}),
        ]);
        assert_eq!(client.pattern_store().len(), 1);
        assert_eq!(client.add_ad_unit_patterns(&[json!({"bids": []})]), 0);
        assert_eq!(client.pattern_store().len(), 1);
    }

    #[test]
    fn auto_slots_expand_into_slot_objects() {
        let slots = vec![
            FakeSlot::new("/1234/top", "div-top", vec![Size::new(728, 90).into()]),
            FakeSlot::new("/1234/side", "div-side", vec![Size::new(300, 250).into()]),
            FakeSlot::new("/1234/bottom", "div-bottom", vec![Size::new(728, 90).into()]),
        ];
        let client = ClientConfig::new()
            .ad_server(move || slots.clone())
            .ad_unit_patterns(vec![
                json!({"code": "leaderboard", "slotPattern": "^/1234/", "mediaTypes": {"banner": {"sizes": [[728, 90]]}}}),
                json!({"code": "mpu", "slotPattern": "^/1234/", "mediaTypes": {"banner": {"sizes": [[300, 250]]}}}),
            ])
            .to_client();

        let to = TransactionObject::auto_slots();
        let expanded = client.transform_auto_slots(&to);
        assert_eq!(expanded.len(), 3);
        assert!(expanded
            .iter()
            .all(|to| matches!(to.inventory, Inventory::SlotObject(_)) && to.div_id.is_none()));

        let result = client.create_ad_units(vec![to]);
        let summary = result
            .iter()
            .map(|m| {
                (
                    m.transaction_object.div_id.as_deref().unwrap_or_default(),
                    m.ad_unit.as_ref().and_then(|a| a.code()),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("div-top", Some("leaderboard")),
                ("div-side", Some("mpu")),
                ("div-bottom", None),
            ]
        );
    }

    #[test]
    fn synthesis_failure_keeps_transaction_object() {
        let client = client(vec![json!({"divPattern": "ad", "mediaTypes": "banner"})]);
        let result = client.create_ad_units(vec![
            TransactionObject::div("ad").with_sizes(vec![Size::new(300, 250)])
        ]);
        assert_eq!(result.len(), 1);
        assert!(result[0].ad_unit.is_none());
        assert_eq!(result[0].transaction_object.div_id.as_deref(), Some("ad"));
    }

    #[test]
    fn unmatched_transaction_objects_get_empty_display_fields() {
        let client = client(vec![]);
        let result = client.create_ad_units(vec![TransactionObject::div("ad")]);
        assert!(result[0].ad_unit.is_none());
        assert_eq!(result[0].transaction_object.div_id.as_deref(), Some(""));
        assert_eq!(result[0].transaction_object.slot_name.as_deref(), Some(""));
    }

    #[test]
    fn custom_mapping_applies_to_next_batch() {
        let client = client(vec![json!({"code": "ad", "divPattern": "ad"})]);
        assert!(client.create_ad_units(vec![TransactionObject::div("ad")])[0]
            .ad_unit
            .is_some());

        client.set_custom_mapping_function(|_: &TransactionObject, _: &AdUnitPattern| false);
        assert!(client.create_ad_units(vec![TransactionObject::div("ad")])[0]
            .ad_unit
            .is_none());
    }

    #[test]
    fn request_bids_reports_every_transaction_object() {
        let client = client(vec![
            json!({
                "code": "top",
                "slotPattern": "/1234/home",
                "divPattern": "div-top",
                "mediaTypes": {"banner": {"sizes": [[728, 90], [970, 250]]}},
                "bids": [{"bidder": "appnexus", "params": {"keywords": {"section": "##data.section##"}}}],
            }),
            json!({"code": "cached", "divPattern": "div-side"}),
        ]);

        let result = client.request_bids(vec![
            json!({"type": "div", "value": "div-top", "hbSource": "auction", "hbDestination": {"type": "gpt"}, "sizes": [728, 90], "targeting": {"section": "news"}}),
            json!({"type": "banner", "value": "x", "hbSource": "auction", "hbDestination": {"type": "gpt"}}),
            json!({"type": "div", "value": "div-side", "hbSource": "cache", "hbDestination": {"type": "callback"}}),
            json!({"type": "div", "value": "div-none", "hbSource": "auction", "hbDestination": {"type": "gpt"}}),
        ]);

        let statuses = result
            .transaction_results
            .iter()
            .map(|r| (r.error.is_some(), r.match_status.status))
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![(true, false), (false, true), (false, false), (false, true)]
        );
        assert_eq!(result.transaction_results[1].transaction_object["divId"], json!("div-top"));
        assert_eq!(
            result.transaction_results[1].match_status.aup.as_ref().unwrap()["code"],
            json!("top")
        );

        let batches = result
            .batches
            .iter()
            .map(|b| (b.source, b.destination, b.match_objects.len()))
            .collect::<Vec<_>>();
        assert_eq!(
            batches,
            vec![
                (HbSource::Auction, DestinationType::Gpt, 2),
                (HbSource::Cache, DestinationType::Callback, 1),
            ]
        );

        let top = result.batches[0].match_objects[0].ad_unit.as_ref().unwrap();
        assert_eq!(top.sizes(), Some(vec![Size::new(728, 90)]));
        assert_eq!(
            top.get("bids"),
            Some(&json!([{"bidder": "appnexus", "params": {"keywords": {"section": "news"}}}]))
        );
        assert_eq!(top.get("ortb2Imp").unwrap()["ext"]["data"]["pbadslot"], json!("/1234/home"));
    }

    #[test]
    fn request_bids_reports_failed_synthesis_as_unmatched() {
        let client = client(vec![json!({"divPattern": "ad", "mediaTypes": "banner"})]);
        let result = client.request_bids(vec![json!({
            "type": "div",
            "value": "ad",
            "hbSource": "auction",
            "hbDestination": {"type": "gpt"},
            "sizes": [[300, 250]],
        })]);

        assert_eq!(result.transaction_results.len(), 1);
        let status = &result.transaction_results[0].match_status;
        assert!(!status.status);
        assert_eq!(status.aup, None);
        assert!(result.batches[0].match_objects[0].ad_unit.is_none());
    }

    #[test]
    fn amazon_slots_use_client_ad_server() {
        let slots: Vec<Arc<dyn AdServerSlot>> = vec![FakeSlot::new("/1234/top", "div-top", vec![])];
        let client = ClientConfig::new()
            .ad_server(move || slots.clone())
            .ad_unit_patterns(vec![json!({"divPattern": "div-.*", "mediaTypes": {"banner": {"sizes": [[728, 90]]}}})])
            .to_client();

        let match_objects = client.create_ad_units(vec![TransactionObject::div("div-top")]);
        let amazon = client.create_amazon_slots(&match_objects);
        assert_eq!(amazon.len(), 1);
        assert_eq!(amazon[0].slot_id, "div-top");
        assert_eq!(amazon[0].slot_name, "/1234/top");
        assert_eq!(amazon[0].sizes, Some(vec![Size::new(728, 90)]));
    }

    #[test]
    fn concurrent_batches_share_store() {
        let client = client(vec![json!({"code": "ad", "divPattern": "ad"})]);
        let seen = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let result = client.create_ad_units(vec![TransactionObject::div("ad")]);
                    let code = result[0].ad_unit.as_ref().and_then(|a| a.code()).map(str::to_owned);
                    seen.lock().unwrap().push(code);
                });
            }
        });
        // the exclusivity lock is per batch, every batch gets the pattern
        assert!(seen
            .into_inner()
            .unwrap()
            .iter()
            .all(|code| code.as_deref() == Some("ad")));
    }
}
