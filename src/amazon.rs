//! Slot descriptors for Amazon (APS) bid requests.
use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::{ad_server::AdServer, client::MatchObject, sizes::Size};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmazonSlot {
    #[serde(rename = "slotID")]
    pub slot_id: String,
    pub slot_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<Size>>,
}

/// Build one [`AmazonSlot`] per match object that has both a div id and a slot name.
///
/// The div id is `hbDestination.values.div`, falling back to the resolved div id. The slot name is
/// the resolved slot name, falling back to the ad unit path of the ad server slot rendering into
/// that div.
pub fn create_amazon_slots(
    match_objects: &[MatchObject],
    ad_server: &dyn AdServer,
) -> Vec<AmazonSlot> {
    let mut paths_by_element_id: Option<HashMap<String, String>> = None;

    match_objects
        .iter()
        .filter_map(|match_object| {
            let to = &match_object.transaction_object;
            let slot_id = to
                .destination
                .values
                .get("div")
                .and_then(Value::as_str)
                .filter(|div| !div.is_empty())
                .map(str::to_owned)
                .or_else(|| to.div_id.clone().filter(|div| !div.is_empty()));

            let slot_name = to.slot_name.clone().filter(|name| !name.is_empty()).or_else(|| {
                let slot_id = slot_id.as_deref()?;
                paths_by_element_id
                    .get_or_insert_with(|| {
                        ad_server
                            .slots()
                            .iter()
                            .map(|slot| (slot.element_id(), slot.ad_unit_path()))
                            .collect()
                    })
                    .get(slot_id)
                    .cloned()
            });

            let (Some(slot_id), Some(slot_name)) = (slot_id, slot_name) else {
                log::warn!(target: "ppi",
                           transaction_object:serde = to;
                           "couldn't find div id or slot name, will not request bids from amazon for this transaction object");
                return None;
            };

            Some(AmazonSlot {
                slot_id,
                slot_name,
                sizes: match_object.ad_unit.as_ref().and_then(|ad_unit| ad_unit.sizes()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{create_amazon_slots, AmazonSlot};
    use crate::{
        ad_server::{testing::FakeSlot, AdServerSlot},
        ad_unit::create_ad_unit,
        client::MatchObject,
        pattern::AdUnitPattern,
        transaction::HbDestination,
        DestinationType, Size, TransactionObject,
    };

    fn resolved(to: TransactionObject, div_id: &str, slot_name: &str) -> TransactionObject {
        TransactionObject {
            div_id: Some(div_id.to_owned()),
            slot_name: Some(slot_name.to_owned()),
            ..to
        }
    }

    #[test]
    fn builds_slots_from_resolved_fields() {
        let pattern = AdUnitPattern::compile(&json!({"divPattern": "ad"})).unwrap();
        let ad_server = || -> Vec<Arc<dyn AdServerSlot>> { vec![] };
        let match_objects = vec![MatchObject {
            transaction_object: resolved(TransactionObject::div("div-1"), "div-1", "/1234/home"),
            ad_unit: create_ad_unit(&pattern, &[Size::new(300, 250)]),
        }];

        assert_eq!(
            create_amazon_slots(&match_objects, &ad_server),
            vec![AmazonSlot {
                slot_id: "div-1".to_owned(),
                slot_name: "/1234/home".to_owned(),
                sizes: Some(vec![Size::new(300, 250)]),
            }]
        );
    }

    #[test]
    fn falls_back_to_ad_server_mapping() {
        let ad_server = || vec![FakeSlot::new("/1234/sidebar", "div-side", vec![])];
        let destination = HbDestination {
            kind: DestinationType::Gpt,
            values: json!({"div": "div-side"}).as_object().unwrap().clone(),
        };
        let match_objects = vec![
            MatchObject {
                transaction_object: resolved(TransactionObject::div("x"), "", "")
                    .with_destination(destination),
                ad_unit: None,
            },
            MatchObject {
                transaction_object: resolved(TransactionObject::div("div-unknown"), "div-unknown", ""),
                ad_unit: None,
            },
        ];

        let slots = create_amazon_slots(&match_objects, &ad_server);
        assert_eq!(
            slots,
            vec![AmazonSlot {
                slot_id: "div-side".to_owned(),
                slot_name: "/1234/sidebar".to_owned(),
                sizes: None,
            }]
        );
        assert_eq!(
            serde_json::to_value(&slots[0]).unwrap(),
            json!({"slotID": "div-side", "slotName": "/1234/sidebar"})
        );
    }
}
