use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ad_server::{AdServer, NoAdServer},
    Client, CustomMapping, Result,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use ppi::{AdUnitPattern, ClientConfig, TransactionObject};
/// # use serde_json::json;
/// let client = ClientConfig::new()
///     .ad_unit_patterns(vec![json!({"divPattern": "^div-gpt-ad-\\d+$"})])
///     .custom_mapping(|_: &TransactionObject, pattern: &AdUnitPattern| pattern.code() != Some("disabled"))
///     .to_client();
/// ```
pub struct ClientConfig<'a> {
    pub(crate) ad_server: Box<dyn AdServer + Send + Sync + 'a>,
    pub(crate) custom_mapping: Option<Arc<dyn CustomMapping + Send + Sync + 'a>>,
    pub(crate) ad_unit_patterns: Vec<Value>,
}

impl<'a> ClientConfig<'a> {
    /// Create a configuration without patterns, custom mapping, or ad server. Auto slots expand
    /// to nothing until an ad server is set.
    pub fn new() -> Self {
        ClientConfig {
            ad_server: Box::new(NoAdServer),
            custom_mapping: None,
            ad_unit_patterns: Vec::new(),
        }
    }

    /// Set the ad server used to expand auto slots and to look up slot names.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use ppi::{AdServerSlot, ClientConfig};
    /// let config = ClientConfig::new().ad_server(|| -> Vec<Arc<dyn AdServerSlot>> { Vec::new() });
    /// ```
    pub fn ad_server(mut self, ad_server: impl AdServer + Send + Sync + 'a) -> Self {
        self.ad_server = Box::new(ad_server);
        self
    }

    /// Set the custom mapping function. See [`CustomMapping`].
    pub fn custom_mapping(mut self, custom_mapping: impl CustomMapping + Send + Sync + 'a) -> Self {
        self.custom_mapping = Some(Arc::new(custom_mapping));
        self
    }

    /// Add raw ad unit patterns, validated when the client is created.
    pub fn ad_unit_patterns(mut self, patterns: impl IntoIterator<Item = Value>) -> Self {
        self.ad_unit_patterns.extend(patterns);
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use ppi::{ClientConfig, Client};
    /// let client: Client = ClientConfig::new().to_client();
    /// ```
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}

impl<'a> Default for ClientConfig<'a> {
    fn default() -> Self {
        ClientConfig::new()
    }
}

/// Pattern configuration document, `{"adUnitPatterns": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternsConfig {
    pub ad_unit_patterns: Vec<TryParse<Map<String, Value>>>,
}

/// `TryParse` allows an entry to fail parsing without failing the parsing of the whole document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    Parsed(T),
    ParseFailed(Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl PatternsConfig {
    pub fn from_json(json: &[u8]) -> Result<PatternsConfig> {
        Ok(serde_json::from_slice(json)?)
    }

    /// Pattern objects of the document. Entries that aren't JSON objects are logged and skipped.
    pub fn into_patterns(self) -> Vec<Value> {
        self.ad_unit_patterns
            .into_iter()
            .filter_map(|entry| match entry {
                TryParse::Parsed(pattern) => Some(Value::Object(pattern)),
                TryParse::ParseFailed(value) => {
                    log::error!(target: "ppi",
                                pattern:serde = value;
                                "ad unit pattern should be an object, skipping it");
                    None
                }
            })
            .collect()
    }
}
