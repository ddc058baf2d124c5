//! Place records.

use crate::error::{ModelError, ModelResult};
use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Open property map of a record.
pub type Properties = Map<String, Value>;

/// Property holding the remote endpoint of a persisted record.
pub const URL_PROPERTY: &str = "url";

/// Default property used to store the source identifier on remote records.
pub const DEFAULT_SOURCE_ID_FIELD: &str = "_imported_id";

/// Identifier assigned by the remote system on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    /// Numeric identifier.
    Int(i64),
    /// Textual identifier.
    Text(String),
}

impl RemoteId {
    /// Reads an identifier from a JSON value.
    ///
    /// Returns `None` for anything other than an integer or a non-empty string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RemoteId::Int),
            Value::String(s) if !s.is_empty() => Some(RemoteId::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            RemoteId::Int(n) => Value::from(*n),
            RemoteId::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Int(n) => write!(f, "{}", n),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

/// Whether a record is known to the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Not yet persisted remotely; saving it creates it.
    #[default]
    Unsynced,
    /// Persisted remotely; saving it updates `endpoint`.
    Synced {
        /// Remote identifier.
        identifier: RemoteId,
        /// Remote update/delete URL.
        endpoint: String,
    },
}

impl SyncState {
    /// Returns true if the record has been persisted remotely.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced { .. })
    }
}

/// A geographic place record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Remote identity.
    pub state: SyncState,
    /// Key from the originating local source, used to correlate across runs.
    pub source_identifier: Option<String>,
    /// Optional shape.
    pub geometry: Option<Geometry>,
    /// Domain attributes. Never contains [`URL_PROPERTY`]; the endpoint lives in `state`.
    pub properties: Properties,
}

impl Record {
    /// Creates an unsynced record.
    pub fn new(geometry: Option<Geometry>, properties: Properties) -> Self {
        Self {
            state: SyncState::Unsynced,
            source_identifier: None,
            geometry,
            properties,
        }
    }

    /// Decodes a record from a GeoJSON feature.
    ///
    /// The identifier is taken from the top-level `id`, falling back to
    /// `properties.id`. The record is `Synced` only when both an identifier
    /// and `properties.url` are present.
    pub fn from_feature(feature: Value) -> ModelResult<Self> {
        let Value::Object(mut feature) = feature else {
            return Err(ModelError::malformed("feature is not an object"));
        };

        let mut properties = match feature.remove("properties") {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Properties::new(),
            Some(_) => return Err(ModelError::malformed("properties is not an object")),
        };

        let geometry = match feature.remove("geometry") {
            Some(Value::Null) | None => None,
            Some(value) => Some(serde_json::from_value(value)?),
        };

        let identifier = feature
            .get("id")
            .and_then(RemoteId::from_value)
            .or_else(|| properties.get("id").and_then(RemoteId::from_value));

        let endpoint = match properties.remove(URL_PROPERTY) {
            Some(Value::String(url)) if !url.is_empty() => Some(url),
            _ => None,
        };

        let state = match (identifier, endpoint) {
            (Some(identifier), Some(endpoint)) => SyncState::Synced {
                identifier,
                endpoint,
            },
            _ => SyncState::Unsynced,
        };

        Ok(Self {
            state,
            source_identifier: None,
            geometry,
            properties,
        })
    }

    /// Decodes a record from a JSON response body.
    pub fn from_slice(body: &[u8]) -> ModelResult<Self> {
        Self::from_feature(serde_json::from_slice(body)?)
    }

    /// Encodes the record as a GeoJSON feature.
    ///
    /// Synced records carry their `id` and `properties.url`.
    pub fn to_feature(&self) -> Value {
        let mut feature = Map::new();
        feature.insert("type".into(), Value::from("Feature"));

        let mut properties = self.properties.clone();
        if let SyncState::Synced {
            identifier,
            endpoint,
        } = &self.state
        {
            feature.insert("id".into(), identifier.to_value());
            properties.insert(URL_PROPERTY.into(), Value::from(endpoint.clone()));
        }

        let geometry = self
            .geometry
            .as_ref()
            .and_then(|g| serde_json::to_value(g).ok())
            .unwrap_or(Value::Null);
        feature.insert("geometry".into(), geometry);
        feature.insert("properties".into(), Value::Object(properties));

        Value::Object(feature)
    }

    /// Encodes the record as a JSON request body.
    pub fn to_body(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_feature())?)
    }

    /// Returns the remote identifier, if synced.
    pub fn identifier(&self) -> Option<&RemoteId> {
        match &self.state {
            SyncState::Synced { identifier, .. } => Some(identifier),
            SyncState::Unsynced => None,
        }
    }

    /// Returns the remote update URL, if synced.
    pub fn endpoint(&self) -> Option<&str> {
        match &self.state {
            SyncState::Synced { endpoint, .. } => Some(endpoint),
            SyncState::Unsynced => None,
        }
    }

    /// Returns true if the record has been persisted remotely.
    pub fn is_synced(&self) -> bool {
        self.state.is_synced()
    }

    /// Marks the record as persisted at `endpoint`.
    pub fn mark_synced(&mut self, identifier: RemoteId, endpoint: impl Into<String>) {
        self.state = SyncState::Synced {
            identifier,
            endpoint: endpoint.into(),
        };
    }

    /// Gets a property value.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Renders a property as text: strings verbatim, other scalars via JSON.
    pub fn property_text(&self, name: &str) -> Option<String> {
        self.properties.get(name).and_then(scalar_text)
    }

    /// Returns a short label for progress and error messages.
    pub fn label(&self) -> String {
        match (&self.state, &self.source_identifier) {
            (SyncState::Synced { identifier, .. }, _) => format!("place {}", identifier),
            (SyncState::Unsynced, Some(source)) => format!("source record {}", source),
            (SyncState::Unsynced, None) => "new place".to_string(),
        }
    }
}

/// Text form of a scalar JSON value. Null and containers yield `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
