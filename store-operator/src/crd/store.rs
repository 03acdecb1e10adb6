use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declarative record of one tenant store: the spec carries the intent
/// written by the request layer, the status carries everything the
/// controller observed or derived while driving the cluster toward it.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "stores.urumi.ai",
    version = "v1alpha1",
    kind = "Store",
    plural = "stores",
    namespaced,
    status = "StoreStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct StoreSpec {
    /// Tenant identifier used verbatim in derived names (namespace, host,
    /// release). DNS-label-safe, validated by the request layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    /// Selects the engine handler. Immutable once created; recreating the
    /// same id with a different engine is a conflict in the request layer.
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Caller provenance attached at creation time, used only for quota
    /// accounting in the request layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<RequestedBy>,
}

fn default_engine() -> String {
    "woocommerce".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestedBy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<StorePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<String>,
    /// Cleared on success, set verbatim on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Last spec generation that reconciled to a terminal outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Bounded audit trail; capacity is enforced on every status write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<StoreEvent>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq,
)]
pub enum StorePhase {
    #[default]
    Provisioning,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

impl std::fmt::Display for StorePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StorePhase::Provisioning => "Provisioning",
            StorePhase::Ready => "Ready",
            StorePhase::Failed => "Failed",
            StorePhase::Deleting => "Deleting",
            StorePhase::Deleted => "Deleted",
        };
        write!(f, "{}", s)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct StoreEvent {
    #[serde(rename = "type")]
    pub type_: StoreEventType,
    pub message: String,
    pub timestamp: String,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
pub enum StoreEventType {
    ProvisioningStarted,
    NamespaceReady,
    HelmInstallStarted,
    Ready,
    Failed,
    Deleting,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl Store {
    /// Tenant identifier, falling back to the object name when the spec
    /// omits it.
    pub fn store_id(&self) -> String {
        self.spec
            .store_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spec_defaults_engine_to_woocommerce() {
        let spec: StoreSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(spec.engine, "woocommerce");
        assert!(spec.store_id.is_none());
    }

    #[test]
    fn store_id_falls_back_to_object_name() {
        let spec: StoreSpec =
            serde_json::from_value(json!({ "engine": "medusa" })).unwrap();
        let store = Store::new("acme-1", spec);
        assert_eq!(store.store_id(), "acme-1");

        let spec: StoreSpec =
            serde_json::from_value(json!({ "storeId": "acme-2" })).unwrap();
        let store = Store::new("other-name", spec);
        assert_eq!(store.store_id(), "acme-2");
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = StoreStatus {
            phase: Some(StorePhase::Ready),
            release_name: Some("woocommerce-acme-1".into()),
            observed_generation: Some(3),
            ..Default::default()
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["phase"], "Ready");
        assert_eq!(v["releaseName"], "woocommerce-acme-1");
        assert_eq!(v["observedGeneration"], 3);
    }

    #[test]
    fn event_type_uses_wire_names_and_tolerates_unknown() {
        let ev = StoreEvent {
            type_: StoreEventType::ProvisioningStarted,
            message: "Starting reconcile for woocommerce".into(),
            timestamp: "2024-01-01T00:00:00+00:00".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "ProvisioningStarted");

        let ev: StoreEvent = serde_json::from_value(json!({
            "type": "SomethingNew",
            "message": "m",
            "timestamp": "t"
        }))
        .unwrap();
        assert_eq!(ev.type_, StoreEventType::Unknown);
    }
}
