use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};

pub const REASON_PROVISIONED: &str = "Provisioned";
pub const REASON_PROVISION_FAILED: &str = "ProvisionFailed";

pub fn store_obj_ref(
    ns: &str,
    name: &str,
    uid: Option<&str>,
) -> ObjectReference {
    ObjectReference {
        api_version: Some("stores.urumi.ai/v1alpha1".to_string()),
        kind: Some("Store".to_string()),
        name: Some(name.to_string()),
        namespace: Some(ns.to_string()),
        uid: uid.map(|u| u.to_string()),
        ..Default::default()
    }
}

/// Best-effort Kubernetes Event alongside the status ring buffer, which
/// stays the authoritative audit trail.
pub async fn emit_event(
    recorder: &Recorder,
    ns: &str,
    name: &str,
    uid: Option<&str>,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let _ = recorder
        .publish(
            &Event {
                type_,
                reason: reason.into(),
                note,
                action: action.into(),
                secondary: None,
            },
            &store_obj_ref(ns, name, uid),
        )
        .await;
}
