#![allow(dead_code)]

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::{
    Client,
    api::{Api, Patch, PatchParams},
};
use tokio::task::JoinHandle;

use store_operator::crd::store::{Store, StorePhase};

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

// Env guard utilities
pub struct EnvGuard {
    key: &'static str,
    old: Option<String>,
}
impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.old {
                std::env::set_var(self.key, v);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }
}
pub fn set_env(key: &'static str, val: &str) -> EnvGuard {
    let old = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard { key, old }
}

/// Aborts the background controller task when the test ends.
pub struct ControllerGuard(pub JoinHandle<()>);
impl Drop for ControllerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub async fn wait_for_phase(
    api: &Api<Store>,
    name: &str,
    phase: StorePhase,
    secs: u32,
) -> bool {
    for _ in 0..secs {
        if let Ok(Some(store)) = api.get_opt(name).await {
            if store.status.as_ref().and_then(|s| s.phase) == Some(phase) {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    false
}

pub async fn wait_for_gone(api: &Api<Store>, name: &str, secs: u32) -> bool {
    for _ in 0..secs {
        if api.get_opt(name).await.map(|o| o.is_none()).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    false
}

/// Best-effort removal of the Store (finalizer stripped if teardown is
/// wedged) and its tenant namespace.
pub async fn cleanup(
    client: Client,
    platform_ns: &str,
    name: &str,
    store_ns: &str,
) {
    let api: Api<Store> = Api::namespaced(client.clone(), platform_ns);
    let _ = api.delete(name, &Default::default()).await;
    if let Ok(Some(_)) = api.get_opt(name).await {
        let patch = serde_json::json!({"metadata": {"finalizers": []}});
        let _ = api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await;
    }
    let ns_api: Api<Namespace> = Api::all(client);
    let _ = ns_api.delete(store_ns, &Default::default()).await;
}
