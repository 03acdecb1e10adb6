use chrono::Utc;
use kube::ResourceExt;
use kube::api::{Api, Patch, PatchParams, PostParams};
use serde_json::json;
use tracing::debug;

use crate::crd::store::{Store, StoreEvent, StoreEventType, StoreStatus};

/// While this finalizer is present, backing cluster resources may still
/// exist; its removal is the only teardown-complete signal.
pub const FINALIZER: &str = "stores.urumi.ai/finalizer";

const CONFLICT_RETRIES: usize = 3;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Append to the bounded audit trail; the capacity clamp runs on write.
pub fn push_event(
    status: &mut StoreStatus,
    type_: StoreEventType,
    message: impl Into<String>,
) {
    status.events.push(StoreEvent {
        type_,
        message: message.into(),
        timestamp: now_rfc3339(),
    });
}

fn clamp_events(status: &mut StoreStatus, cap: usize) {
    if status.events.len() > cap {
        let excess = status.events.len() - cap;
        status.events.drain(..excess);
    }
}

/// Read-modify-write of the status subresource under the object's own
/// resourceVersion, retried on write conflicts. Replacing the whole status
/// also sheds stray fields older writers may have left behind (credentials
/// never persist in status). A missing object is not an error: status
/// writes race with deletion.
pub async fn patch_status<F>(
    api: &Api<Store>,
    name: &str,
    max_events: usize,
    mutate: F,
) -> Result<(), kube::Error>
where
    F: Fn(&mut StoreStatus),
{
    let mut attempt = 0;
    loop {
        let Some(mut obj) = api.get_opt(name).await? else {
            return Ok(());
        };
        let mut status = obj.status.take().unwrap_or_default();
        let now = now_rfc3339();
        if status.created_at.is_none() {
            status.created_at = Some(now.clone());
        }
        status.updated_at = Some(now);
        mutate(&mut status);
        clamp_events(&mut status, max_events);
        obj.status = Some(status);

        let data = match serde_json::to_vec(&obj) {
            Ok(d) => d,
            Err(e) => return Err(kube::Error::SerdeError(e)),
        };
        match api.replace_status(name, &PostParams::default(), data).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(ae))
                if ae.code == 409 && attempt < CONFLICT_RETRIES =>
            {
                attempt += 1;
                debug!(%name, attempt, "status write conflict; refetching");
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Idempotent; must run before the first mutating provisioning step so a
/// crash mid-provision still leaves the resource queued for teardown.
pub async fn ensure_finalizer(
    api: &Api<Store>,
    obj: &Store,
) -> Result<(), kube::Error> {
    let present = obj
        .metadata
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|x| x == FINALIZER))
        .unwrap_or(false);
    if present {
        return Ok(());
    }
    let mut finalizers = obj.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());
    let patch = json!({"metadata": {"finalizers": finalizers}});
    api.patch(
        &obj.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

pub async fn remove_finalizer(
    api: &Api<Store>,
    name: &str,
) -> Result<(), kube::Error> {
    let Some(obj) = api.get_opt(name).await? else {
        return Ok(());
    };
    let Some(finalizers) = obj.metadata.finalizers else {
        return Ok(());
    };
    if !finalizers.iter().any(|f| f == FINALIZER) {
        return Ok(());
    }
    let remaining: Vec<String> =
        finalizers.into_iter().filter(|f| f != FINALIZER).collect();
    let patch = json!({"metadata": {"finalizers": remaining}});
    match api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e),
    }
}
