use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{info, instrument, warn};

use crate::crd::store::{Store, StoreEventType, StorePhase};
use crate::engines::{EngineHandler, InstallRequest};
use crate::provision::{credentials, namespace};

use super::events::{REASON_PROVISION_FAILED, REASON_PROVISIONED, emit_event};
use super::status::{
    ensure_finalizer, now_rfc3339, patch_status, push_event, remove_finalizer,
};
use super::{ControllerContext, ReconcileErr};

/// Single entry point for create, resume and delete notifications; the
/// deletion timestamp selects the teardown branch. Safe to re-invoke for
/// the same object at any point: every step is create-or-patch.
#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), store = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<Store>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_default();
    if ns != ctx.cfg.platform_namespace {
        // Stores outside the platform namespace are not ours to manage.
        return Ok(Action::await_change());
    }

    if obj.meta().deletion_timestamp.is_some() {
        return teardown(&obj, &ctx).await;
    }

    // Resume fast path: a Ready store at the reconciled generation needs
    // no cluster calls at all.
    let generation = obj.meta().generation.unwrap_or(0);
    if let Some(status) = obj.status.as_ref() {
        if status.phase == Some(StorePhase::Ready)
            && status.observed_generation == Some(generation)
        {
            return Ok(Action::await_change());
        }
    }

    provision(&obj, &ctx).await?;
    Ok(Action::await_change())
}

async fn provision(
    obj: &Store,
    ctx: &ControllerContext,
) -> Result<(), ReconcileErr> {
    let name = obj.name_any();
    let uid = obj.uid();
    let api = ctx.store_api();
    let max_events = ctx.cfg.max_status_events;

    let engine = obj.spec.engine.clone();
    let Some(handler) = ctx.engines.get(&engine) else {
        let msg = format!("Unsupported engine '{}'", engine);
        patch_status(&api, &name, max_events, |st| {
            st.phase = Some(StorePhase::Failed);
            st.last_error = Some(msg.clone());
            push_event(st, StoreEventType::Failed, msg.clone());
        })
        .await?;
        emit_event(
            &ctx.recorder,
            &ctx.cfg.platform_namespace,
            &name,
            uid.as_deref(),
            EventType::Warning,
            REASON_PROVISION_FAILED,
            "Provision",
            Some(msg),
        )
        .await;
        return Err(ReconcileErr::UnsupportedEngine(engine));
    };

    let store_id = obj.store_id();
    let store_ns = ctx.cfg.store_namespace(&store_id);
    let url = ctx.cfg.store_url(&store_id);
    let release = handler.release_name(&store_id);
    let generation = obj.meta().generation.unwrap_or(0);

    // Finalizer before the first mutating step: a crash mid-provision must
    // still leave the resource queued for teardown.
    ensure_finalizer(&api, obj).await?;

    info!(%store_ns, %release, engine = %handler.name(), "provisioning store");
    patch_status(&api, &name, max_events, |st| {
        st.phase = Some(StorePhase::Provisioning);
        st.url = Some(url.clone());
        st.namespace = Some(store_ns.clone());
        st.release_name = Some(release.clone());
        st.observed_generation = Some(generation);
        st.last_error = None;
        push_event(
            st,
            StoreEventType::ProvisioningStarted,
            format!("Starting reconcile for {}", engine),
        );
    })
    .await?;

    let permit = match ctx.gate.acquire(ctx.cfg.provision_timeout()).await {
        Ok(permit) => permit,
        Err(timeout) => {
            warn!(%store_ns, ?timeout, "provisioning gate saturated");
            let msg = "Provisioning lock timeout".to_string();
            patch_status(&api, &name, max_events, |st| {
                st.phase = Some(StorePhase::Failed);
                st.last_error = Some(msg.clone());
                push_event(st, StoreEventType::Failed, msg.clone());
            })
            .await?;
            return Err(ReconcileErr::GateTimeout);
        }
    };

    let result =
        install(obj, ctx, handler.as_ref(), &store_id, &store_ns, &release)
            .await;
    // Permit drops here on every path, returning the gate slot.
    drop(permit);

    match result {
        Ok(()) => {
            patch_status(&api, &name, max_events, |st| {
                st.phase = Some(StorePhase::Ready);
                st.url = Some(url.clone());
                st.ready_at = Some(now_rfc3339());
                st.release_name = Some(release.clone());
                st.namespace = Some(store_ns.clone());
                st.observed_generation = Some(generation);
                st.last_error = None;
                push_event(
                    st,
                    StoreEventType::Ready,
                    format!("Store ready at {}", url),
                );
            })
            .await?;
            emit_event(
                &ctx.recorder,
                &ctx.cfg.platform_namespace,
                &name,
                uid.as_deref(),
                EventType::Normal,
                REASON_PROVISIONED,
                "Provision",
                Some(format!("Store ready at {}", url)),
            )
            .await;
            info!(%store_ns, %release, "store ready");
            Ok(())
        }
        Err(e) => {
            let msg = e.to_string();
            patch_status(&api, &name, max_events, |st| {
                st.phase = Some(StorePhase::Failed);
                st.last_error = Some(msg.clone());
                st.release_name = Some(release.clone());
                st.namespace = Some(store_ns.clone());
                st.observed_generation = Some(generation);
                push_event(st, StoreEventType::Failed, msg.clone());
            })
            .await?;
            emit_event(
                &ctx.recorder,
                &ctx.cfg.platform_namespace,
                &name,
                uid.as_deref(),
                EventType::Warning,
                REASON_PROVISION_FAILED,
                "Provision",
                Some(msg),
            )
            .await;
            Err(e)
        }
    }
}

/// The gate-guarded section: namespace, isolation, credentials, install,
/// post-ready hook. Each step is idempotent.
async fn install(
    obj: &Store,
    ctx: &ControllerContext,
    handler: &dyn EngineHandler,
    store_id: &str,
    store_ns: &str,
    release: &str,
) -> Result<(), ReconcileErr> {
    let name = obj.name_any();
    let api = ctx.store_api();
    let max_events = ctx.cfg.max_status_events;
    let host = ctx.cfg.store_host(store_id);

    patch_status(&api, &name, max_events, |st| {
        st.namespace = Some(store_ns.to_string());
        push_event(
            st,
            StoreEventType::NamespaceReady,
            format!("Ensuring namespace {}", store_ns),
        );
    })
    .await?;
    namespace::ensure_namespace(&ctx.client, store_ns, store_id).await?;
    namespace::ensure_isolation(&ctx.client, &ctx.cfg, store_ns).await?;

    let creds = credentials::ensure_admin_credentials(
        &ctx.client,
        store_ns,
        store_id,
        &ctx.cfg.admin_secret_name,
    )
    .await?;

    patch_status(&api, &name, max_events, |st| {
        push_event(
            st,
            StoreEventType::HelmInstallStarted,
            format!("Installing/upgrading release {}", release),
        );
    })
    .await?;

    let parameters = handler.install_parameters(&InstallRequest {
        store_id,
        namespace: store_ns,
        host: &host,
        admin_user: &creds.username,
        admin_password: &creds.password,
        ingress_class: &ctx.cfg.ingress_class,
        storage_class: ctx.cfg.storage_class(),
    });
    ctx.helm
        .apply_release(
            release,
            handler.chart_ref(),
            store_ns,
            &parameters,
            ctx.cfg.provision_timeout(),
        )
        .await?;

    handler.post_ready_check(store_id, store_ns).await?;
    Ok(())
}

/// Teardown is idempotent and must never leave the finalizer stuck when
/// avoidable: the finalizer comes off even when cleanup failed part-way,
/// and a failed removal itself surfaces as retryable so the framework
/// requeues instead of leaving it dangling.
async fn teardown(
    obj: &Store,
    ctx: &ControllerContext,
) -> Result<Action, ReconcileErr> {
    let name = obj.name_any();
    let api = ctx.store_api();
    let max_events = ctx.cfg.max_status_events;

    // Fall back to the primary engine so cleanup is still attempted for an
    // unrecognized spec.engine.
    let handler = ctx.engines.get_or_primary(&obj.spec.engine);
    let store_id = obj.store_id();
    let store_ns = ctx.cfg.store_namespace(&store_id);
    let release = handler.release_name(&store_id);

    info!(%store_ns, %release, "tearing down store");
    let result = async {
        patch_status(&api, &name, max_events, |st| {
            st.phase = Some(StorePhase::Deleting);
            st.namespace = Some(store_ns.clone());
            st.release_name = Some(release.clone());
            push_event(
                st,
                StoreEventType::Deleting,
                format!("Deleting {}", release),
            );
        })
        .await?;

        // An absent or broken release is not a teardown blocker.
        if let Err(e) = ctx.helm.remove_release(&release, &store_ns).await {
            warn!(%release, error = %e, "helm uninstall failed; continuing teardown");
        }

        if namespace::namespace_is_owned(
            &ctx.client,
            &ctx.cfg.store_ns_prefix,
            &store_ns,
            &store_id,
        )
        .await?
        {
            let ns_api: Api<Namespace> = Api::all(ctx.client.clone());
            match ns_api.delete(&store_ns, &DeleteParams::default()).await {
                Ok(_) => info!(%store_ns, "tenant namespace deleted"),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => return Err(ReconcileErr::from(e)),
            }
        } else {
            warn!(%store_ns, "namespace not owned by this store; leaving it intact");
        }

        patch_status(&api, &name, max_events, |st| {
            st.phase = Some(StorePhase::Deleted);
            push_event(
                st,
                StoreEventType::Deleted,
                format!("Deleted resources for {}", store_id),
            );
        })
        .await?;
        Ok::<(), ReconcileErr>(())
    }
    .await;

    if let Err(e) = remove_finalizer(&api, &name).await {
        warn!(error = %e, "finalizer removal failed; will retry");
        return Err(ReconcileErr::from(e));
    }

    result?;
    Ok(Action::await_change())
}
