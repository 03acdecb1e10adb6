// Integration tests require a running Kubernetes cluster with the Store CRD
// applied (`cargo run --bin crdgen | kubectl apply -f -`). The installer is
// stubbed with HELM_BIN=true so no charts are needed. Ignored by default.

use envconfig::Envconfig;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::{
    Client,
    api::{Api, Patch, PatchParams, PostParams},
};

use store_operator::config::OperatorConfig;
use store_operator::controller::run_controller;
use store_operator::crd::store::{Store, StorePhase, StoreSpec};
use store_operator::provision::namespace::{MANAGED_LABEL, STORE_ID_LABEL};

mod common;
use common::{
    ControllerGuard, cleanup, set_env, uniq, wait_for_gone, wait_for_phase,
};

fn spawn_controller(client: &Client, cfg: &OperatorConfig) -> ControllerGuard {
    let client = client.clone();
    let cfg = cfg.clone();
    ControllerGuard(tokio::spawn(async move {
        let _ = run_controller(client, cfg).await;
    }))
}

#[test_log::test(tokio::test)]
#[ignore]
async fn store_reaches_ready_with_stub_installer() {
    let _g1 = set_env("PLATFORM_NAMESPACE", "default");
    let _g2 = set_env("HELM_BIN", "true");
    let client = Client::try_default().await.expect("kube client");
    let cfg = OperatorConfig::init_from_env().expect("config");

    let name = uniq("store-it-ready");
    let store_ns = cfg.store_namespace(&name);
    let api: Api<Store> = Api::namespaced(client.clone(), "default");
    let store = Store::new(
        &name,
        StoreSpec {
            store_id: None,
            engine: "woocommerce".into(),
            requested_by: None,
        },
    );
    api.create(&PostParams::default(), &store)
        .await
        .expect("create store");

    let _guard = spawn_controller(&client, &cfg);

    assert!(
        wait_for_phase(&api, &name, StorePhase::Ready, 60).await,
        "store should reach Ready"
    );

    let got = api.get(&name).await.expect("get store");
    let status = got.status.clone().unwrap();
    assert_eq!(status.url.as_deref(), Some(cfg.store_url(&name).as_str()));
    assert_eq!(status.namespace.as_deref(), Some(store_ns.as_str()));
    assert!(status.last_error.is_none());
    assert!(status.ready_at.is_some());
    assert!(
        got.metadata
            .finalizers
            .unwrap_or_default()
            .iter()
            .any(|f| f == "stores.urumi.ai/finalizer"),
        "finalizer should be attached while resources exist"
    );

    // Tenant namespace carries the ownership labels and the admin secret.
    let ns_api: Api<Namespace> = Api::all(client.clone());
    let ns_obj = ns_api.get(&store_ns).await.expect("tenant namespace");
    let labels = ns_obj.metadata.labels.unwrap_or_default();
    assert_eq!(labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
    assert_eq!(
        labels.get(STORE_ID_LABEL).map(String::as_str),
        Some(name.as_str())
    );

    let sec_api: Api<Secret> = Api::namespaced(client.clone(), &store_ns);
    let secret = sec_api
        .get(&cfg.admin_secret_name)
        .await
        .expect("admin secret");
    let data = secret.data.unwrap_or_default();
    assert!(data.contains_key("username"));
    assert!(data.contains_key("password"));

    // Delete: uninstall is stubbed, the namespace is owned, so the Store
    // must fully disappear and the namespace must start terminating.
    api.delete(&name, &Default::default())
        .await
        .expect("delete store");
    assert!(
        wait_for_gone(&api, &name, 60).await,
        "store should be fully removed"
    );
    let ns_after = ns_api.get_opt(&store_ns).await.expect("get namespace");
    assert!(
        ns_after
            .map(|n| n.metadata.deletion_timestamp.is_some())
            .unwrap_or(true),
        "tenant namespace should be deleted or terminating"
    );

    cleanup(client, "default", &name, &store_ns).await;
}

#[test_log::test(tokio::test)]
#[ignore]
async fn unsupported_engine_fails_without_side_effects() {
    let _g1 = set_env("PLATFORM_NAMESPACE", "default");
    let _g2 = set_env("HELM_BIN", "true");
    let client = Client::try_default().await.expect("kube client");
    let cfg = OperatorConfig::init_from_env().expect("config");

    let name = uniq("store-it-badengine");
    let store_ns = cfg.store_namespace(&name);
    let api: Api<Store> = Api::namespaced(client.clone(), "default");
    let store = Store::new(
        &name,
        StoreSpec {
            store_id: None,
            engine: "shopify".into(),
            requested_by: None,
        },
    );
    api.create(&PostParams::default(), &store)
        .await
        .expect("create store");

    let _guard = spawn_controller(&client, &cfg);

    assert!(
        wait_for_phase(&api, &name, StorePhase::Failed, 30).await,
        "store should reach Failed"
    );

    let got = api.get(&name).await.expect("get store");
    let status = got.status.clone().unwrap();
    assert!(
        status
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("Unsupported engine 'shopify'")
    );
    // The misconfiguration path stops before any mutating step.
    assert!(got.metadata.finalizers.unwrap_or_default().is_empty());
    let ns_api: Api<Namespace> = Api::all(client.clone());
    assert!(
        ns_api
            .get_opt(&store_ns)
            .await
            .expect("get namespace")
            .is_none(),
        "no tenant namespace should exist"
    );

    api.delete(&name, &Default::default())
        .await
        .expect("delete store");
    assert!(wait_for_gone(&api, &name, 30).await);

    cleanup(client, "default", &name, &store_ns).await;
}

#[test_log::test(tokio::test)]
#[ignore]
async fn delete_leaves_tampered_namespace_intact() {
    let _g1 = set_env("PLATFORM_NAMESPACE", "default");
    let _g2 = set_env("HELM_BIN", "true");
    let client = Client::try_default().await.expect("kube client");
    let cfg = OperatorConfig::init_from_env().expect("config");

    let name = uniq("store-it-tamper");
    let store_ns = cfg.store_namespace(&name);
    let api: Api<Store> = Api::namespaced(client.clone(), "default");
    let store = Store::new(
        &name,
        StoreSpec {
            store_id: None,
            engine: "woocommerce".into(),
            requested_by: None,
        },
    );
    api.create(&PostParams::default(), &store)
        .await
        .expect("create store");

    let _guard = spawn_controller(&client, &cfg);

    assert!(
        wait_for_phase(&api, &name, StorePhase::Ready, 60).await,
        "store should reach Ready"
    );

    // Strip the storeId ownership label so the teardown check fails.
    let ns_api: Api<Namespace> = Api::all(client.clone());
    let patch = serde_json::json!({
        "metadata": {"labels": {"urumi.ai/storeId": null}}
    });
    ns_api
        .patch(&store_ns, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("tamper namespace");

    api.delete(&name, &Default::default())
        .await
        .expect("delete store");
    assert!(
        wait_for_gone(&api, &name, 60).await,
        "store should still be removed"
    );

    // The namespace failed the ownership check and must survive teardown.
    let ns_after = ns_api
        .get_opt(&store_ns)
        .await
        .expect("get namespace")
        .expect("namespace should remain");
    assert!(ns_after.metadata.deletion_timestamp.is_none());

    cleanup(client, "default", &name, &store_ns).await;
}
