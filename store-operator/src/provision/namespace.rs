use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    LimitRange, LimitRangeItem, LimitRangeSpec, Namespace, ResourceQuota,
    ResourceQuotaSpec,
};
use k8s_openapi::api::networking::v1::{
    IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
    NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Client;
use kube::api::{Api, Patch, PatchParams, PostParams};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::OperatorConfig;

/// Ownership label pair: the only proof that a namespace was created by
/// this operator for a given store.
pub const MANAGED_LABEL: &str = "urumi.ai/managed-store";
pub const STORE_ID_LABEL: &str = "urumi.ai/storeId";

const QUOTA_NAME: &str = "store-quota";
const LIMITS_NAME: &str = "store-limits";
const DENY_POLICY_NAME: &str = "default-deny";
const ALLOW_POLICY_NAME: &str = "allow-required";

pub fn ownership_labels(store_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_LABEL.to_string(), "true".to_string()),
        (STORE_ID_LABEL.to_string(), store_id.to_string()),
    ])
}

pub fn labels_match_owner(
    labels: Option<&BTreeMap<String, String>>,
    store_id: &str,
) -> bool {
    let Some(labels) = labels else {
        return false;
    };
    labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
        && labels.get(STORE_ID_LABEL).map(String::as_str) == Some(store_id)
}

/// Create the tenant namespace with ownership labels, or patch the label
/// pair onto an existing one. Unrelated labels are never touched: the merge
/// patch carries only the two owned keys.
pub async fn ensure_namespace(
    client: &Client,
    ns: &str,
    store_id: &str,
) -> Result<(), kube::Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let wanted = ownership_labels(store_id);

    match api.get_opt(ns).await? {
        Some(existing) => {
            let current = existing.metadata.labels.unwrap_or_default();
            if wanted.iter().any(|(k, v)| current.get(k) != Some(v)) {
                debug!(%ns, "patching ownership labels onto existing namespace");
                let patch = json!({"metadata": {"labels": wanted}});
                api.patch(ns, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
            }
        }
        None => {
            let body = Namespace {
                metadata: ObjectMeta {
                    name: Some(ns.to_string()),
                    labels: Some(wanted),
                    ..Default::default()
                },
                ..Default::default()
            };
            api.create(&PostParams::default(), &body).await?;
        }
    }
    Ok(())
}

/// Quota and default limits are mandatory; network policies are applied
/// best-effort because not every CNI implements them.
pub async fn ensure_isolation(
    client: &Client,
    cfg: &OperatorConfig,
    ns: &str,
) -> Result<(), kube::Error> {
    ensure_resource_quota(client, cfg, ns).await?;
    ensure_limit_range(client, cfg, ns).await?;
    if let Err(e) = ensure_network_policies(client, cfg, ns).await {
        warn!(%ns, error = %e, "network policy apply failed; continuing without isolation");
    }
    Ok(())
}

/// True only when the namespace carries the configured prefix and the exact
/// ownership label pair for this store. Missing namespace is not owned.
pub async fn namespace_is_owned(
    client: &Client,
    ns_prefix: &str,
    ns: &str,
    store_id: &str,
) -> Result<bool, kube::Error> {
    if !ns.starts_with(ns_prefix) {
        return Ok(false);
    }
    let api: Api<Namespace> = Api::all(client.clone());
    let Some(obj) = api.get_opt(ns).await? else {
        return Ok(false);
    };
    Ok(labels_match_owner(obj.metadata.labels.as_ref(), store_id))
}

async fn ensure_resource_quota(
    client: &Client,
    cfg: &OperatorConfig,
    ns: &str,
) -> Result<(), kube::Error> {
    let limits = &cfg.limits;
    let hard = BTreeMap::from([
        ("pods".to_string(), Quantity(limits.quota_pods.clone())),
        (
            "requests.cpu".to_string(),
            Quantity(limits.quota_requests_cpu.clone()),
        ),
        (
            "requests.memory".to_string(),
            Quantity(limits.quota_requests_memory.clone()),
        ),
        (
            "limits.cpu".to_string(),
            Quantity(limits.quota_limits_cpu.clone()),
        ),
        (
            "limits.memory".to_string(),
            Quantity(limits.quota_limits_memory.clone()),
        ),
        (
            "persistentvolumeclaims".to_string(),
            Quantity(limits.quota_pvcs.clone()),
        ),
        (
            "requests.storage".to_string(),
            Quantity(limits.quota_requests_storage.clone()),
        ),
    ]);
    let rq = ResourceQuota {
        metadata: ObjectMeta {
            name: Some(QUOTA_NAME.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec {
            hard: Some(hard),
            ..Default::default()
        }),
        ..Default::default()
    };

    let api: Api<ResourceQuota> = Api::namespaced(client.clone(), ns);
    create_or_patch(&api, QUOTA_NAME, &rq, json!({"spec": rq.spec})).await
}

async fn ensure_limit_range(
    client: &Client,
    cfg: &OperatorConfig,
    ns: &str,
) -> Result<(), kube::Error> {
    let limits = &cfg.limits;
    let lr = LimitRange {
        metadata: ObjectMeta {
            name: Some(LIMITS_NAME.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        spec: Some(LimitRangeSpec {
            limits: vec![LimitRangeItem {
                type_: "Container".to_string(),
                default: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(limits.default_cpu.clone())),
                    (
                        "memory".to_string(),
                        Quantity(limits.default_memory.clone()),
                    ),
                ])),
                default_request: Some(BTreeMap::from([
                    (
                        "cpu".to_string(),
                        Quantity(limits.default_request_cpu.clone()),
                    ),
                    (
                        "memory".to_string(),
                        Quantity(limits.default_request_memory.clone()),
                    ),
                ])),
                ..Default::default()
            }],
        }),
    };

    let api: Api<LimitRange> = Api::namespaced(client.clone(), ns);
    create_or_patch(&api, LIMITS_NAME, &lr, json!({"spec": lr.spec})).await
}

async fn ensure_network_policies(
    client: &Client,
    cfg: &OperatorConfig,
    ns: &str,
) -> Result<(), kube::Error> {
    let api: Api<NetworkPolicy> = Api::namespaced(client.clone(), ns);
    let deny = default_deny_policy(ns);
    create_or_patch(&api, DENY_POLICY_NAME, &deny, json!({"spec": deny.spec}))
        .await?;
    let allow = allow_required_policy(cfg, ns);
    create_or_patch(
        &api,
        ALLOW_POLICY_NAME,
        &allow,
        json!({"spec": allow.spec}),
    )
    .await
}

/// "Already exists" means patch instead of create.
async fn create_or_patch<K>(
    api: &Api<K>,
    name: &str,
    obj: &K,
    spec_patch: serde_json::Value,
) -> Result<(), kube::Error>
where
    K: kube::Resource
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            api.patch(name, &PatchParams::default(), &Patch::Merge(&spec_patch))
                .await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Deny all ingress and egress for every pod in the namespace; the
/// allow-required policy opens the minimum back up.
fn default_deny_policy(ns: &str) -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(DENY_POLICY_NAME.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ..Default::default()
        }),
    }
}

fn allow_required_policy(cfg: &OperatorConfig, ns: &str) -> NetworkPolicy {
    let namespace_peer = |name: &str| NetworkPolicyPeer {
        namespace_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "kubernetes.io/metadata.name".to_string(),
                name.to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    };
    let intra_namespace = NetworkPolicyPeer {
        pod_selector: Some(LabelSelector::default()),
        ..Default::default()
    };
    let port = |protocol: &str, number: i32| NetworkPolicyPort {
        protocol: Some(protocol.to_string()),
        port: Some(IntOrString::Int(number)),
        ..Default::default()
    };

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(ALLOW_POLICY_NAME.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec![
                "Ingress".to_string(),
                "Egress".to_string(),
            ]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![
                    namespace_peer(&cfg.ingress_namespace),
                    intra_namespace.clone(),
                ]),
                ..Default::default()
            }]),
            egress: Some(vec![
                // intra-namespace app/db traffic
                NetworkPolicyEgressRule {
                    to: Some(vec![intra_namespace]),
                    ..Default::default()
                },
                // dns
                NetworkPolicyEgressRule {
                    to: Some(vec![namespace_peer("kube-system")]),
                    ports: Some(vec![port("UDP", 53), port("TCP", 53)]),
                },
                // external http(s) for package/plugin installs and upstream calls
                NetworkPolicyEgressRule {
                    to: Some(vec![NetworkPolicyPeer {
                        ip_block: Some(IPBlock {
                            cidr: "0.0.0.0/0".to_string(),
                            except: None,
                        }),
                        ..Default::default()
                    }]),
                    ports: Some(vec![port("TCP", 443), port("TCP", 80)]),
                },
            ]),
        }),
    }
}
