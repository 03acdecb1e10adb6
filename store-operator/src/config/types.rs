use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace in which Store objects live; objects elsewhere are ignored.
    #[envconfig(from = "PLATFORM_NAMESPACE", default = "store-platform")]
    pub platform_namespace: String,

    #[envconfig(from = "BASE_DOMAIN", default = "127.0.0.1.nip.io")]
    pub base_domain: String,

    #[envconfig(from = "URL_SCHEME", default = "http")]
    pub url_scheme: String,

    #[envconfig(from = "INGRESS_CLASS", default = "nginx")]
    pub ingress_class: String,

    /// Namespace the ingress controller runs in; the tenant NetworkPolicy
    /// allow-lists ingress traffic from it.
    #[envconfig(from = "INGRESS_NAMESPACE", default = "ingress-nginx")]
    pub ingress_namespace: String,

    #[envconfig(from = "STORE_NS_PREFIX", default = "store-")]
    pub store_ns_prefix: String,

    /// Storage class for tenant persistence; empty means cluster default.
    #[envconfig(from = "STORAGE_CLASS", default = "")]
    pub storage_class: String,

    /// Upper bound for one provisioning pass: gate wait and installer wait
    /// both use this budget.
    #[envconfig(from = "MAX_PROVISION_SECONDS", default = "900")]
    pub max_provision_seconds: u64,

    /// Process-wide cap on simultaneous heavy install sections.
    #[envconfig(from = "MAX_CONCURRENT_PROVISIONS", default = "2")]
    pub max_concurrent_provisions: usize,

    /// Ring-buffer capacity of status.events; oldest entries drop first.
    #[envconfig(from = "MAX_STATUS_EVENTS", default = "20")]
    pub max_status_events: usize,

    /// Reconciler worker-pool width (distinct from the provisioning gate).
    #[envconfig(from = "OPERATOR_WORKERS", default = "4")]
    pub workers: u16,

    #[envconfig(from = "HELM_BIN", default = "helm")]
    pub helm_bin: String,

    #[envconfig(from = "CHART_WOOCOMMERCE", default = "/charts/woocommerce")]
    pub chart_woocommerce: String,

    #[envconfig(from = "CHART_MEDUSA", default = "/charts/medusa")]
    pub chart_medusa: String,

    #[envconfig(from = "STORE_ADMIN_SECRET_NAME", default = "store-admin")]
    pub admin_secret_name: String,

    #[envconfig(nested)]
    pub limits: TenantLimitsConfig,
}

/// Per-tenant resource caps applied to every store namespace. Values are
/// Kubernetes quantity strings.
#[derive(Envconfig, Clone, Debug)]
pub struct TenantLimitsConfig {
    #[envconfig(from = "STORE_QUOTA_PODS", default = "10")]
    pub quota_pods: String,

    #[envconfig(from = "STORE_QUOTA_REQUESTS_CPU", default = "2")]
    pub quota_requests_cpu: String,

    #[envconfig(from = "STORE_QUOTA_REQUESTS_MEMORY", default = "2Gi")]
    pub quota_requests_memory: String,

    #[envconfig(from = "STORE_QUOTA_LIMITS_CPU", default = "4")]
    pub quota_limits_cpu: String,

    #[envconfig(from = "STORE_QUOTA_LIMITS_MEMORY", default = "4Gi")]
    pub quota_limits_memory: String,

    #[envconfig(from = "STORE_QUOTA_PVCS", default = "5")]
    pub quota_pvcs: String,

    #[envconfig(from = "STORE_QUOTA_REQUESTS_STORAGE", default = "20Gi")]
    pub quota_requests_storage: String,

    #[envconfig(from = "STORE_LIMIT_DEFAULT_CPU", default = "500m")]
    pub default_cpu: String,

    #[envconfig(from = "STORE_LIMIT_DEFAULT_MEMORY", default = "512Mi")]
    pub default_memory: String,

    #[envconfig(from = "STORE_LIMIT_REQUEST_CPU", default = "200m")]
    pub default_request_cpu: String,

    #[envconfig(from = "STORE_LIMIT_REQUEST_MEMORY", default = "256Mi")]
    pub default_request_memory: String,
}

impl OperatorConfig {
    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.max_provision_seconds)
    }

    pub fn storage_class(&self) -> Option<&str> {
        if self.storage_class.is_empty() {
            None
        } else {
            Some(&self.storage_class)
        }
    }

    /// Tenant namespace derived deterministically from the store id.
    pub fn store_namespace(&self, store_id: &str) -> String {
        format!("{}{}", self.store_ns_prefix, store_id)
    }

    pub fn store_host(&self, store_id: &str) -> String {
        format!("{}.{}", store_id, self.base_domain)
    }

    pub fn store_url(&self, store_id: &str) -> String {
        format!("{}://{}", self.url_scheme, self.store_host(store_id))
    }
}
