mod medusa;
mod woocommerce;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::OperatorConfig;
use crate::controller::ReconcileErr;

pub use medusa::Medusa;
pub use woocommerce::Woocommerce;

/// Engine used for teardown when the stored engine no longer resolves, so
/// cleanup is still attempted.
pub const PRIMARY_ENGINE: &str = "woocommerce";

/// Everything an engine needs to render installer parameters for one store.
pub struct InstallRequest<'a> {
    pub store_id: &'a str,
    pub namespace: &'a str,
    pub host: &'a str,
    pub admin_user: &'a str,
    pub admin_password: &'a str,
    pub ingress_class: &'a str,
    pub storage_class: Option<&'a str>,
}

/// Strategy per store engine. Variants differ only in the parameter set
/// they emit; the controller stays agnostic beyond this contract.
#[async_trait]
pub trait EngineHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn chart_ref(&self) -> &str;

    fn release_name(&self, store_id: &str) -> String {
        format!("{}-{}", self.name(), store_id)
    }

    /// Ordered `--set`/`--set-string` arguments appended to the installer
    /// invocation.
    fn install_parameters(&self, req: &InstallRequest<'_>) -> Vec<String>;

    /// Engine-specific readiness hook run after a successful install.
    async fn post_ready_check(
        &self,
        _store_id: &str,
        _namespace: &str,
    ) -> Result<(), ReconcileErr> {
        Ok(())
    }
}

/// Registered-variant table: new engines are added here, not by branching
/// controller logic.
pub struct EngineRegistry {
    handlers: HashMap<&'static str, Arc<dyn EngineHandler>>,
}

impl EngineRegistry {
    pub fn from_config(cfg: &OperatorConfig) -> Self {
        let mut handlers: HashMap<&'static str, Arc<dyn EngineHandler>> =
            HashMap::new();
        let woocommerce: Arc<dyn EngineHandler> =
            Arc::new(Woocommerce::new(cfg.chart_woocommerce.clone()));
        handlers.insert(woocommerce.name(), woocommerce);
        let medusa: Arc<dyn EngineHandler> =
            Arc::new(Medusa::new(cfg.chart_medusa.clone()));
        handlers.insert(medusa.name(), medusa);
        Self { handlers }
    }

    pub fn get(&self, engine: &str) -> Option<Arc<dyn EngineHandler>> {
        self.handlers.get(engine).cloned()
    }

    /// Teardown must still attempt cleanup when spec.engine is unrecognized.
    pub fn get_or_primary(&self, engine: &str) -> Arc<dyn EngineHandler> {
        self.get(engine)
            .unwrap_or_else(|| self.handlers[PRIMARY_ENGINE].clone())
    }
}
