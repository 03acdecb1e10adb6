pub mod events;
pub mod reconcile;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::{
    Client,
    api::Api,
    runtime::{
        Controller,
        controller::{self, Action},
        events::{Recorder, Reporter},
        watcher,
    },
};
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::store::Store;
use crate::engines::EngineRegistry;
use crate::provision::{gate::ProvisionGate, helm::{HelmError, HelmRunner}};

/// Explicit backoff requested when the provisioning gate is saturated: a
/// transient capacity problem, retried soon.
pub const GATE_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Explicit backoff after an installer wall-clock timeout.
pub const INSTALL_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Default requeue for failures without an explicit delay.
const BACKOFF_REQUEUE: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("Unsupported engine '{0}'")]
    UnsupportedEngine(String),
    #[error("Provisioning lock timeout")]
    GateTimeout,
    #[error(transparent)]
    Helm(#[from] HelmError),
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

/// How the watch framework should respond to a failed reconciliation.
pub enum Retry {
    /// Misconfiguration; retrying cannot help until the spec changes.
    Permanent,
    /// Transient with an explicit, bounded delay.
    After(Duration),
    /// Transient; the default requeue backoff applies.
    Backoff,
}

impl ReconcileErr {
    pub fn retry(&self) -> Retry {
        match self {
            ReconcileErr::UnsupportedEngine(_) => Retry::Permanent,
            ReconcileErr::GateTimeout => Retry::After(GATE_RETRY_DELAY),
            ReconcileErr::Helm(HelmError::TimedOut(_)) => {
                Retry::After(INSTALL_RETRY_DELAY)
            }
            _ => Retry::Backoff,
        }
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub engines: Arc<EngineRegistry>,
    pub helm: Arc<HelmRunner>,
    pub gate: ProvisionGate,
    pub recorder: Recorder,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: OperatorConfig) -> Self {
        let engines = Arc::new(EngineRegistry::from_config(&cfg));
        let helm = Arc::new(HelmRunner::new(cfg.helm_bin.clone()));
        let gate = ProvisionGate::new(cfg.max_concurrent_provisions);
        let recorder = Recorder::new(
            client.clone(),
            Reporter {
                controller: "store-operator".into(),
                instance: None,
            },
        );
        Self {
            client,
            cfg,
            engines,
            helm,
            gate,
            recorder,
        }
    }

    pub fn store_api(&self) -> Api<Store> {
        Api::namespaced(self.client.clone(), &self.cfg.platform_namespace)
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let api: Api<Store> = Api::all(client.clone());
    let workers = cfg.workers;
    let ctx = Arc::new(ControllerContext::new(client, cfg));

    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(workers))
        .shutdown_on_signal()
        .run(reconcile::reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((_obj_ref, action)) => {
                    info!("reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

fn error_policy(
    _obj: Arc<Store>,
    error: &ReconcileErr,
    _ctx: Arc<ControllerContext>,
) -> Action {
    match error.retry() {
        Retry::Permanent => {
            warn!(%error, "permanent reconcile failure; waiting for spec change");
            Action::await_change()
        }
        Retry::After(delay) => Action::requeue(delay),
        Retry::Backoff => Action::requeue(BACKOFF_REQUEUE),
    }
}
