use kube::Client;

use crate::{config::OperatorConfig, controller};

/// Run the controller until its watch stream ends or a shutdown signal
/// fires.
pub async fn run(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    controller::run_controller(client, cfg).await
}
