use super::{EngineHandler, InstallRequest};

/// Medusa chart; exposes only ingress wiring for now, the chart provisions
/// its own admin identity.
pub struct Medusa {
    chart: String,
}

impl Medusa {
    pub fn new(chart: String) -> Self {
        Self { chart }
    }
}

impl EngineHandler for Medusa {
    fn name(&self) -> &'static str {
        "medusa"
    }

    fn chart_ref(&self) -> &str {
        &self.chart
    }

    fn install_parameters(&self, req: &InstallRequest<'_>) -> Vec<String> {
        vec![
            "--set-string".into(),
            format!("ingress.className={}", req.ingress_class),
            "--set-string".into(),
            format!("ingress.hostname={}", req.host),
        ]
    }
}
