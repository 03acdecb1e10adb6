use super::{EngineHandler, InstallRequest};

/// WooCommerce on the Bitnami WordPress chart.
pub struct Woocommerce {
    chart: String,
}

impl Woocommerce {
    pub fn new(chart: String) -> Self {
        Self { chart }
    }
}

impl EngineHandler for Woocommerce {
    fn name(&self) -> &'static str {
        "woocommerce"
    }

    fn chart_ref(&self) -> &str {
        &self.chart
    }

    fn install_parameters(&self, req: &InstallRequest<'_>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--set".into(),
            "wordpress.ingress.enabled=true".into(),
            "--set-string".into(),
            format!("wordpress.ingress.ingressClassName={}", req.ingress_class),
            "--set-string".into(),
            format!("wordpress.ingress.hostname={}", req.host),
            "--set-string".into(),
            "wordpress.service.type=ClusterIP".into(),
            "--set-string".into(),
            format!("wordpress.wordpressUsername={}", req.admin_user),
            "--set-string".into(),
            format!("wordpress.wordpressPassword={}", req.admin_password),
            "--set-string".into(),
            format!("wordpress.wordpressEmail=admin@{}", req.host),
            "--set-string".into(),
            format!("wordpress.wordpressBlogName={}", req.store_id),
            "--set-string".into(),
            "wordpress.wordpressPlugins=woocommerce".into(),
        ];
        if let Some(storage_class) = req.storage_class {
            args.push("--set-string".into());
            args.push(format!(
                "wordpress.persistence.storageClass={}",
                storage_class
            ));
            args.push("--set-string".into());
            args.push(format!(
                "wordpress.mariadb.primary.persistence.storageClass={}",
                storage_class
            ));
        }
        args
    }
}
