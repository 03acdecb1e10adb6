use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams, PostParams};
use rand::distr::{Alphanumeric, SampleString};
use serde_json::json;
use tracing::debug;

pub const ADMIN_USERNAME: &str = "admin";
const PASSWORD_LEN: usize = 20;

/// Admin credential pair for one tenant namespace. Issued once, stable for
/// the namespace lifetime; the password must never reach logs or status.
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// Return the existing credential pair when the secret already holds one;
/// otherwise mint a fresh password and create-or-patch the secret.
pub async fn ensure_admin_credentials(
    client: &Client,
    ns: &str,
    store_id: &str,
    secret_name: &str,
) -> Result<AdminCredentials, kube::Error> {
    let api: Api<Secret> = Api::namespaced(client.clone(), ns);

    if let Some(existing) = api.get_opt(secret_name).await? {
        if let Some(creds) = decode_credentials(&existing) {
            debug!(%ns, %secret_name, "admin credentials already issued");
            return Ok(creds);
        }
    }

    let username = ADMIN_USERNAME.to_string();
    let password = generate_password(PASSWORD_LEN);
    let string_data = BTreeMap::from([
        ("username".to_string(), username.clone()),
        ("password".to_string(), password.clone()),
        ("storeId".to_string(), store_id.to_string()),
    ]);
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(string_data.clone()),
        ..Default::default()
    };

    match api.create(&PostParams::default(), &secret).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            let patch = json!({"stringData": string_data, "type": "Opaque"});
            api.patch(
                secret_name,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        }
        Err(e) => return Err(e),
    }
    Ok(AdminCredentials { username, password })
}

fn generate_password(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::rng(), len)
}

/// A credential pair counts as issued only when both fields decode to
/// non-empty UTF-8.
fn decode_credentials(secret: &Secret) -> Option<AdminCredentials> {
    let data = secret.data.as_ref()?;
    let username = String::from_utf8(data.get("username")?.0.clone()).ok()?;
    let password = String::from_utf8(data.get("password")?.0.clone()).ok()?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(AdminCredentials { username, password })
}
