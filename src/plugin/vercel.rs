use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{event, Level};

use super::{
    common::{self, check_response, http_client, lookup_secret, relative_name},
    Authenticator, PluginConfig, SynthesizedConfig,
};
use crate::error::PluginError;

pub const PLUGIN_NAME: &str = "dns-vercel";

const DEFAULT_API_URL: &str = "https://api.vercel.com";
const DEFAULT_TTL: u64 = 60;

pub struct VercelAuthenticator {
    config: PluginConfig,
    client: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct AddRecordResponse {
    uid: String,
}

#[derive(Deserialize)]
struct ListRecordsResponse {
    records: Vec<VercelRecord>,
}

#[derive(Deserialize)]
struct VercelRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    value: String,
}

impl VercelAuthenticator {
    pub fn new(config: SynthesizedConfig, prefix: &str) -> Result<VercelAuthenticator, PluginError> {
        let mut config = PluginConfig::new(config, prefix);
        if config.conf("ttl").is_none() {
            config.set("ttl", DEFAULT_TTL);
        }
        config.conf_u64("ttl")?;

        let api_url = config
            .conf_str("api-url")
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(VercelAuthenticator {
            config,
            client: http_client()?,
            api_url,
            token: None,
        })
    }

    fn token(&self) -> Result<&str, PluginError> {
        self.token
            .as_deref()
            .ok_or_else(|| PluginError::Credentials("credentials have not been set up".to_string()))
    }

    /// The zone the record goes in: the `zone` option, or the closest parent of `domain`
    /// that the account (or team) owns on Vercel.
    async fn zone(&self, domain: &str) -> Result<String, PluginError> {
        if let Some(zone) = self.config.conf_str("zone") {
            return Ok(zone.trim_end_matches('.').to_string());
        }

        common::find_zone(domain, |guess| {
            let url = format!("{}/v5/domains/{guess}", self.api_url);
            self.request(reqwest::Method::GET, &url)
        })
        .await
    }

    fn request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder, PluginError> {
        let mut builder = self.client.request(method, url).bearer_auth(self.token()?);
        if let Some(team_id) = self.config.conf_str("team-id") {
            builder = builder.query(&[("teamId", team_id)]);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Authenticator for VercelAuthenticator {
    fn conf(&self, name: &str) -> Option<&Value> {
        self.config.conf(name)
    }

    async fn setup_credentials(&mut self) -> Result<(), PluginError> {
        self.token = Some(lookup_secret(&self.config, "token", "VERCEL_TOKEN")?);
        Ok(())
    }

    async fn perform(
        &mut self,
        domain: &str,
        validation_domain: &str,
        validation: &str,
    ) -> Result<(), PluginError> {
        let zone = self.zone(domain).await?;
        let name = relative_name(validation_domain, &zone);
        let url = format!("{}/v2/domains/{zone}/records", self.api_url);
        let body = serde_json::json!({
            "name": name,
            "type": "TXT",
            "value": validation,
            "ttl": self.config.conf_u64("ttl")?.unwrap_or(DEFAULT_TTL),
        });

        let res = self
            .request(reqwest::Method::POST, &url)?
            .json(&body)
            .send()
            .await?;
        let response: AddRecordResponse = check_response(res, "add challenge record")
            .await?
            .json()
            .await?;

        event!(Level::INFO, zone = %zone, record = %response.uid, "Added TXT record {name}");
        Ok(())
    }

    async fn cleanup(
        &mut self,
        domain: &str,
        validation_domain: &str,
        validation: &str,
    ) -> Result<(), PluginError> {
        let zone = self.zone(domain).await?;
        let name = relative_name(validation_domain, &zone);

        let url = format!("{}/v4/domains/{zone}/records", self.api_url);
        let res = self.request(reqwest::Method::GET, &url)?.send().await?;
        let listing: ListRecordsResponse = check_response(res, "list records")
            .await?
            .json()
            .await?;

        let stale = listing
            .records
            .into_iter()
            .filter(|r| r.record_type == "TXT" && r.name == name && r.value == validation)
            .collect::<Vec<_>>();

        if stale.is_empty() {
            event!(Level::WARN, zone = %zone, "No TXT record {name} found to clean up");
            return Ok(());
        }

        for record in stale {
            let url = format!("{}/v2/domains/{zone}/records/{}", self.api_url, record.id);
            let res = self.request(reqwest::Method::DELETE, &url)?.send().await?;
            check_response(res, "delete challenge record").await?;
            event!(Level::INFO, zone = %zone, record = %record.id, "Deleted TXT record {name}");
        }

        Ok(())
    }
}
