use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{event, Level};

use super::{
    common::{self, check_response, http_client, lookup_secret, relative_name},
    Authenticator, PluginConfig, SynthesizedConfig,
};
use crate::error::PluginError;

pub const PLUGIN_NAME: &str = "dns-digitalocean";

const DEFAULT_API_URL: &str = "https://api.digitalocean.com/v2";
/// Lowest TTL DigitalOcean accepts for a record.
const DEFAULT_TTL: u64 = 30;

pub struct DigitalOceanAuthenticator {
    config: PluginConfig,
    client: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct DORecord {
    id: u64,
    #[serde(rename = "type")]
    record_type: String,
    data: String,
}

#[derive(Deserialize)]
struct DORecordsResponse {
    domain_records: Vec<DORecord>,
}

#[derive(Deserialize)]
struct DOCreatedRecord {
    domain_record: DORecord,
}

impl DigitalOceanAuthenticator {
    pub fn new(
        config: SynthesizedConfig,
        prefix: &str,
    ) -> Result<DigitalOceanAuthenticator, PluginError> {
        let mut config = PluginConfig::new(config, prefix);

        let ttl = config.conf_u64("ttl")?.unwrap_or(DEFAULT_TTL);
        config.set("ttl", ttl);

        // Waiting less than one TTL can't see the new record.
        let propagation = config.conf_u64("propagation-seconds")?.unwrap_or(ttl);
        if propagation < ttl {
            event!(
                Level::DEBUG,
                "Raising propagation seconds from {propagation} to the record TTL {ttl}"
            );
        }
        config.set("propagation-seconds", propagation.max(ttl));

        let api_url = config
            .conf_str("api-url")
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(DigitalOceanAuthenticator {
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

    /// Walks up from `domain` until DigitalOcean recognizes a zone.
    async fn find_zone(&self, domain: &str) -> Result<String, PluginError> {
        common::find_zone(domain, |guess| {
            Ok(self
                .client
                .get(format!("{}/domains/{guess}", self.api_url))
                .bearer_auth(self.token()?))
        })
        .await
    }
}

#[async_trait]
impl Authenticator for DigitalOceanAuthenticator {
    fn conf(&self, name: &str) -> Option<&Value> {
        self.config.conf(name)
    }

    async fn setup_credentials(&mut self) -> Result<(), PluginError> {
        self.token = Some(lookup_secret(&self.config, "token", "DIGITAL_OCEAN_TOKEN")?);
        Ok(())
    }

    async fn perform(
        &mut self,
        domain: &str,
        validation_domain: &str,
        validation: &str,
    ) -> Result<(), PluginError> {
        let zone = self.find_zone(domain).await?;
        let name = relative_name(validation_domain, &zone);

        let res = self
            .client
            .post(format!("{}/domains/{zone}/records", self.api_url))
            .bearer_auth(self.token()?)
            .json(&json!({
                "type": "TXT",
                "name": name,
                "data": validation,
                "ttl": self.config.conf_u64("ttl")?.unwrap_or(DEFAULT_TTL),
            }))
            .send()
            .await?;
        let created: DOCreatedRecord = check_response(res, "add challenge record")
            .await?
            .json()
            .await?;

        event!(
            Level::INFO,
            zone = %zone,
            record = created.domain_record.id,
            "Added TXT record {name}"
        );
        Ok(())
    }

    async fn cleanup(
        &mut self,
        domain: &str,
        validation_domain: &str,
        validation: &str,
    ) -> Result<(), PluginError> {
        let zone = self.find_zone(domain).await?;

        let res = self
            .client
            .get(format!("{}/domains/{zone}/records", self.api_url))
            .bearer_auth(self.token()?)
            .query(&[("type", "TXT"), ("name", validation_domain)])
            .send()
            .await?;
        let listing: DORecordsResponse = check_response(res, "list records")
            .await?
            .json()
            .await?;

        let stale = listing
            .domain_records
            .into_iter()
            .filter(|r| r.record_type == "TXT" && r.data == validation)
            .collect::<Vec<_>>();

        if stale.is_empty() {
            event!(Level::WARN, zone = %zone, "No TXT record {validation_domain} found to clean up");
            return Ok(());
        }

        for record in stale {
            let res = self
                .client
                .delete(format!("{}/domains/{zone}/records/{}", self.api_url, record.id))
                .bearer_auth(self.token()?)
                .send()
                .await?;
            check_response(res, "delete challenge record").await?;
            event!(
                Level::INFO,
                zone = %zone,
                record = record.id,
                "Deleted TXT record {validation_domain}"
            );
        }

        Ok(())
    }
}
