use crate::powerdns::types::*;
use crate::powerdns::{PdnsError, ZoneApi};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for a single backend call. Publish leases must outlast it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct PowerDnsClient {
    http: Client,
    base_url: String, // e.g. "http://127.0.0.1:8081/api/v1"
    api_key: String,
    server_id: String, // usually "localhost"
}

impl PowerDnsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        server_id: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!("falling back to default HTTP client settings: {err}");
                Client::new()
            });
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            server_id: server_id.into(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    fn auth_header(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("X-API-Key", &self.api_key)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/servers/{}/{}",
            self.base_url,
            self.server_id,
            path.trim_start_matches('/')
        )
    }

    async fn execute(&self, op: &'static str, req: RequestBuilder) -> Result<Response, PdnsError> {
        let started = Instant::now();
        let res = self
            .auth_header(req)
            .send()
            .await
            .map_err(|source| PdnsError::Request { op, source })?;
        let status = res.status();
        debug!(
            op,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PowerDNS request completed"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(PdnsError::NotFound { op });
        }
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            warn!(op, status = status.as_u16(), %message, "PowerDNS request rejected");
            return Err(PdnsError::Status {
                op,
                status: status.as_u16(),
                message,
            });
        }
        Ok(res)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        op: &'static str,
        req: RequestBuilder,
    ) -> Result<T, PdnsError> {
        let res = self.execute(op, req).await?;
        res.json::<T>()
            .await
            .map_err(|source| PdnsError::Request { op, source })
    }

    /// List the servers behind the API endpoint; used at startup to check `server_id`.
    pub async fn list_servers(&self) -> Result<Vec<PdnsServer>, PdnsError> {
        let url = format!("{}/servers", self.base_url);
        self.fetch("list_servers", self.http.get(url)).await
    }
}

#[async_trait]
impl ZoneApi for PowerDnsClient {
    async fn list_zones(&self) -> Result<Vec<PdnsZone>, PdnsError> {
        let url = self.url("zones");
        self.fetch("list_zones", self.http.get(url)).await
    }

    async fn get_zone(&self, zone_id: &str) -> Result<PdnsZone, PdnsError> {
        let url = self.url(&format!("zones/{}", zone_id));
        self.fetch("get_zone", self.http.get(url)).await
    }

    async fn create_zone(&self, z: &PdnsZoneCreate) -> Result<PdnsZone, PdnsError> {
        let url = self.url("zones");
        self.fetch("create_zone", self.http.post(url).json(z)).await
    }

    async fn patch_zone(&self, zone_id: &str, rrsets: &[PdnsRrset]) -> Result<(), PdnsError> {
        #[derive(Serialize)]
        struct PatchBody<'a> {
            rrsets: &'a [PdnsRrset],
        }

        let url = self.url(&format!("zones/{}", zone_id));
        let body = PatchBody { rrsets };
        self.execute("patch_zone", self.http.patch(url).json(&body))
            .await?;
        Ok(())
    }

    async fn update_zone(
        &self,
        zone_id: &str,
        settings: &PdnsZoneSettings,
    ) -> Result<(), PdnsError> {
        let url = self.url(&format!("zones/{}", zone_id));
        self.execute("update_zone", self.http.put(url).json(settings))
            .await?;
        Ok(())
    }

    async fn rectify_zone(&self, zone_id: &str) -> Result<(), PdnsError> {
        let url = self.url(&format!("zones/{}/rectify", zone_id));
        self.execute("rectify_zone", self.http.put(url)).await?;
        Ok(())
    }

    async fn list_cryptokeys(&self, zone_id: &str) -> Result<Vec<PdnsCryptokey>, PdnsError> {
        let url = self.url(&format!("zones/{}/cryptokeys", zone_id));
        self.fetch("list_cryptokeys", self.http.get(url)).await
    }

    async fn create_cryptokey(
        &self,
        zone_id: &str,
        key: &PdnsCryptokey,
    ) -> Result<PdnsCryptokey, PdnsError> {
        let url = self.url(&format!("zones/{}/cryptokeys", zone_id));
        self.fetch("create_cryptokey", self.http.post(url).json(key))
            .await
    }

    async fn set_cryptokey_active(
        &self,
        zone_id: &str,
        key_id: u32,
        active: bool,
    ) -> Result<(), PdnsError> {
        let url = self.url(&format!("zones/{}/cryptokeys/{}", zone_id, key_id));
        let body = serde_json::json!({ "active": active });
        self.execute("modify_cryptokey", self.http.put(url).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_cryptokey(&self, zone_id: &str, key_id: u32) -> Result<(), PdnsError> {
        let url = self.url(&format!("zones/{}/cryptokeys/{}", zone_id, key_id));
        self.execute("delete_cryptokey", self.http.delete(url))
            .await?;
        Ok(())
    }

    async fn get_metadata(&self, zone_id: &str, kind: &str) -> Result<PdnsMetadata, PdnsError> {
        let url = self.url(&format!("zones/{}/metadata/{}", zone_id, kind));
        self.fetch("get_metadata", self.http.get(url)).await
    }

    async fn create_metadata(
        &self,
        zone_id: &str,
        metadata: &PdnsMetadata,
    ) -> Result<(), PdnsError> {
        let url = self.url(&format!("zones/{}/metadata", zone_id));
        self.execute("create_metadata", self.http.post(url).json(metadata))
            .await?;
        Ok(())
    }

    async fn get_tsig_key(&self, name: &str) -> Result<PdnsTsigKey, PdnsError> {
        let url = self.url(&format!("tsigkeys/{}", name));
        self.fetch("get_tsig_key", self.http.get(url)).await
    }

    async fn create_tsig_key(&self, key: &PdnsTsigKey) -> Result<PdnsTsigKey, PdnsError> {
        let url = self.url("tsigkeys");
        self.fetch("create_tsig_key", self.http.post(url).json(key))
            .await
    }
}
