//! Cloud Client
//!
//! Per-request client combining the shared HTTP client with the tenant,
//! region and token a collection job runs for.

use super::http::{generate_headers, CloudHttpClient};
use crate::config::Endpoints;
use anyhow::Result;
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Replace `{region}` and `{ddi}` placeholders in a URL template.
/// Region is always substituted lower-cased.
pub fn render_template(template: &str, region: &str, ddi: &str) -> String {
    template
        .replace("{region}", &region.to_lowercase())
        .replace("{ddi}", ddi)
}

/// Main cloud client, scoped to one tenant/region/token
#[derive(Clone)]
pub struct CloudClient {
    pub http: CloudHttpClient,
    pub endpoints: Endpoints,
    pub ddi: String,
    pub region: String,
    headers: HeaderMap,
}

impl CloudClient {
    /// Create a new client for a tenant
    pub fn new(
        http: CloudHttpClient,
        endpoints: Endpoints,
        ddi: &str,
        region: &str,
        token: &str,
    ) -> Result<Self> {
        Ok(Self {
            http,
            endpoints,
            ddi: ddi.to_string(),
            region: region.to_string(),
            headers: generate_headers(token)?,
        })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Make a GET request; `None` means no data
    pub async fn get(&self, url: &str) -> Option<Value> {
        self.http.get(url, &self.headers).await
    }

    fn endpoint_url(&self, template: &str, path: &str) -> String {
        format!(
            "{}/{}",
            render_template(template, &self.region, &self.ddi).trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // =========================================================================
    // Usage endpoint helpers
    // =========================================================================

    /// Build Cloud Servers API URL (tenant scoped)
    pub fn servers_url(&self, path: &str) -> String {
        self.endpoint_url(&self.endpoints.servers, &format!("v2/{}/{}", self.ddi, path))
    }

    /// Build Cloud Networks API URL
    pub fn networks_url(&self, path: &str) -> String {
        self.endpoint_url(&self.endpoints.networks, &format!("v2.0/{}", path))
    }

    /// Build Cloud Load Balancers API URL (tenant scoped)
    pub fn load_balancers_url(&self, path: &str) -> String {
        self.endpoint_url(
            &self.endpoints.load_balancers,
            &format!("v1.0/{}/{}", self.ddi, path),
        )
    }

    /// Build Autoscale API URL (tenant scoped)
    pub fn autoscale_url(&self, path: &str) -> String {
        self.endpoint_url(&self.endpoints.autoscale, &format!("v1.0/{}/{}", self.ddi, path))
    }

    /// Build Cloud DNS API URL (tenant scoped)
    pub fn dns_url(&self, path: &str) -> String {
        self.endpoint_url(&self.endpoints.dns, &format!("v1.0/{}/{}", self.ddi, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoints: Endpoints) -> CloudClient {
        CloudClient::new(
            CloudHttpClient::new(std::time::Duration::from_secs(1)).unwrap(),
            endpoints,
            "123456",
            "DFW",
            "token",
        )
        .unwrap()
    }

    #[test]
    fn test_render_template_lowercases_region() {
        assert_eq!(
            render_template("https://{region}.x.com/v2/{ddi}/limits", "IAD", "42"),
            "https://iad.x.com/v2/42/limits"
        );
    }

    #[test]
    fn test_default_endpoint_urls() {
        let client = client(Endpoints::default());
        assert_eq!(
            client.servers_url("servers/detail"),
            "https://dfw.servers.api.rackspacecloud.com/v2/123456/servers/detail"
        );
        assert_eq!(
            client.networks_url("networks"),
            "https://dfw.networks.api.rackspacecloud.com/v2.0/networks"
        );
        assert_eq!(
            client.load_balancers_url("loadbalancers"),
            "https://dfw.loadbalancers.api.rackspacecloud.com/v1.0/123456/loadbalancers"
        );
        assert_eq!(
            client.autoscale_url("groups"),
            "https://dfw.autoscale.api.rackspacecloud.com/v1.0/123456/groups"
        );
        assert_eq!(
            client.dns_url("domains"),
            "https://dns.api.rackspacecloud.com/v1.0/123456/domains"
        );
    }

    #[test]
    fn test_endpoint_url_joins_without_double_slash() {
        let client = client(Endpoints::all_at("http://127.0.0.1:8080/"));
        assert_eq!(
            client.dns_url("/domains"),
            "http://127.0.0.1:8080/v1.0/123456/domains"
        );
    }
}
