use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use super::OciError;
use super::types::{DEFAULT_PAGE_SIZE, Endpoint, OciErrorBody, RegionSubscription, Service};
use crate::providers::{ListScope, Vnic};
use crate::resource::{ResourceDescriptor, ResourceKind};

pub const OCI_ENDPOINT_TEMPLATE: &str = "https://{service}.{region}.oraclecloud.com";

const NEXT_PAGE_HEADER: &str = "opc-next-page";

#[derive(Clone)]
pub struct OciClient {
    client: reqwest::Client,
    endpoint_template: String,
}

impl OciClient {
    pub fn new(auth_token: Option<String>) -> Result<Self, OciError> {
        Self::with_base_url(auth_token, OCI_ENDPOINT_TEMPLATE.to_string())
    }

    /// `endpoint_template` may contain `{service}` and `{region}` placeholders.
    ///
    /// NOTE: Tests pass a mock server URI without placeholders.
    pub fn with_base_url(
        auth_token: Option<String>,
        endpoint_template: String,
    ) -> Result<Self, OciError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token {
            let header_value = HeaderValue::from_str(&token).map_err(|_| OciError::Auth {
                message: "Invalid authorization header format".to_string(),
            })?;
            headers.insert(AUTHORIZATION, header_value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(OciError::Network)?;

        Ok(Self {
            client,
            endpoint_template,
        })
    }

    pub fn service_url(&self, region: &str, service: Service) -> String {
        let host = self
            .endpoint_template
            .replace("{service}", service.host())
            .replace("{region}", region);
        format!("{}/{}", host.trim_end_matches('/'), service.api_version())
    }

    fn resource_url(&self, region: &str, kind: ResourceKind, id: &str) -> String {
        let endpoint = Endpoint::for_kind(kind);
        format!(
            "{}/{}/{}",
            self.service_url(region, endpoint.service),
            endpoint.collection,
            urlencoding::encode(id)
        )
    }

    pub async fn list_resources(
        &self,
        region: &str,
        kind: ResourceKind,
        scope: &ListScope,
    ) -> Result<Vec<ResourceDescriptor>, OciError> {
        let endpoint = Endpoint::for_kind(kind);
        if kind == ResourceKind::Vnic {
            return Err(OciError::Unsupported {
                kind,
                operation: "list",
            });
        }

        let mut query = vec![("compartmentId", scope.compartment_id.clone())];
        if let (Some(param), Some(parent)) = (endpoint.parent_param, &scope.parent_id) {
            query.push((param, parent.clone()));
        }
        query.extend(
            endpoint
                .list_query
                .iter()
                .map(|(key, value)| (*key, value.to_string())),
        );

        let url = format!(
            "{}/{}",
            self.service_url(region, endpoint.service),
            endpoint.collection
        );

        self.fetch_all_pages(&url, &query, DEFAULT_PAGE_SIZE, |body| {
            serde_json::from_value::<Vec<ResourceDescriptor>>(body).map_err(|e| OciError::Decode {
                kind,
                message: e.to_string(),
            })
        })
        .await
    }

    /// Follows `opc-next-page` until the service stops returning one.
    pub async fn fetch_all_pages<T, F>(
        &self,
        base_url: &str,
        query: &[(&str, String)],
        page_size: u32,
        parse_fn: F,
    ) -> Result<Vec<T>, OciError>
    where
        F: Fn(serde_json::Value) -> Result<Vec<T>, OciError>,
    {
        let mut all_results = Vec::new();
        let mut page: Option<String> = None;

        loop {
            let mut params = query.to_vec();
            params.push(("limit", page_size.to_string()));
            if let Some(token) = &page {
                params.push(("page", token.clone()));
            }
            let url = format!("{}?{}", base_url, encode_query(&params));

            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(error_from_response(response, None).await);
            }

            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());

            let body: serde_json::Value = response.json().await?;
            all_results.extend(parse_fn(body)?);

            match next_page {
                Some(token) => page = Some(token),
                None => break,
            }
        }

        Ok(all_results)
    }

    /// Fetches a single resource, `None` when OCI reports it missing.
    pub async fn get_resource(
        &self,
        region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<ResourceDescriptor>, OciError> {
        let url = self.resource_url(region, kind, id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return match error_from_response(response, Some((kind, id))).await {
                OciError::NotFound { .. } => Ok(None),
                err => Err(err),
            };
        }

        let descriptor = response.json().await.map_err(|e| OciError::Decode {
            kind,
            message: e.to_string(),
        })?;
        Ok(Some(descriptor))
    }

    pub async fn delete_resource(
        &self,
        region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), OciError> {
        let endpoint = Endpoint::for_kind(kind);
        let mut url = self.resource_url(region, kind, id);
        if !endpoint.delete_query.is_empty() {
            let params: Vec<(&str, String)> = endpoint
                .delete_query
                .iter()
                .map(|(key, value)| (*key, value.to_string()))
                .collect();
            url = format!("{}?{}", url, encode_query(&params));
        }

        let response = self.client.delete(&url).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, Some((kind, id))).await);
        }
        Ok(())
    }

    pub async fn get_vnic(&self, region: &str, vnic_id: &str) -> Result<Vnic, OciError> {
        let url = self.resource_url(region, ResourceKind::Vnic, vnic_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, Some((ResourceKind::Vnic, vnic_id))).await);
        }

        response.json().await.map_err(|e| OciError::Decode {
            kind: ResourceKind::Vnic,
            message: e.to_string(),
        })
    }

    /// Empties a route table, the only thing that can be done to a VCN's default one.
    pub async fn clear_route_rules(&self, region: &str, route_table_id: &str) -> Result<(), OciError> {
        let url = self.resource_url(region, ResourceKind::RouteTable, route_table_id);
        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "routeRules": [] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(
                error_from_response(response, Some((ResourceKind::RouteTable, route_table_id)))
                    .await,
            );
        }
        Ok(())
    }

    pub async fn region_subscriptions(
        &self,
        home_region: &str,
        tenancy_id: &str,
    ) -> Result<Vec<RegionSubscription>, OciError> {
        let url = format!(
            "{}/tenancies/{}/regionSubscriptions",
            self.service_url(home_region, Service::Identity),
            urlencoding::encode(tenancy_id)
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, None).await);
        }

        response.json().await.map_err(|e| OciError::Decode {
            kind: ResourceKind::Compartment,
            message: format!("Failed to parse region subscriptions: {}", e),
        })
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn error_from_response(
    response: reqwest::Response,
    target: Option<(ResourceKind, &str)>,
) -> OciError {
    let status = response.status().as_u16();
    let body: OciErrorBody = response.json().await.unwrap_or_default();

    match (status, target) {
        (401, _) => OciError::Auth {
            message: body.message,
        },
        (404, Some((kind, id))) => OciError::NotFound {
            kind,
            id: id.to_string(),
        },
        (409, _) => OciError::Conflict {
            code: body.code,
            message: body.message,
        },
        // NOTE: default security lists are refused with a 400 mentioning "default"
        (400, Some((ResourceKind::SecurityList | ResourceKind::RouteTable, _)))
            if body.message.to_lowercase().contains("default") =>
        {
            OciError::Conflict {
                code: body.code,
                message: body.message,
            }
        }
        _ => OciError::Api {
            status,
            code: body.code,
            message: body.message,
        },
    }
}

impl std::fmt::Debug for OciClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciClient")
            .field("endpoint_template", &self.endpoint_template)
            .field("authorization", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OciClient::new(Some("Bearer test_token".to_string()));
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_creation_without_token() {
        assert!(OciClient::new(None).is_ok());
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let result = OciClient::new(Some("bad\ntoken".to_string()));
        assert!(matches!(result, Err(OciError::Auth { .. })));
    }

    #[test]
    fn test_debug_does_not_expose_token() {
        let client = OciClient::new(Some("super_secret_token_12345".to_string())).unwrap();
        let debug_output = format!("{:?}", client);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(
            !debug_output.contains("super_secret_token_12345"),
            "Debug output must NOT contain the actual token"
        );
    }

    #[test]
    fn test_service_url_from_template() {
        let client = OciClient::new(None).unwrap();
        assert_eq!(
            client.service_url("eu-frankfurt-1", Service::Core),
            "https://iaas.eu-frankfurt-1.oraclecloud.com/20160918"
        );
        assert_eq!(
            client.service_url("us-ashburn-1", Service::LoadBalancer),
            "https://iaas.us-ashburn-1.oraclecloud.com/20170115"
        );
        assert_eq!(
            client.service_url("us-ashburn-1", Service::Identity),
            "https://identity.us-ashburn-1.oraclecloud.com/20160918"
        );
    }

    #[test]
    fn test_service_url_without_placeholders() {
        let client =
            OciClient::with_base_url(None, "http://127.0.0.1:8080/".to_string()).unwrap();
        assert_eq!(
            client.service_url("eu-frankfurt-1", Service::Database),
            "http://127.0.0.1:8080/20160918"
        );
    }

    #[test]
    fn test_encode_query_escapes_values() {
        let query = encode_query(&[
            ("compartmentId", "ocid1.compartment.oc1..a b".to_string()),
            ("limit", "100".to_string()),
        ]);
        assert_eq!(query, "compartmentId=ocid1.compartment.oc1..a%20b&limit=100");
    }

    #[test]
    fn test_client_is_clone() {
        let client = OciClient::new(None).unwrap();
        let _cloned = client.clone();
    }
}
