use crate::credentials::Identity;
use crate::dto::{ErrorBody, ItemEnvelope, ItemsEnvelope, LicenseEnvelope, LicenseRequest};
use crate::error::{ErrorKind, Result};
use crate::models::{Identifier, LicenseGrant, Quality};
use earmark_extract::models::CatalogMetadata;
use exn::{OptionExt, ResultExt};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::instrument;
use url::Url;

const LICENSE_RESPONSE_GROUPS: &str = "last_position_heard,pdf_url,content_reference";
const PRODUCT_RESPONSE_GROUPS: &str = "contributors,media,product_attrs,product_desc,product_extended_attrs,series";
const LIBRARY_PAGE_SIZE: &str = "1000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated client for the license and library endpoints.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    api_base: Url,
}
impl CatalogClient {
    /// Build a client for `identity`'s marketplace, or for `api_base` when
    /// given (tests, proxies).
    pub fn new(identity: &Identity, api_base: Option<Url>) -> Result<Self> {
        let api_base = match api_base {
            Some(base) => base,
            None => identity.marketplace.api_base()?,
        };
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", identity.access_token()))
            .or_raise(|| ErrorKind::Credentials("access_token"))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("client-id", HeaderValue::from_static("0"));
        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::Network)?;
        Ok(Self { http, api_base })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| ErrorKind::InvalidResponse(format!("cannot extend base URL {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ask for a download license for `asin`.
    ///
    /// # Errors
    ///
    /// [`License`](ErrorKind::License) when the service answers with an error
    /// status, a status other than `Granted`, or a grant without a content URL
    /// or voucher.
    #[instrument(skip(self), fields(api = %self.api_base))]
    pub async fn request_license(&self, asin: &str, quality: Quality) -> Result<LicenseGrant> {
        let url = self.endpoint(&["1.0", "content", asin, "licenserequest"])?;
        let body = LicenseRequest {
            drm_type: "Adrm",
            consumption_type: "Download",
            quality,
        };
        let response = self
            .http
            .post(url)
            .query(&[("response_groups", LICENSE_RESPONSE_GROUPS)])
            .json(&body)
            .send()
            .await
            .or_raise(|| ErrorKind::Network)?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            tracing::warn!(%status, "License request rejected");
            exn::bail!(ErrorKind::License(format!("HTTP {status}: {message}")));
        }
        let envelope: LicenseEnvelope =
            response.json().await.or_raise(|| ErrorKind::InvalidResponse("license response".into()))?;
        let license = envelope.content_license.ok_or_raise(|| {
            ErrorKind::License(envelope.message.unwrap_or_else(|| "no content license in response".into()))
        })?;

        let status_code = license.status_code.unwrap_or_default();
        if status_code != "Granted" {
            let message = license.message.unwrap_or_default();
            tracing::warn!(%status_code, %message, "License denied");
            exn::bail!(ErrorKind::License(format!("{status_code}: {message}").trim_end_matches(": ").to_string()));
        }
        let content_url = license
            .content_metadata
            .and_then(|m| m.content_url)
            .and_then(|u| u.offline_url)
            .ok_or_raise(|| ErrorKind::License("grant has no content URL".into()))?;
        let content_url =
            Url::parse(&content_url).or_raise(|| ErrorKind::License("grant has an invalid content URL".into()))?;
        let voucher = license
            .license_response
            .filter(|v| !v.is_empty())
            .ok_or_raise(|| ErrorKind::License("grant has no voucher".into()))?;

        tracing::info!(host = content_url.host_str(), "License granted");
        Ok(LicenseGrant {
            asin: license.asin.unwrap_or_else(|| asin.to_string()),
            content_url,
            quality,
            voucher,
            status: status_code,
        })
    }

    /// Fetch the library entry for `asin`.
    #[instrument(skip(self), fields(api = %self.api_base))]
    pub async fn product(&self, asin: &str) -> Result<CatalogMetadata> {
        let url = self.endpoint(&["1.0", "library", asin])?;
        let response = self.get(url, &[("response_groups", PRODUCT_RESPONSE_GROUPS)], asin).await?;
        let envelope: ItemEnvelope =
            response.json().await.or_raise(|| ErrorKind::InvalidResponse("library item".into()))?;
        let item = envelope.item.ok_or_raise(|| ErrorKind::NotFound(asin.to_string()))?;
        Ok(item.into())
    }

    /// Turn an identifier into an ASIN.
    ///
    /// ASINs are taken as-is (ownership is confirmed by [`product`](Self::product));
    /// SKUs are looked up in the caller's library by `sku` or `sku_lite`.
    #[instrument(skip(self), fields(api = %self.api_base, %identifier))]
    pub async fn resolve(&self, identifier: &Identifier) -> Result<String> {
        let sku = match identifier {
            Identifier::Asin(asin) => return Ok(asin.clone()),
            Identifier::Sku(sku) => sku,
        };
        let url = self.endpoint(&["1.0", "library"])?;
        let query = [("num_results", LIBRARY_PAGE_SIZE), ("response_groups", "product_attrs")];
        let response = self.get(url, &query, sku).await?;
        let envelope: ItemsEnvelope =
            response.json().await.or_raise(|| ErrorKind::InvalidResponse("library listing".into()))?;
        let asin = envelope
            .items
            .unwrap_or_default()
            .into_iter()
            .find(|item| item.has_sku(sku))
            .and_then(|item| item.asin)
            .ok_or_raise(|| ErrorKind::NotFound(sku.clone()))?;
        tracing::debug!(%asin, "Resolved SKU");
        Ok(asin)
    }

    async fn get(&self, url: Url, query: &[(&str, &str)], subject: &str) -> Result<Response> {
        let response = self.http.get(url).query(query).send().await.or_raise(|| ErrorKind::Network)?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => exn::bail!(ErrorKind::NotFound(subject.to_string())),
            status => {
                let message = error_message(response).await;
                exn::bail!(ErrorKind::InvalidResponse(format!("HTTP {status}: {message}")))
            },
        }
    }
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&text).ok().and_then(|b| b.message).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Marketplace;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> CatalogClient {
        let identity = Identity::new("token", "customer", "serial", "type", Marketplace::Us);
        CatalogClient::new(&identity, Some(Url::parse(&server.uri()).unwrap())).unwrap()
    }

    fn granted() -> serde_json::Value {
        json!({
            "content_license": {
                "asin": "B0X",
                "status_code": "Granted",
                "content_metadata": { "content_url": { "offline_url": "https://cdn.example/B0X.aaxc?sig=1" } },
                "license_response": "dm91Y2hlcg=="
            }
        })
    }

    #[tokio::test]
    async fn test_license_granted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.0/content/B0X/licenserequest"))
            .and(header("authorization", "Bearer token"))
            .and(header("client-id", "0"))
            .and(query_param("response_groups", LICENSE_RESPONSE_GROUPS))
            .and(body_json(json!({ "drm_type": "Adrm", "consumption_type": "Download", "quality": "High" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(granted()))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client(&server).await.request_license("B0X", Quality::High).await.unwrap();
        assert_eq!(grant.asin, "B0X");
        assert_eq!(grant.content_url.as_str(), "https://cdn.example/B0X.aaxc?sig=1");
        assert_eq!(grant.voucher, "dm91Y2hlcg==");
        assert_eq!(grant.status, "Granted");
    }

    #[tokio::test]
    async fn test_license_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content_license": { "status_code": "Denied", "message": "Not owned" }
            })))
            .mount(&server)
            .await;
        let err = client(&server).await.request_license("B0X", Quality::Normal).await.unwrap_err();
        assert_eq!(*err, ErrorKind::License("Denied: Not owned".into()));
    }

    #[tokio::test]
    async fn test_license_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "Forbidden" })))
            .mount(&server)
            .await;
        let err = client(&server).await.request_license("B0X", Quality::High).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::License(m) if m.contains("403") && m.contains("Forbidden")));
    }

    #[tokio::test]
    async fn test_license_without_voucher() {
        let server = MockServer::start().await;
        let mut body = granted();
        body["content_license"].as_object_mut().unwrap().remove("license_response");
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_json(body)).mount(&server).await;
        let err = client(&server).await.request_license("B0X", Quality::High).await.unwrap_err();
        assert_eq!(*err, ErrorKind::License("grant has no voucher".into()));
    }

    #[tokio::test]
    async fn test_product() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/library/B0X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item": { "asin": "B0X", "title": "My Book", "sku_lite": "BK123" }
            })))
            .mount(&server)
            .await;
        let product = client(&server).await.product("B0X").await.unwrap();
        assert_eq!(product.title.as_deref(), Some("My Book"));
        assert_eq!(product.sku_lite.as_deref(), Some("BK123"));
    }

    #[tokio::test]
    async fn test_product_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        let err = client(&server).await.product("B0MISSING").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("B0MISSING".into()));
    }

    #[tokio::test]
    async fn test_resolve_sku() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/library"))
            .and(query_param("num_results", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "asin": "B0A", "sku": "BK_A", "sku_lite": "BK_A_LITE" },
                    { "asin": "B0B", "sku": "BK_B", "sku_lite": "BK_B_LITE" }
                ]
            })))
            .mount(&server)
            .await;
        let client = client(&server).await;
        assert_eq!(client.resolve(&Identifier::Sku("BK_B_LITE".into())).await.unwrap(), "B0B");
        assert_eq!(client.resolve(&Identifier::Sku("BK_A".into())).await.unwrap(), "B0A");
        let err = client.resolve(&Identifier::Sku("BK_C".into())).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("BK_C".into()));
    }

    #[tokio::test]
    async fn test_resolve_asin_is_local() {
        let server = MockServer::start().await;
        let asin = client(&server).await.resolve(&Identifier::Asin("B0X".into())).await.unwrap();
        assert_eq!(asin, "B0X");
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
