use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client as HttpClient, Method,
};
use serde_json::Value;
use url::Url;

/// Every endpoint of the mobile API this client speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    SystemInform,
    Captcha,
    VerificationCode,
    LoginTicket,
    Login,
    AccountAssets,
    AccountHoldings,
    AccountInfo,
    ValidateBuy,
    Buy,
    CloseTradeAmount,
    ValidateSell,
    Sell,
}

impl Endpoint {
    /// Pre-login endpoints are tagged with `guest=1`.
    pub fn is_guest(self) -> bool {
        matches!(
            self,
            Endpoint::SystemInform
                | Endpoint::VerificationCode
                | Endpoint::LoginTicket
                | Endpoint::Login
        )
    }

    /// Sell-side endpoints are pinned to the older app build.
    pub fn uses_legacy_version(self) -> bool {
        matches!(
            self,
            Endpoint::CloseTradeAmount | Endpoint::ValidateSell | Endpoint::Sell
        )
    }

    /// Endpoints that commit an order. Never reached in dry-run mode.
    pub fn is_commit(self) -> bool {
        matches!(self, Endpoint::Buy | Endpoint::Sell)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A fully assembled request, ready for a [`Transport`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: Option<Endpoint>,
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Cookies set by the response, as (name, value).
    pub cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json(&self) -> ClientResult<Value> {
        serde_json::from_slice(&self.body).map_err(|source| ClientError::Decode {
            status: self.status,
            source,
        })
    }

    pub fn is_image(&self) -> bool {
        self.status == 200
            && self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.contains("image"))
    }
}

/// `true` when a server reply reports `"Outcome": "Success"`.
pub fn outcome_is_success(body: &Value) -> bool {
    body.get("Outcome").and_then(Value::as_str) == Some("Success")
}

/// Issues exactly one HTTP exchange per call. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: HttpClient,
}

impl ReqwestTransport {
    pub fn new(proxy: Option<&str>) -> ClientResult<Self> {
        let mut builder = HttpClient::builder();
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(ReqwestTransport {
            http_client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let builder = self
            .http_client
            .request(request.method, request.url)
            .headers(headers);
        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let cookies = response
            .cookies()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            content_type,
            cookies,
            body,
        })
    }
}
