use crate::datastructures::{
    account::AccountQuery,
    auth::{login_ticket_payload, verification_code_payload, AuthState, VerificationChannel},
    client::{
        outcome_is_success, ApiRequest, ApiResponse, Endpoint, ReqwestTransport, RequestBody,
        Transport,
    },
    config::Config,
    order::{
        dry_run_marker, ExecutionMode, HoldingsCheck, OrderCommit, OrderSide, OrderValidation,
        PricedOrder,
    },
    session::CookieJar,
};
use crate::error::{ClientError, ClientResult};
use image::DynamicImage;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn endpoint_path(endpoint: Endpoint) -> &'static str {
    match endpoint {
        Endpoint::SystemInform => "/api/v2/system/inform",
        Endpoint::Captcha => "/api/v2/security/captcha",
        Endpoint::VerificationCode => "/api/v2/tools/nonLogin/sms",
        Endpoint::LoginTicket => "/api/v2/multipleFactors/authentication/generateLoginTicket",
        Endpoint::Login => "/api/v2/security/login",
        Endpoint::AccountAssets => "/api/v2/account/assetByUser",
        Endpoint::AccountHoldings => "/api/v2/trade/positions",
        Endpoint::AccountInfo => "/api/v2/account/info",
        Endpoint::ValidateBuy => "/api/v2/us/trade/validateBuy",
        Endpoint::Buy => "/api/v2/trade/buy",
        Endpoint::CloseTradeAmount => "/api/v2/trade/closeTradeAmount",
        Endpoint::ValidateSell => "/api/v2/us/trade/validateSell",
        Endpoint::Sell => "/api/v2/trade/sell",
    }
}

/// Cache-busting `_s` token for the current instant.
pub fn cache_buster() -> String {
    cache_buster_at(SystemTime::now())
}

/// `<seconds>+<fraction>` in lowercase hex, the fraction being the sub-second
/// part written out to 18 decimal places and read back as an integer.
pub fn cache_buster_at(time: SystemTime) -> String {
    let elapsed = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let fraction = u64::from(elapsed.subsec_nanos()) * 1_000_000_000;
    format!("{:x}+{:x}", elapsed.as_secs(), fraction)
}

/// Commit payload echoing the server-priced fields of a successful validation.
fn priced_commit(
    validation: &Value,
    side: OrderSide,
    symbol: &str,
    account: &str,
) -> ClientResult<OrderCommit> {
    let priced = PricedOrder::from_validation(validation)?;
    Ok(OrderCommit::from_priced(&priced, side, symbol, account))
}

/// Stateful client for one DSPAC login. Owns its cookie jar; use one client per account.
pub struct DspacClient<T: Transport = ReqwestTransport> {
    transport: T,
    config: Config,
    cookies: CookieJar,
    auth_state: AuthState,
}

impl DspacClient<ReqwestTransport> {
    pub fn new(config: &Config) -> ClientResult<Self> {
        let transport = ReqwestTransport::new(config.proxy.as_deref())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DspacClient<T> {
    pub fn with_transport(config: &Config, transport: T) -> Self {
        let cookies = CookieJar::load(&config.cookie_path);
        info!("DSPAC client initialized for {}", config.username);

        DspacClient {
            transport,
            config: config.clone(),
            cookies,
            auth_state: AuthState::default(),
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn build_url(&self, endpoint: Endpoint, params: &[(&str, &str)]) -> ClientResult<Url> {
        // Appended rather than joined so a path prefix in `base_url` survives.
        let mut url = Url::parse(&format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint_path(endpoint)
        ))?;

        let version = if endpoint.uses_legacy_version() {
            &self.config.legacy_app_version
        } else {
            &self.config.app_version
        };

        let mut query = Vec::new();
        if endpoint.is_guest() {
            query.push("guest=1".to_string());
        }
        query.extend(params.iter().map(|(key, value)| format!("{key}={value}")));
        query.push(format!("_v={version}"));
        // The `+` separator must reach the server unescaped.
        query.push(format!("_s={}", cache_buster()));
        url.set_query(Some(&query.join("&")));

        Ok(url)
    }

    fn identity_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            ("Accept-Language".to_string(), "en".to_string()),
        ];
        if let Some(cookie) = self.cookies.header_value() {
            headers.push(("Cookie".to_string(), cookie));
        }
        headers
    }

    /// One network round trip. Cookies the server sets are merged and persisted at once.
    async fn send(
        &mut self,
        endpoint: Endpoint,
        method: Method,
        params: &[(&str, &str)],
        body: RequestBody,
    ) -> ClientResult<ApiResponse> {
        let url = self.build_url(endpoint, params)?;
        let mut headers = self.identity_headers();
        match &body {
            RequestBody::Json(_) => {
                headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()))
            }
            RequestBody::Form(_) => {
                headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()))
            }
            RequestBody::Empty => {}
        }
        if matches!(
            endpoint,
            Endpoint::AccountAssets | Endpoint::AccountHoldings | Endpoint::AccountInfo
        ) {
            headers.push(("Tz".to_string(), self.config.timezone_offset.clone()));
            headers.push(("Tzname".to_string(), self.config.timezone_name.clone()));
        }

        debug!("{} {:?} {}", method, endpoint, url.path());
        let response = self
            .transport
            .send(ApiRequest {
                endpoint: Some(endpoint),
                method,
                url,
                headers,
                body,
            })
            .await?;
        debug!("{:?} answered with status {}", endpoint, response.status);

        if self.cookies.merge(response.cookies.iter().cloned()) {
            if let Err(e) = self.cookies.save().await {
                // A placed order must still reach the caller.
                if !endpoint.is_commit() {
                    return Err(e);
                }
                warn!("{:?} succeeded but the session could not be saved: {}", endpoint, e);
            }
        }
        Ok(response)
    }

    async fn get_json(
        &mut self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> ClientResult<Value> {
        self.send(endpoint, Method::GET, params, RequestBody::Empty)
            .await?
            .json()
    }

    async fn post_json<B: Serialize>(
        &mut self,
        endpoint: Endpoint,
        body: &B,
    ) -> ClientResult<Value> {
        let body = serde_json::to_value(body).map_err(ClientError::Encode)?;
        self.send(endpoint, Method::POST, &[], RequestBody::Json(body))
            .await?
            .json()
    }

    /// Reports the egress IP seen through the configured proxy.
    pub async fn check_proxy(&self) -> ClientResult<Value> {
        let url = Url::parse(&self.config.proxy_check_url)?;
        info!("Checking current IP via {}", url);

        let response = self
            .transport
            .send(ApiRequest {
                endpoint: None,
                method: Method::GET,
                url,
                headers: vec![("User-Agent".to_string(), self.config.user_agent.clone())],
                body: RequestBody::Empty,
            })
            .await?;
        response.json()
    }

    // Authentication

    /// Anonymous request that seeds the baseline session cookies.
    pub async fn initial_handshake(&mut self) -> ClientResult<Value> {
        self.get_json(Endpoint::SystemInform, &[]).await
    }

    /// Fetches the challenge image. `None` when the server did not send a decodable image.
    pub async fn request_captcha(&mut self) -> ClientResult<Option<DynamicImage>> {
        let response = self
            .send(Endpoint::Captcha, Method::GET, &[], RequestBody::Empty)
            .await?;

        if !response.is_image() {
            warn!(
                "Failed to get captcha: status {} content type {:?}",
                response.status, response.content_type
            );
            return Ok(None);
        }

        match image::load_from_memory(&response.body) {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                warn!("Error decoding captcha image: {}", e);
                Ok(None)
            }
        }
    }

    /// Asks the server to deliver a one-time code over `channel`.
    pub async fn request_verification_code(
        &mut self,
        channel: VerificationChannel,
        captcha_answer: Option<&str>,
    ) -> ClientResult<Value> {
        let data = verification_code_payload(
            channel,
            &self.config.username,
            &self.config.area_code_id,
            captcha_answer,
        );
        info!("Requesting {} verification code", channel.as_str());
        self.post_json(Endpoint::VerificationCode, &data).await
    }

    /// Exchanges credentials (and the one-time code, if any) for a login ticket.
    pub async fn generate_login_ticket(
        &mut self,
        channel: VerificationChannel,
        code: Option<&str>,
    ) -> ClientResult<Value> {
        let data = login_ticket_payload(
            channel,
            &self.config.username,
            &self.config.password,
            &self.config.area_code_id,
            code,
        );
        info!(
            "Requesting {} login ticket for {}",
            channel.as_str(),
            self.config.username
        );
        let response = self.post_json(Endpoint::LoginTicket, &data).await?;

        if outcome_is_success(&response) && self.auth_state == AuthState::Unauthenticated {
            self.auth_state = AuthState::TicketRequested;
        }
        Ok(response)
    }

    pub async fn login_with_ticket(&mut self, ticket: &str) -> ClientResult<Value> {
        info!("Logging in with ticket for {}", self.config.username);
        let form = vec![("ticket".to_string(), ticket.to_string())];
        let response = self
            .send(Endpoint::Login, Method::POST, &[], RequestBody::Form(form))
            .await?
            .json()?;

        if outcome_is_success(&response) {
            self.auth_state = AuthState::Authenticated;
            info!("Authenticated as {}", self.config.username);
        } else {
            warn!("Ticket login rejected for {}", self.config.username);
        }
        Ok(response)
    }

    // Account queries

    pub async fn query_account(&mut self, query: AccountQuery) -> ClientResult<Value> {
        self.get_json(query.endpoint(), query.params()).await
    }

    pub async fn get_account_assets(&mut self) -> ClientResult<Value> {
        self.query_account(AccountQuery::Assets).await
    }

    pub async fn get_account_holdings(&mut self) -> ClientResult<Value> {
        self.query_account(AccountQuery::Holdings).await
    }

    pub async fn get_account_info(&mut self) -> ClientResult<Value> {
        self.query_account(AccountQuery::Info).await
    }

    // Orders

    /// The only place an order reaches a commit endpoint.
    ///
    /// Dry runs answer with `dry_run_reply` before the order is even built.
    async fn commit<F>(
        &mut self,
        mode: ExecutionMode,
        endpoint: Endpoint,
        build: F,
        dry_run_reply: Value,
    ) -> ClientResult<Value>
    where
        F: FnOnce() -> ClientResult<OrderCommit>,
    {
        debug_assert!(endpoint.is_commit());
        if mode.is_dry_run() {
            debug!("Dry run: {:?} not submitted", endpoint);
            return Ok(dry_run_reply);
        }

        let order = build()?;

        info!("Submitting {:?} (idempotency {})", endpoint, order.idempotent_id());
        self.post_json(endpoint, &order).await
    }

    pub async fn validate_buy(
        &mut self,
        symbol: &str,
        quantity: u64,
        side: OrderSide,
        account: &str,
    ) -> ClientResult<Value> {
        debug!("Validating buy for {} shares of {}", quantity, symbol);
        let order = OrderValidation::market(symbol, json!(quantity), side, account);
        self.post_json(Endpoint::ValidateBuy, &order).await
    }

    /// Validates, then commits the server-priced order unless running dry.
    ///
    /// A failed validation is returned as-is and nothing is committed.
    pub async fn execute_buy(
        &mut self,
        symbol: &str,
        quantity: u64,
        account: &str,
        mode: ExecutionMode,
    ) -> ClientResult<Value> {
        let validation = self
            .validate_buy(symbol, quantity, OrderSide::Buy, account)
            .await?;
        if !outcome_is_success(&validation) {
            warn!("Buy validation failed for {}", symbol);
            return Ok(validation);
        }

        if mode.is_dry_run() {
            let data = &validation["Data"];
            let amount = data["entrustAmount"].to_string();
            let total = data["totalWithCommission"].to_string();
            info!(
                "Simulated buy: {} shares of {} for a total of {}",
                amount, symbol, total
            );
        }

        let reply = validation.clone();
        let build = || priced_commit(&validation, OrderSide::Buy, symbol, account);
        self.commit(mode, Endpoint::Buy, build, reply).await
    }

    /// Sellable quantity of `symbol` in `account`.
    pub async fn check_stock_holdings(
        &mut self,
        symbol: &str,
        account: &str,
    ) -> ClientResult<Value> {
        let check = HoldingsCheck::new(symbol, account);
        self.post_json(Endpoint::CloseTradeAmount, &check).await
    }

    pub async fn validate_sell(
        &mut self,
        symbol: &str,
        quantity: u64,
        account: &str,
    ) -> ClientResult<Value> {
        debug!("Validating sell for {} shares of {}", quantity, symbol);
        let amount = json!(quantity.to_string());
        let order = OrderValidation::market(symbol, amount, OrderSide::Sell, account);
        self.post_json(Endpoint::ValidateSell, &order).await
    }

    /// Commits a sell at a caller-supplied price, normally taken from [`Self::validate_sell`].
    ///
    /// Does not validate. A dry run makes no network call.
    pub async fn execute_sell(
        &mut self,
        symbol: &str,
        quantity: u64,
        account: &str,
        entrust_price: Value,
        mode: ExecutionMode,
    ) -> ClientResult<Value> {
        if mode.is_dry_run() {
            info!("Simulated sell: {} shares of {}", quantity, symbol);
        }
        let build = || Ok(OrderCommit::market_sell(symbol, quantity, account, entrust_price));
        self.commit(mode, Endpoint::Sell, build, dry_run_marker()).await
    }

    /// Sell with the same validate-then-commit flow as [`Self::execute_buy`].
    pub async fn sell(
        &mut self,
        symbol: &str,
        quantity: u64,
        account: &str,
        mode: ExecutionMode,
    ) -> ClientResult<Value> {
        let validation = self.validate_sell(symbol, quantity, account).await?;
        if !outcome_is_success(&validation) {
            warn!("Sell validation failed for {}", symbol);
            return Ok(validation);
        }

        let reply = validation.clone();
        let build = || priced_commit(&validation, OrderSide::Sell, symbol, account);
        self.commit(mode, Endpoint::Sell, build, reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn send(&self, _request: ApiRequest) -> ClientResult<ApiResponse> {
            unreachable!("no network in unit tests")
        }
    }

    fn client() -> DspacClient<Offline> {
        let config = Config::builder()
            .username("me@example.com".to_string())
            .cookie_path("/nonexistent/dspac/session.json")
            .build();
        DspacClient::with_transport(&config, Offline)
    }

    fn is_hex(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn test_cache_buster_shape() {
        let token = cache_buster();
        let (secs, frac) = token.split_once('+').unwrap();
        assert!(is_hex(secs), "{token}");
        assert!(is_hex(frac), "{token}");
    }

    #[test]
    fn test_cache_buster_known_instant() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 500_000_000);
        // 0.5 printed to 18 places is 500000000000000000.
        assert_eq!(
            cache_buster_at(time),
            format!("{:x}+{:x}", 1_700_000_000u64, 500_000_000_000_000_000u64)
        );
        assert_eq!(cache_buster_at(UNIX_EPOCH + Duration::from_secs(16)), "10+0");
    }

    #[test]
    fn test_cache_buster_differs_across_instants() {
        let t0 = UNIX_EPOCH + Duration::new(1_700_000_000, 1);
        let t1 = t0 + Duration::from_millis(1);
        let t2 = t0 + Duration::from_secs(1);
        assert_ne!(cache_buster_at(t0), cache_buster_at(t1));
        assert_ne!(cache_buster_at(t0), cache_buster_at(t2));
    }

    #[test]
    fn test_guest_url_layout() {
        let url = client().build_url(Endpoint::Login, &[]).unwrap();
        assert_eq!(url.path(), "/api/v2/security/login");
        let query = url.query().unwrap();
        assert!(query.starts_with("guest=1&_v=6.6.0&_s="), "{query}");
        assert!(query.contains('+'));
        assert!(!query.contains("%2B"));
    }

    #[test]
    fn test_holdings_url_params_and_legacy_version() {
        let c = client();
        let holdings = c
            .build_url(Endpoint::AccountHoldings, AccountQuery::Holdings.params())
            .unwrap();
        assert!(holdings
            .query()
            .unwrap()
            .starts_with("paged=false&skip=0&take=400&version=1&spac=false&_v=6.6.0&_s="));

        let sell = c.build_url(Endpoint::Sell, &[]).unwrap();
        assert!(sell.query().unwrap().starts_with("_v=5.4.1&_s="));
    }

    #[test]
    fn test_base_url_path_prefix_is_kept() {
        let config = Config::builder()
            .base_url("http://gateway.local/dspac/".to_string())
            .cookie_path("/nonexistent/dspac/session.json")
            .build();
        let c = DspacClient::with_transport(&config, Offline);

        let url = c.build_url(Endpoint::AccountInfo, &[]).unwrap();
        assert_eq!(url.path(), "/dspac/api/v2/account/info");
    }

    #[test]
    fn test_identity_headers_without_cookies() {
        let headers = client().identity_headers();
        assert!(headers.iter().any(|(k, v)| k == "User-Agent" && v.starts_with("DSPAC Dalvik")));
        assert!(!headers.iter().any(|(k, _)| k == "Cookie"));
    }

    #[tokio::test]
    async fn test_dry_run_sell_never_touches_transport() {
        let mut c = client();
        let reply = c
            .execute_sell("AAPL", 1, "ACC-1", json!(10.0), ExecutionMode::DryRun)
            .await
            .unwrap();
        assert_eq!(reply, dry_run_marker());
    }
}
