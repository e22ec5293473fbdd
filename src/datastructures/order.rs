use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use uuid::Uuid;

/// Side code as the trade endpoints expect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn code(self) -> u8 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => 2,
        }
    }
}

impl Serialize for OrderSide {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Whether a commit request may actually be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    Live,
    /// Price and validate only; never reaches a commit endpoint.
    #[default]
    DryRun,
}

impl ExecutionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Live
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == ExecutionMode::DryRun
    }
}

/// Reply returned in place of a sell commit when running dry.
pub fn dry_run_marker() -> Value {
    json!({"Outcome": "Success", "Message": "Dry Run Success"})
}

/// Market order description sent to `validateBuy` / `validateSell`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderValidation {
    allow_ext_hrs_fill: bool,
    display_amount: Value,
    entrust_amount: Value,
    fractions: bool,
    fractions_type: u8,
    is_combined_option: bool,
    is_option: bool,
    order_side: OrderSide,
    order_source: u8,
    order_time_in_force: &'static str,
    symbol: String,
    trade_native_type: u8,
    #[serde(rename = "type")]
    order_type: &'static str,
    us_account_id: String,
}

impl OrderValidation {
    /// `amount` is sent as-is: the buy endpoint takes a number, the sell endpoint a string.
    pub fn market(symbol: &str, amount: Value, side: OrderSide, account: &str) -> Self {
        OrderValidation {
            allow_ext_hrs_fill: false,
            display_amount: amount.clone(),
            entrust_amount: amount,
            fractions: false,
            fractions_type: 0,
            is_combined_option: false,
            is_option: false,
            order_side: side,
            order_source: 0,
            order_time_in_force: "DAY",
            symbol: symbol.to_string(),
            trade_native_type: 0,
            order_type: "MARKET",
            us_account_id: account.to_string(),
        }
    }
}

/// Sellable-quantity lookup for `closeTradeAmount`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsCheck {
    fractions: bool,
    fractions_type: u8,
    order_side: OrderSide,
    symbol: String,
    us_account_id: String,
}

impl HoldingsCheck {
    pub fn new(symbol: &str, account: &str) -> Self {
        HoldingsCheck {
            fractions: false,
            fractions_type: 0,
            order_side: OrderSide::Sell,
            symbol: symbol.to_string(),
            us_account_id: account.to_string(),
        }
    }
}

/// The `Data` block of a successful validation.
///
/// Amounts and price stay raw JSON so they are echoed to the commit exactly as
/// the server priced them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedOrder {
    pub allow_ext_hrs_fill: bool,
    pub display_amount: Value,
    pub entrust_amount: Value,
    pub entrust_price: Value,
    pub fractions: bool,
    pub fractions_type: Value,
    pub order_time_in_force: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub total_with_commission: Option<Value>,
}

impl PricedOrder {
    pub fn from_validation(response: &Value) -> ClientResult<Self> {
        let data = response
            .get("Data")
            .ok_or_else(|| ClientError::MalformedValidation("missing Data".to_string()))?;
        let priced: PricedOrder = serde_json::from_value(data.clone())
            .map_err(|e| ClientError::MalformedValidation(e.to_string()))?;

        if priced.entrust_price.is_null() || priced.entrust_amount.is_null() {
            return Err(ClientError::MalformedValidation(
                "entrustPrice and entrustAmount must be present".to_string(),
            ));
        }
        Ok(priced)
    }
}

/// Payload for the `buy` / `sell` commit endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCommit {
    allow_ext_hrs_fill: bool,
    display_amount: Value,
    entrust_amount: Value,
    entrust_price: Value,
    fractions: bool,
    fractions_type: Value,
    idempotent_id: String,
    is_combined_option: bool,
    is_option: bool,
    order_side: OrderSide,
    order_source: u8,
    order_time_in_force: String,
    symbol: String,
    trade_native_type: u8,
    #[serde(rename = "type")]
    order_type: String,
    us_account_id: String,
}

impl OrderCommit {
    /// Copies every priced field from the validation; only identity fields come from the caller.
    pub fn from_priced(priced: &PricedOrder, side: OrderSide, symbol: &str, account: &str) -> Self {
        OrderCommit {
            allow_ext_hrs_fill: priced.allow_ext_hrs_fill,
            display_amount: priced.display_amount.clone(),
            entrust_amount: priced.entrust_amount.clone(),
            entrust_price: priced.entrust_price.clone(),
            fractions: priced.fractions,
            fractions_type: priced.fractions_type.clone(),
            idempotent_id: Uuid::new_v4().to_string(),
            is_combined_option: false,
            is_option: false,
            order_side: side,
            order_source: 0,
            order_time_in_force: priced.order_time_in_force.clone(),
            symbol: symbol.to_string(),
            trade_native_type: 0,
            order_type: priced.order_type.clone(),
            us_account_id: account.to_string(),
        }
    }

    /// Sell commit built from caller-supplied quantity and price.
    pub fn market_sell(symbol: &str, quantity: u64, account: &str, entrust_price: Value) -> Self {
        OrderCommit {
            allow_ext_hrs_fill: false,
            display_amount: json!(quantity.to_string()),
            entrust_amount: json!(quantity.to_string()),
            entrust_price,
            fractions: false,
            fractions_type: json!(0),
            idempotent_id: Uuid::new_v4().to_string(),
            is_combined_option: false,
            is_option: false,
            order_side: OrderSide::Sell,
            order_source: 0,
            order_time_in_force: "DAY".to_string(),
            symbol: symbol.to_string(),
            trade_native_type: 0,
            order_type: "MARKET".to_string(),
            us_account_id: account.to_string(),
        }
    }

    pub fn idempotent_id(&self) -> &str {
        &self.idempotent_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_response() -> Value {
        json!({
            "Outcome": "Success",
            "Data": {
                "allowExtHrsFill": true,
                "displayAmount": "10",
                "entrustAmount": 10,
                "entrustPrice": 12.34,
                "fractions": false,
                "fractionsType": 0,
                "orderTimeInForce": "GTC",
                "type": "LIMIT",
                "totalWithCommission": 123.4
            }
        })
    }

    #[test]
    fn test_side_codes() {
        assert_eq!(serde_json::to_value(OrderSide::Buy).unwrap(), json!(1));
        assert_eq!(serde_json::to_value(OrderSide::Sell).unwrap(), json!(2));
    }

    #[test]
    fn test_validation_payload_shape() {
        let payload = serde_json::to_value(OrderValidation::market(
            "AAPL",
            json!(3),
            OrderSide::Buy,
            "ACC-1",
        ))
        .unwrap();

        assert_eq!(
            payload,
            json!({
                "allowExtHrsFill": false,
                "displayAmount": 3,
                "entrustAmount": 3,
                "fractions": false,
                "fractionsType": 0,
                "isCombinedOption": false,
                "isOption": false,
                "orderSide": 1,
                "orderSource": 0,
                "orderTimeInForce": "DAY",
                "symbol": "AAPL",
                "tradeNativeType": 0,
                "type": "MARKET",
                "usAccountId": "ACC-1"
            })
        );
    }

    #[test]
    fn test_commit_copies_priced_fields() {
        let priced = PricedOrder::from_validation(&validation_response()).unwrap();
        let commit = OrderCommit::from_priced(&priced, OrderSide::Buy, "AAPL", "ACC-1");
        let payload = serde_json::to_value(&commit).unwrap();

        assert_eq!(payload["entrustPrice"], json!(12.34));
        assert_eq!(payload["entrustAmount"], json!(10));
        assert_eq!(payload["displayAmount"], json!("10"));
        assert_eq!(payload["allowExtHrsFill"], json!(true));
        assert_eq!(payload["orderTimeInForce"], json!("GTC"));
        assert_eq!(payload["type"], json!("LIMIT"));
        assert_eq!(payload["orderSide"], json!(1));
        assert_eq!(payload["idempotentId"], json!(commit.idempotent_id()));
        assert!(payload.get("totalWithCommission").is_none());
    }

    #[test]
    fn test_idempotency_tokens_are_fresh() {
        let priced = PricedOrder::from_validation(&validation_response()).unwrap();
        let a = OrderCommit::from_priced(&priced, OrderSide::Buy, "AAPL", "ACC-1");
        let b = OrderCommit::from_priced(&priced, OrderSide::Buy, "AAPL", "ACC-1");
        assert_ne!(a.idempotent_id(), b.idempotent_id());
        assert!(Uuid::parse_str(a.idempotent_id()).is_ok());
    }

    #[test]
    fn test_missing_priced_fields_rejected() {
        let mut response = validation_response();
        response["Data"]
            .as_object_mut()
            .unwrap()
            .remove("entrustPrice");
        assert!(matches!(
            PricedOrder::from_validation(&response),
            Err(ClientError::MalformedValidation(_))
        ));

        let no_data = json!({"Outcome": "Success"});
        assert!(PricedOrder::from_validation(&no_data).is_err());
    }

    #[test]
    fn test_market_sell_uses_string_amounts() {
        let commit = OrderCommit::market_sell("TSLA", 4, "ACC-9", json!("201.55"));
        let payload = serde_json::to_value(&commit).unwrap();
        assert_eq!(payload["entrustAmount"], json!("4"));
        assert_eq!(payload["entrustPrice"], json!("201.55"));
        assert_eq!(payload["orderSide"], json!(2));
        assert_eq!(payload["type"], json!("MARKET"));
    }

    #[test]
    fn test_execution_mode() {
        assert!(ExecutionMode::from_dry_run(true).is_dry_run());
        assert!(!ExecutionMode::from_dry_run(false).is_dry_run());
        assert_eq!(ExecutionMode::default(), ExecutionMode::DryRun);
    }
}
