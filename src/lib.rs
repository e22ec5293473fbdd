//! Client for the DSPAC mobile trading API.
//!
//! Covers the multi-factor login (captcha, SMS/email code, login ticket),
//! session cookies persisted across runs, account queries, and market orders
//! using the validate-then-commit flow.
//!
//! ```rust,ignore
//! use dspac_trading_client::{Config, DspacClient, ExecutionMode, VerificationChannel};
//!
//! let config = Config::builder()
//!     .username("me@example.com".to_string())
//!     .password(password)
//!     .build();
//! let mut client = DspacClient::new(&config)?;
//!
//! client.initial_handshake().await?;
//! client.generate_login_ticket(VerificationChannel::Email, None).await?;
//! let ticket = client.generate_login_ticket(VerificationChannel::Email, Some(&code)).await?;
//! client.login_with_ticket(ticket["Data"]["ticket"].as_str().unwrap_or_default()).await?;
//!
//! let preview = client.execute_buy("AAPL", 1, &account, ExecutionMode::DryRun).await?;
//! ```

pub mod datastructures;
pub mod dspac;
pub mod error;

pub use datastructures::{
    account::AccountQuery,
    auth::{AuthState, VerificationChannel},
    client::{outcome_is_success, ReqwestTransport, Transport},
    config::Config,
    order::{ExecutionMode, OrderSide, PricedOrder},
    session::CookieJar,
};
pub use dspac::DspacClient;
pub use error::{ClientError, ClientResult};
