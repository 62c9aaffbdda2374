//! HTTP client for a trading-terminal bridge.
//!
//! The bridge is a small process colocated with the terminal that exposes
//! each terminal call as `POST {base_url}/{endpoint}` with a JSON body. It
//! answers `null` when the terminal has no data and `503` when the terminal
//! itself is disconnected.

use std::time::Duration;

use fxshadow_core::{
    AccountSummary, Bar, BrokerPosition, OrderAck, OrderRequest, OrderSide, PositionFilter, Price,
    Size, Symbol, SymbolInfo, Tick, Timeframe,
};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{BrokerError, BrokerResult};
use crate::oracle::{BoxFuture, BrokerOracle, BrokerSession, Credentials};

/// Default timeout for bridge requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SymbolRequest<'a> {
    symbol: &'a Symbol,
}

#[derive(Debug, Serialize)]
struct RatesRequest<'a> {
    symbol: &'a Symbol,
    timeframe: Timeframe,
    count: usize,
}

#[derive(Debug, Serialize)]
struct MarginRequest<'a> {
    symbol: &'a Symbol,
    side: OrderSide,
    volume: Size,
    price: Price,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    login: u64,
    password: &'a str,
    server: &'a str,
}

#[derive(Debug, Serialize)]
struct Empty {}

/// Bridge-backed broker oracle.
pub struct BridgeClient {
    client: Client,
    base_url: String,
}

impl BridgeClient {
    /// Create a new bridge client.
    ///
    /// # Arguments
    /// * `base_url` - bridge root URL (e.g., "http://127.0.0.1:18812")
    pub fn new(base_url: impl Into<String>) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, R>(&self, endpoint: &str, body: &B) -> BrokerResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(%url, "Bridge request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    BrokerError::Disconnected(format!("bridge unreachable: {e}"))
                } else {
                    BrokerError::Http(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Disconnected(format!("terminal offline: {body}")));
        }
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::LoginFailed(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Http(format!("HTTP {status}: {body}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrokerError::Http(format!("Failed to read response: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// A `null` position answer means the terminal could not say, which is not
/// the same as holding no positions.
fn position_list(
    answer: Option<Vec<BrokerPosition>>,
    filter: &PositionFilter,
) -> BrokerResult<Vec<BrokerPosition>> {
    answer.ok_or_else(|| BrokerError::Unavailable(format!("positions {filter:?}")))
}

impl BrokerOracle for BridgeClient {
    fn bars<'a>(
        &'a self,
        symbol: &'a Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<Bar>>> {
        Box::pin(async move {
            let request = RatesRequest {
                symbol,
                timeframe,
                count,
            };
            let bars: Option<Vec<Bar>> = self.call("rates", &request).await?;
            Ok(bars.unwrap_or_default())
        })
    }

    fn tick<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, BrokerResult<Option<Tick>>> {
        Box::pin(async move { self.call("tick", &SymbolRequest { symbol }).await })
    }

    fn symbol_info<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, BrokerResult<Option<SymbolInfo>>> {
        Box::pin(async move { self.call("symbol_info", &SymbolRequest { symbol }).await })
    }

    fn symbols(&self) -> BoxFuture<'_, BrokerResult<Vec<SymbolInfo>>> {
        Box::pin(async move {
            let symbols: Option<Vec<SymbolInfo>> = self.call("symbols", &Empty {}).await?;
            Ok(symbols.unwrap_or_default())
        })
    }

    fn positions(&self, filter: PositionFilter) -> BoxFuture<'_, BrokerResult<Vec<BrokerPosition>>> {
        Box::pin(async move {
            let positions: Option<Vec<BrokerPosition>> = self.call("positions", &filter).await?;
            position_list(positions, &filter)
        })
    }

    fn send_order(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<Option<OrderAck>>> {
        Box::pin(async move { self.call("order_send", &request).await })
    }

    fn account(&self) -> BoxFuture<'_, BrokerResult<Option<AccountSummary>>> {
        Box::pin(async move { self.call("account_info", &Empty {}).await })
    }

    fn margin_required<'a>(
        &'a self,
        symbol: &'a Symbol,
        side: OrderSide,
        volume: Size,
        price: Price,
    ) -> BoxFuture<'a, BrokerResult<Option<Decimal>>> {
        Box::pin(async move {
            let request = MarginRequest {
                symbol,
                side,
                volume,
                price,
            };
            self.call("order_calc_margin", &request).await
        })
    }
}

impl BrokerSession for BridgeClient {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, BrokerResult<()>> {
        Box::pin(async move {
            info!(login = credentials.login, server = %credentials.server, "Logging in");
            let request = LoginRequest {
                login: credentials.login,
                password: credentials.password.as_str(),
                server: &credentials.server,
            };
            let ok: bool = self.call("login", &request).await?;
            if ok {
                Ok(())
            } else {
                Err(BrokerError::LoginFailed(format!(
                    "terminal refused login {}",
                    credentials.login
                )))
            }
        })
    }

    fn logout(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            let _: Option<bool> = self.call("logout", &Empty {}).await?;
            Ok(())
        })
    }
}
