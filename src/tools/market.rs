//! Built-in market data backend.
//!
//! Serves fixed reference data for NASDAQ, NYSE and TSX so the full pipeline
//! runs end to end without a data vendor. Every tool is a pure lookup except
//! `get_current_time`, which reads an injectable clock.

use crate::schemas::{
    CompanyProfile, ExchangeDetails, Financials, Headline, IndicatorReading, MoverList,
    SessionClock, StockDetails,
};
use crate::tools::registry::{Tool, ToolRegistry};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Names under which the market tools are registered.
pub mod tool_names {
    pub const EXCHANGE_DETAILS: &str = "get_exchange_details";
    pub const VIX_DATA: &str = "get_vix_data";
    pub const ADX_DATA: &str = "get_adx_data";
    pub const CURRENT_TIME: &str = "get_current_time";
    pub const PRE_MARKET_MOVERS: &str = "find_pre_market_movers";
    pub const STOCK_DETAILS: &str = "get_stock_details";
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Gap-screen thresholds applied by the movers tool.
///
/// A stock passes when its absolute pre-market gap, previous close and
/// pre-market volume all clear the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenCriteria {
    /// Minimum absolute gap, in percent
    pub min_gap_percent: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Minimum pre-market volume, in shares
    pub min_volume: u64,
}

impl Default for ScreenCriteria {
    fn default() -> Self {
        Self {
            min_gap_percent: 1.0,
            min_price: 5.0,
            max_price: 1000.0,
            min_volume: 100_000,
        }
    }
}

impl ScreenCriteria {
    pub fn admits(&self, stock: &StockDetails) -> bool {
        let price = stock.financials.adjusted_close;
        stock.gap_percent.abs() >= self.min_gap_percent
            && price >= self.min_price
            && price <= self.max_price
            && stock.financials.pre_market_volume >= self.min_volume
    }

    /// Read thresholds from tool arguments; absent ones keep their default.
    fn from_args(tool: &str, args: &Value) -> Result<Self> {
        let mut criteria = Self::default();
        for (name, field) in [
            ("min_gap_percent", &mut criteria.min_gap_percent),
            ("min_price", &mut criteria.min_price),
            ("max_price", &mut criteria.max_price),
        ] {
            if let Some(value) = args.get(name).filter(|v| !v.is_null()) {
                *field = value
                    .as_f64()
                    .filter(|n| n.is_finite() && *n >= 0.0)
                    .ok_or_else(|| {
                        AppError::tool(tool, format!("'{}' must be a non-negative number", name))
                    })?;
            }
        }
        if let Some(value) = args.get("min_volume").filter(|v| !v.is_null()) {
            criteria.min_volume = value.as_u64().ok_or_else(|| {
                AppError::tool(tool, "'min_volume' must be a non-negative integer")
            })?;
        }
        if criteria.min_price > criteria.max_price {
            return Err(AppError::tool(
                tool,
                format!(
                    "min_price {} exceeds max_price {}",
                    criteria.min_price, criteria.max_price
                ),
            ));
        }
        Ok(criteria)
    }
}

struct ExchangeProfile {
    details: ExchangeDetails,
    vix: f64,
    adx: f64,
    movers: Vec<String>,
}

/// Reference data shared by all market tools.
pub struct MarketData {
    exchanges: HashMap<String, ExchangeProfile>,
    stocks: HashMap<String, StockDetails>,
    clock: Clock,
}

impl Default for MarketData {
    fn default() -> Self {
        let mut data = Self {
            exchanges: HashMap::new(),
            stocks: HashMap::new(),
            clock: Arc::new(Utc::now),
        };
        data.seed();
        data
    }
}

impl MarketData {
    /// Replace the wall clock, e.g. with a fixed instant for reproducible runs.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Pin the clock to one instant.
    pub fn at(self, instant: DateTime<Utc>) -> Self {
        self.with_clock(Arc::new(move || instant))
    }

    pub fn exchange_details(&self, exchange: &str) -> Option<&ExchangeDetails> {
        self.exchanges.get(exchange).map(|p| &p.details)
    }

    fn profile(&self, tool: &str, exchange: &str) -> Result<&ExchangeProfile> {
        self.exchanges
            .get(exchange)
            .ok_or_else(|| AppError::tool(tool, format!("Exchange '{}' not found.", exchange)))
    }

    fn vix_for(&self, ticker: &str) -> Option<f64> {
        self.exchanges
            .values()
            .find(|p| p.details.volatility_index == ticker)
            .map(|p| p.vix)
    }

    fn adx_for(&self, ticker: &str) -> Option<f64> {
        self.exchanges
            .values()
            .find(|p| p.details.market_proxy == ticker)
            .map(|p| p.adx)
    }

    fn add_exchange(
        &mut self,
        exchange: &str,
        timezone: &str,
        market_proxy: &str,
        volatility_index: &str,
        ticker_suffix: &str,
        readings: (f64, f64),
        movers: &[&str],
    ) {
        self.exchanges.insert(
            exchange.to_string(),
            ExchangeProfile {
                details: ExchangeDetails {
                    exchange: exchange.to_string(),
                    timezone: timezone.to_string(),
                    utc_offset_minutes: -300,
                    market_proxy: market_proxy.to_string(),
                    volatility_index: volatility_index.to_string(),
                    ticker_suffix: ticker_suffix.to_string(),
                },
                vix: readings.0,
                adx: readings.1,
                movers: movers.iter().map(|t| t.to_string()).collect(),
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn add_stock(
        &mut self,
        ticker: &str,
        name: &str,
        sector: &str,
        industry: &str,
        market_cap: f64,
        gap_percent: f64,
        prices: (f64, f64, f64),
        pre_market_volume: u64,
        headline: &str,
    ) {
        self.stocks.insert(
            ticker.to_string(),
            StockDetails {
                ticker: ticker.to_string(),
                gap_percent,
                profile: CompanyProfile {
                    name: name.to_string(),
                    sector: sector.to_string(),
                    industry: industry.to_string(),
                    market_cap,
                },
                financials: Financials {
                    adjusted_close: prices.0,
                    pre_market_high: prices.1,
                    pre_market_low: prices.2,
                    pre_market_volume,
                },
                news: vec![Headline {
                    headline: headline.to_string(),
                    source: "Reuters".to_string(),
                }],
            },
        );
    }

    fn seed(&mut self) {
        self.add_exchange(
            "NASDAQ",
            "America/New_York",
            "QQQ",
            "^VIX",
            "",
            (18.5, 28.1),
            &["AAPL", "TSLA"],
        );
        self.add_exchange(
            "NYSE",
            "America/New_York",
            "SPY",
            "^VIX",
            "",
            (18.5, 22.4),
            &["JPM", "XOM"],
        );
        self.add_exchange(
            "TSX",
            "America/Toronto",
            "XIU.TO",
            "^VIXC",
            ".TO",
            (14.2, 17.3),
            &["SHOP.TO", "CNR.TO"],
        );

        self.add_stock(
            "AAPL",
            "Apple Inc.",
            "Technology",
            "Consumer Electronics",
            3.1e12,
            5.2,
            (185.64, 195.50, 192.00),
            1_250_000,
            "Apple reports record quarterly earnings",
        );
        self.add_stock(
            "TSLA",
            "Tesla, Inc.",
            "Consumer Cyclical",
            "Auto Manufacturers",
            7.8e11,
            -2.8,
            (248.42, 243.10, 239.75),
            980_000,
            "Tesla deliveries miss analyst estimates",
        );
        self.add_stock(
            "JPM",
            "JPMorgan Chase & Co.",
            "Financial Services",
            "Banks - Diversified",
            5.6e11,
            2.1,
            (196.30, 200.90, 198.40),
            610_000,
            "JPMorgan beats on net interest income",
        );
        self.add_stock(
            "XOM",
            "Exxon Mobil Corporation",
            "Energy",
            "Oil & Gas Integrated",
            4.4e11,
            -1.9,
            (112.75, 110.90, 109.80),
            540_000,
            "Crude slides as inventories build",
        );
        self.add_stock(
            "SHOP.TO",
            "Shopify Inc.",
            "Technology",
            "Software - Application",
            1.4e11,
            3.1,
            (104.20, 107.65, 106.10),
            450_000,
            "Shopify expands merchant financing program",
        );
        self.add_stock(
            "CNR.TO",
            "Canadian National Railway Company",
            "Industrials",
            "Railroads",
            1.1e11,
            -1.5,
            (171.05, 169.30, 168.20),
            320_000,
            "CN Rail trims volume guidance",
        );
    }
}

fn str_arg<'a>(tool: &str, args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::tool(tool, format!("missing string argument '{}'", name)))
}

fn to_value<T: serde::Serialize>(tool: &str, record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| AppError::tool(tool, e.to_string()))
}

pub struct ExchangeDetailsTool {
    data: Arc<MarketData>,
}

#[async_trait]
impl Tool for ExchangeDetailsTool {
    fn name(&self) -> &str {
        tool_names::EXCHANGE_DETAILS
    }

    fn description(&self) -> &str {
        "Look up timezone, market proxy and volatility index for an exchange"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exchange": { "type": "string", "description": "Exchange code, e.g. NASDAQ" }
            },
            "required": ["exchange"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let exchange = str_arg(self.name(), &args, "exchange")?;
        let profile = self.data.profile(self.name(), exchange)?;
        to_value(self.name(), &profile.details)
    }
}

pub struct VixDataTool {
    data: Arc<MarketData>,
}

#[async_trait]
impl Tool for VixDataTool {
    fn name(&self) -> &str {
        tool_names::VIX_DATA
    }

    fn description(&self) -> &str {
        "Fetch the latest reading of a volatility index"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "volatility_index": { "type": "string", "description": "Index ticker, e.g. ^VIX" }
            },
            "required": ["volatility_index"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let ticker = str_arg(self.name(), &args, "volatility_index")?;
        let value = self
            .data
            .vix_for(ticker)
            .ok_or_else(|| AppError::tool(self.name(), format!("no data for '{}'", ticker)))?;
        to_value(
            self.name(),
            &IndicatorReading {
                ticker: ticker.to_string(),
                value,
            },
        )
    }
}

pub struct AdxDataTool {
    data: Arc<MarketData>,
}

#[async_trait]
impl Tool for AdxDataTool {
    fn name(&self) -> &str {
        tool_names::ADX_DATA
    }

    fn description(&self) -> &str {
        "Fetch the 14-period ADX of a market proxy"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "market_proxy": { "type": "string", "description": "Proxy ticker, e.g. QQQ" },
                "period": { "type": "integer", "default": 14 }
            },
            "required": ["market_proxy"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let ticker = str_arg(self.name(), &args, "market_proxy")?;
        let value = self
            .data
            .adx_for(ticker)
            .ok_or_else(|| AppError::tool(self.name(), format!("no data for '{}'", ticker)))?;
        to_value(
            self.name(),
            &IndicatorReading {
                ticker: ticker.to_string(),
                value,
            },
        )
    }
}

pub struct CurrentTimeTool {
    data: Arc<MarketData>,
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        tool_names::CURRENT_TIME
    }

    fn description(&self) -> &str {
        "Current UTC time and the exchange-local wall clock"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_minutes": { "type": "integer" }
            },
            "required": ["utc_offset_minutes"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let offset = args
            .get("utc_offset_minutes")
            .and_then(Value::as_i64)
            .filter(|m| m.abs() < 24 * 60)
            .ok_or_else(|| {
                AppError::tool(self.name(), "missing integer argument 'utc_offset_minutes'")
            })?;

        let now = (self.data.clock)();
        let local = now + Duration::minutes(offset);
        to_value(
            self.name(),
            &SessionClock {
                utc: now.to_rfc3339(),
                local: local.format("%H:%M").to_string(),
                utc_offset_minutes: offset as i32,
            },
        )
    }
}

pub struct PreMarketMoversTool {
    data: Arc<MarketData>,
}

#[async_trait]
impl Tool for PreMarketMoversTool {
    fn name(&self) -> &str {
        tool_names::PRE_MARKET_MOVERS
    }

    fn description(&self) -> &str {
        "Screen an exchange for pre-market gappers, largest absolute gap first"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exchange": { "type": "string" },
                "min_gap_percent": { "type": "number", "minimum": 0 },
                "min_price": { "type": "number", "minimum": 0 },
                "max_price": { "type": "number", "minimum": 0 },
                "min_volume": { "type": "integer", "minimum": 0 }
            },
            "required": ["exchange"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let exchange = str_arg(self.name(), &args, "exchange")?;
        let criteria = ScreenCriteria::from_args(self.name(), &args)?;
        let profile = self.data.profile(self.name(), exchange)?;

        let mut gappers: Vec<&StockDetails> = profile
            .movers
            .iter()
            .filter_map(|ticker| self.data.stocks.get(ticker))
            .filter(|stock| criteria.admits(stock))
            .collect();
        gappers.sort_by(|a, b| b.gap_percent.abs().total_cmp(&a.gap_percent.abs()));

        to_value(
            self.name(),
            &MoverList {
                tickers: gappers.iter().map(|s| s.ticker.clone()).collect(),
            },
        )
    }
}

pub struct StockDetailsTool {
    data: Arc<MarketData>,
}

#[async_trait]
impl Tool for StockDetailsTool {
    fn name(&self) -> &str {
        tool_names::STOCK_DETAILS
    }

    fn description(&self) -> &str {
        "Company profile, pre-market financials and recent news for one ticker"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": { "type": "string" }
            },
            "required": ["ticker"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let ticker = str_arg(self.name(), &args, "ticker")?;
        let details = self
            .data
            .stocks
            .get(ticker)
            .ok_or_else(|| AppError::tool(self.name(), format!("Ticker '{}' not found.", ticker)))?;
        to_value(self.name(), details)
    }
}

/// Register all six market tools against one shared data set.
pub fn register_market_tools(registry: &mut ToolRegistry, data: Arc<MarketData>) {
    registry.register(Arc::new(ExchangeDetailsTool { data: data.clone() }));
    registry.register(Arc::new(VixDataTool { data: data.clone() }));
    registry.register(Arc::new(AdxDataTool { data: data.clone() }));
    registry.register(Arc::new(CurrentTimeTool { data: data.clone() }));
    registry.register(Arc::new(PreMarketMoversTool { data: data.clone() }));
    registry.register(Arc::new(StockDetailsTool { data }));
}
