//! Tools: Deterministic Backend Operations
//!
//! This module provides the tool infrastructure stages use to fetch data.
//!
//! # Module Structure
//!
//! - [`registry`](crate::tools::registry) - `Tool` trait, registration and discovery
//! - [`invocation`](crate::tools::invocation) - binds a tool to blackboard inputs and an output key
//! - [`market`](crate::tools::market) - built-in market data backend
//!
//! # Tool Invocation
//!
//! ```ignore
//! let registry = ToolRegistry::with_market_tools();
//! let ns = board.allocate(&UnitId::new("NASDAQ"))?;
//! ns.set("exchange", json!("NASDAQ"))?;
//!
//! ToolInvocation::new("get_exchange_details", "exchange_details")
//!     .require("exchange")
//!     .run(&registry, &ns)
//!     .await?;
//! ```

/// Tool-invocation unit.
pub mod invocation;
/// Market data tools.
pub mod market;
/// Tool registry for managing available tools.
pub mod registry;

pub use invocation::ToolInvocation;
pub use market::{register_market_tools, tool_names, MarketData, ScreenCriteria};
pub use registry::{Tool, ToolRegistry};
