//! Order submission types.
//!
//! Market orders are sent as a single deal request; the broker answers with
//! an acknowledgement carrying a result code. Codes follow the terminal's
//! numeric convention so a bridge can pass them through unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::market::{PositionId, Symbol};
use crate::order::{FillMode, OrderSide};
use crate::{Price, Size};

/// Market deal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub volume: Size,
    pub price: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Price>,
    pub fill_mode: FillMode,
    /// Position being closed (close requests only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionId>,
    /// Maximum accepted slippage in points.
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
}

impl OrderRequest {
    pub fn is_close(&self) -> bool {
        self.position.is_some()
    }
}

/// Broker result code for a deal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum RetCode {
    Done,
    Requote,
    Rejected,
    InvalidStops,
    MarketClosed,
    NoMoney,
    InvalidFill,
    Other(u32),
}

impl RetCode {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn code(&self) -> u32 {
        u32::from(*self)
    }
}

impl From<u32> for RetCode {
    fn from(code: u32) -> Self {
        match code {
            10009 => Self::Done,
            10004 => Self::Requote,
            10006 => Self::Rejected,
            10016 => Self::InvalidStops,
            10018 => Self::MarketClosed,
            10019 => Self::NoMoney,
            10030 => Self::InvalidFill,
            other => Self::Other(other),
        }
    }
}

impl From<RetCode> for u32 {
    fn from(code: RetCode) -> Self {
        match code {
            RetCode::Done => 10009,
            RetCode::Requote => 10004,
            RetCode::Rejected => 10006,
            RetCode::InvalidStops => 10016,
            RetCode::MarketClosed => 10018,
            RetCode::NoMoney => 10019,
            RetCode::InvalidFill => 10030,
            RetCode::Other(other) => other,
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Broker acknowledgement of a deal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub retcode: RetCode,
    /// Broker order number, assigned on success.
    #[serde(default)]
    pub order: Option<u64>,
    #[serde(default)]
    pub comment: String,
}

impl OrderAck {
    pub fn new(retcode: RetCode, order: Option<u64>, comment: impl Into<String>) -> Self {
        Self {
            retcode,
            order,
            comment: comment.into(),
        }
    }
}
