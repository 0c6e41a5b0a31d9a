use crate::engine::PositionId;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine, its collaborators and the loaders.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The candle data provided is empty. Backtesting requires at least one candle.
    #[error("Candle data is empty: backtesting requires at least one candle")]
    CandleDataEmpty,

    /// A candle is malformed (non-finite price, low above high, ...).
    #[error("Invalid candle: {0}")]
    InvalidCandle(String),

    /// The initial balance is not positive. Trading requires a positive balance.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// The spread must be zero or positive.
    #[error("Spread must not be negative (got: {0})")]
    NegSpread(f64),

    /// A commission parameter is negative.
    #[error("Commission parameters must not be negative (got: {0})")]
    NegCommission(f64),

    /// An indicator was configured with an unusable period.
    #[error("Invalid indicator period: {0}")]
    InvalidPeriod(usize),

    /// Orders must carry at least one unit.
    #[error("Order size must be greater than zero")]
    ZeroOrderSize,

    /// A close order needs either a position type or a position to close.
    #[error("Close order requires a position type or a target position")]
    CloseOrderWithoutTarget,

    /// A close order asks for more units than the referenced position holds.
    #[error("Cannot close {requested} units of position {id}: only {available} open")]
    CloseSizeExceedsPosition {
        /// Targeted position.
        id: PositionId,
        /// Units requested by the order.
        requested: u64,
        /// Units held by the position.
        available: u64,
    },

    /// An untargeted close asked for more than the open exposure (strict mode only).
    #[error("Cannot close {requested} units: only {available} open in that direction")]
    InsufficientExposure {
        /// Units requested by the order.
        requested: u64,
        /// Units open in the order's direction.
        available: u64,
    },

    /// The position was not found.
    #[error("Position not found: {0}")]
    PositionNotFound(PositionId),

    /// Accumulate mode only nets long exposure.
    #[error("Short positions are not allowed in accumulate mode")]
    ShortInAccumulateMode,

    /// A price of the running candle was requested before it is known.
    #[error("Lookahead: the candle {0} price is unknown during the OPEN phase")]
    Lookahead(&'static str),

    /// A CSV row could not be parsed.
    #[error("CSV line {line}: {message}")]
    CsvRow {
        /// 1-based line number in the file (header is line 1).
        line: u64,
        /// What went wrong.
        message: String,
    },

    /// CSV error occurred.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Chart rendering failed.
    #[cfg(feature = "draws")]
    #[error("Plotters error: {0}")]
    Plotters(String),
}
