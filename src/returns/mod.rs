//! Return series over trading-day horizons.
//!
//! - Simple and log returns at arbitrary lags
//! - Named horizons (daily, weekly, monthly, monthly log, yearly)
//! - Point estimates (mean, standard deviation, coefficient of variation)

pub mod calculator;

pub use calculator::{
    HorizonLags, HorizonReturns, ReturnCalculator, ReturnError, ReturnHorizon, ReturnKind,
    ReturnPoint, ReturnSeries,
};
