pub mod atr;
pub mod factor_selector;
pub mod factor_trend;
pub mod position_sizer;
