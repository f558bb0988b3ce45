mod money;

pub mod op;

pub use money::{Money, MoneyConversionError, CURRENCY_CODE};
