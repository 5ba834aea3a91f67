mod kopeck;

pub mod helpers;
pub mod op;
mod secret;

pub use kopeck::{Kopeck, KopeckConversionError, RUB_CURRENCY_CODE, RUB_CURRENCY_CODE_LOWER};
pub use secret::Secret;
