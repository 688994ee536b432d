mod commands;
mod health_check;
mod helpers;

pub use commands::telegram_webhook;
pub use health_check::health_check;
pub use helpers::error_chain_fmt;
