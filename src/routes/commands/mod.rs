mod commands_handler;
mod errors;
mod types;

pub use commands_handler::telegram_webhook;
