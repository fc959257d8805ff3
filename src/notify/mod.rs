pub mod messages;
pub mod telegram;

pub use telegram::TelegramNotifier;
