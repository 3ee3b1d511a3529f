//! Plugins compiled into the host binary

mod health;
pub mod sanitization;
pub mod whatsapp;

pub use health::HealthPlugin;
pub use sanitization::SanitizationPlugin;
pub use whatsapp::WhatsAppPlugin;
