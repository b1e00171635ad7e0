pub mod gateway;
pub mod order_code;
pub mod reconciler;
pub mod repository;
pub mod signature;
pub mod stores;

pub use gateway::GatewayClient;
pub use reconciler::WebhookReconciler;
pub use signature::SignatureEngine;
