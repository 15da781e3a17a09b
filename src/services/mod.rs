pub mod channels;
pub mod dispatch;
pub mod email;
pub mod encryption;
pub mod extraction;
pub mod formatters;
pub mod mapping_registry;
pub mod metrics;
pub mod template;
pub mod tenant_resolver;
