pub mod dispatch;
pub mod mapping;
pub mod settings;
pub mod submission;
pub mod template;
pub mod tenant;
