pub mod extract;
pub mod file_handlers;
pub mod health_handlers;
