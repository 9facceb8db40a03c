pub mod eula_manager;
pub mod server_properties;
pub mod store;
