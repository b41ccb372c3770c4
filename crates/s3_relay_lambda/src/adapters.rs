pub mod function_registry;
pub mod notification_store;
pub mod object_copy;
