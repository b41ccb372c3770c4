pub mod copy;
pub mod trigger_setup;
