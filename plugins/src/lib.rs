pub mod enrichers;
pub mod factory;
pub mod observers;
pub mod providers;
pub mod validators;
