pub mod models;
pub mod queries;
pub mod store;

#[cfg(test)]
pub mod memory;
