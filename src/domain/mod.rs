pub mod connector;
pub mod models;
pub mod repository;
pub mod sink;
pub mod sync;
