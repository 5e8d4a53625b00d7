pub mod book_id;
pub mod config;
pub mod context;
pub mod logging;
pub mod shutdown;
