pub mod alerts;
pub mod books;
pub mod carts;
pub mod orders;
pub mod requests;
pub mod reviews;
pub mod system_logs;
pub mod users;
