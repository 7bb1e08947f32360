pub mod cart;
pub mod checkout;
pub mod payments;
pub mod sweep;
