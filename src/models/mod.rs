pub mod account;
pub mod community;
pub mod request;
