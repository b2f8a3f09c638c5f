pub mod identity;
pub mod request;
