pub mod genkey;
pub mod gentoken;
