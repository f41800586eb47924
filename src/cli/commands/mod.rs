pub mod contact;
pub mod deal;
pub mod export;
pub mod import;
