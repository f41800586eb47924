//! Typed entity models
//!
//! One struct per backend collection. Optional columns are `Option` so sparse
//! rows (and partial representations after a patch) deserialize cleanly.

mod company;
mod contact;
mod deal;
mod note;
mod sale;
mod tag;
mod task;

pub use company::Company;
pub use contact::{Contact, EmailEntry, PhoneEntry};
pub use deal::Deal;
pub use note::ContactNote;
pub use sale::Sale;
pub use tag::Tag;
pub use task::Task;
