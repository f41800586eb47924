//! Contact export formats

pub mod csv;
pub mod vcard;

pub use csv::export_contacts_csv;
pub use vcard::contact_vcard;
