pub mod categories;
pub mod errors;
pub mod events;
pub mod report;
