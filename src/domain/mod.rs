pub mod errors;
pub mod features;
pub mod record;
