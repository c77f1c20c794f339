pub mod generate;
pub mod listmodels;
pub mod parse;
pub mod transcribe;
pub mod usage;
