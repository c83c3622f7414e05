pub mod exec;
pub mod id;
pub mod validate;
