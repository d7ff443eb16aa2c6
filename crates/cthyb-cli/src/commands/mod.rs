pub mod components;
pub mod plan;
pub mod version;
