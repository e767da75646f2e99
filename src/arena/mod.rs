pub mod machine;
pub mod registry;
pub mod settings;
