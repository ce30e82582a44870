mod settings;

pub use settings::{default_database_path, Config, TomlConfig};
