mod config_loader;
mod persona;


pub use config_loader::{
    parse_origins, AppConfig, ConfigLoader, CorsConfig, PersonaConfig, ProviderConfig,
    ServerConfig, StorageConfig,
};
pub use persona::Persona;
