//! # modforge_config
//!
//! Configuration for modforge runs.
//!
//! Two kinds of documents live here:
//!
//! - **Project configurations**: one YAML document per project naming the
//!   modules to select and the variable values to feed them.
//! - **Settings**: an optional `modforge.toml` holding the paths, tool
//!   options and policies of a run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use modforge_config::{ConfigLoader, Settings};
//!
//! let settings = Settings::load_or_default(None).unwrap();
//! let projects = ConfigLoader::new(&settings.configs_dir).load_all().unwrap();
//!
//! for project in &projects {
//!     let selection = project.selected_modules();
//!     println!("{}: {:?}", project.project_name, selection.names().collect::<Vec<_>>());
//! }
//! ```

pub mod error;
pub mod loader;
pub mod models;
pub mod settings;
pub mod value;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use models::{ModuleConfig, ProjectConfig, SelectedModules, DEFAULT_PROJECT_NAME};
pub use settings::{CollisionPolicy, ModuleSourceRewrite, Settings, DEFAULT_SETTINGS_FILE};
pub use value::ConfigValue;
