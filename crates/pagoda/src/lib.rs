pub mod annotator;
pub mod assembler;
pub mod asset_graph;
pub mod bundler;
pub mod combine;
pub mod config;
pub mod context;
pub mod dirs;
pub mod entry;
pub mod error;
pub mod js_globals;
pub mod loader;
pub mod orchestrator;
pub mod packagers;
pub mod script_module;
pub mod tree_shaking;
pub mod util;
pub mod writer;

pub use bundler::Bundler;
pub use config::Config;
pub use error::BuildError;
