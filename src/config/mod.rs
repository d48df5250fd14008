pub mod settings;

pub use settings::{AclSettings, BlockSettings, DefinitionSettings, ENV_PREFIX, ROOT_KEY};
