pub mod errors;
pub mod manager;
pub mod tree;

pub use errors::{topic_path, ErrorEvent, LayerErrors, NodeError, SettingsPath};
pub use manager::{SettingsManager, SettingsTreeChanged};
pub use tree::{
    FieldInput, SelectOption, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField,
    SettingsTreeNode, SettingsTreeNodeAction,
};
