use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::errors::SettingsPath;

/// Editor widget of a settings field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "kebab-case")]
pub enum FieldInput {
    Boolean,
    Number {
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
    },
    String,
    Rgb,
    Rgba,
    Vec3,
    Select {
        options: Vec<SelectOption>,
    },
    Gradient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsTreeField {
    pub label: String,
    #[serde(flatten)]
    pub input: FieldInput,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SettingsTreeField {
    pub fn new(label: impl Into<String>, input: FieldInput, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            input,
            value: value.into(),
            error: None,
        }
    }

    pub fn boolean(label: impl Into<String>, value: bool) -> Self {
        Self::new(label, FieldInput::Boolean, value)
    }

    pub fn number(label: impl Into<String>, value: f64, min: Option<f64>, step: Option<f64>) -> Self {
        Self::new(
            label,
            FieldInput::Number {
                min,
                max: None,
                step,
            },
            value,
        )
    }

    pub fn string(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(label, FieldInput::String, value.into())
    }

    pub fn rgba(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(label, FieldInput::Rgba, value.into())
    }

    pub fn select(label: impl Into<String>, options: Vec<SelectOption>, value: impl Into<Value>) -> Self {
        Self::new(label, FieldInput::Select { options }, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsTreeNodeAction {
    pub id: String,
    pub label: String,
}

impl SettingsTreeNodeAction {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsTreeNode {
    pub label: Option<String>,
    pub fields: Vec<(String, SettingsTreeField)>,
    pub children: BTreeMap<String, Arc<SettingsTreeNode>>,
    pub visible: Option<bool>,
    pub error: Option<String>,
    pub actions: Vec<SettingsTreeNodeAction>,
    /// Key of the owner that receives actions targeting this node.
    pub handler: Option<String>,
    pub order: Option<i32>,
}

impl SettingsTreeNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, field: SettingsTreeField) -> Self {
        self.fields.push((key.into(), field));
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_action(mut self, action: SettingsTreeNodeAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_child(mut self, key: impl Into<String>, child: SettingsTreeNode) -> Self {
        self.children.insert(key.into(), Arc::new(child));
        self
    }

    pub fn field(&self, key: &str) -> Option<&SettingsTreeField> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn child(&self, key: &str) -> Option<&SettingsTreeNode> {
        self.children.get(key).map(Arc::as_ref)
    }

    pub fn node_at(&self, path: &[String]) -> Option<&SettingsTreeNode> {
        path.iter()
            .try_fold(self, |node, segment| node.child(segment))
    }
}

/// A node contributed at a path by one owner.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsTreeEntry {
    pub path: SettingsPath,
    pub node: SettingsTreeNode,
}

impl SettingsTreeEntry {
    pub fn new(path: SettingsPath, node: SettingsTreeNode) -> Self {
        Self { path, node }
    }
}

/// Input from the settings editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "kebab-case")]
pub enum SettingsTreeAction {
    Update {
        path: SettingsPath,
        input: String,
        value: Value,
    },
    PerformNodeAction {
        path: SettingsPath,
        id: String,
    },
}

impl SettingsTreeAction {
    pub fn path(&self) -> &[String] {
        match self {
            SettingsTreeAction::Update { path, .. } => path,
            SettingsTreeAction::PerformNodeAction { path, .. } => path,
        }
    }

    /// For updates, the path of the node owning the field (the path minus the field key).
    pub fn node_path(&self) -> &[String] {
        match self {
            SettingsTreeAction::Update { path, .. } => &path[..path.len().saturating_sub(1)],
            SettingsTreeAction::PerformNodeAction { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn actions_use_tagged_json() {
        let action: SettingsTreeAction = serde_json::from_value(json!({
            "action": "update",
            "payload": { "path": ["topics", "/points", "pointSize"], "input": "number", "value": 4 }
        }))
        .unwrap();
        assert_eq!(action.node_path(), ["topics", "/points"]);

        let action: SettingsTreeAction = serde_json::from_value(json!({
            "action": "perform-node-action",
            "payload": { "path": ["layers"], "id": "add-grid" }
        }))
        .unwrap();
        assert_eq!(
            action,
            SettingsTreeAction::PerformNodeAction {
                path: vec!["layers".into()],
                id: "add-grid".into()
            }
        );
    }
}
