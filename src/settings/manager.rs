use std::{
    collections::HashMap,
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
};

use crate::settings::{
    errors::{ErrorEvent, SettingsPath},
    tree::{SettingsTreeAction, SettingsTreeEntry, SettingsTreeNode},
};

/// Emitted whenever the published settings tree changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsTreeChanged;

/// Merges the nodes contributed by every owner key into one copy-on-write tree.
pub struct SettingsManager {
    root: Arc<SettingsTreeNode>,
    nodes_by_key: HashMap<String, Vec<SettingsPath>>,
    owners: HashMap<SettingsPath, String>,
    errors: Option<Receiver<ErrorEvent>>,
    error_messages: HashMap<SettingsPath, String>,
    observers: Vec<Sender<SettingsTreeChanged>>,
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SettingsManager {
    /// `errors` is a subscription to the layer error tree, mirrored into node `error` fields.
    pub fn new(errors: Option<Receiver<ErrorEvent>>) -> Self {
        Self {
            root: Arc::new(SettingsTreeNode::default()),
            nodes_by_key: HashMap::new(),
            owners: HashMap::new(),
            errors,
            error_messages: HashMap::new(),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<SettingsTreeChanged> {
        let (tx, rx) = channel();
        self.observers.push(tx);
        rx
    }

    fn notify(&mut self) {
        self.observers.retain(|tx| tx.send(SettingsTreeChanged).is_ok());
    }

    /// A snapshot of the current tree. Later updates never mutate a handed-out snapshot.
    pub fn tree(&self) -> Arc<SettingsTreeNode> {
        self.root.clone()
    }

    pub fn owner_of(&self, path: &[String]) -> Option<&str> {
        self.owners.get(path).map(String::as_str)
    }

    /// Replaces every node previously contributed by `key` with `entries`. Paths already owned
    /// by another key are skipped.
    pub fn set_nodes_for_key(&mut self, key: &str, entries: Vec<SettingsTreeEntry>) {
        let previous = self.nodes_by_key.remove(key).unwrap_or_default();
        for path in previous.iter().rev() {
            self.owners.remove(path);
            remove_node(&mut self.root, path);
        }

        let mut claimed = Vec::with_capacity(entries.len());
        for SettingsTreeEntry { path, mut node } in entries {
            if let Some(owner) = self.owners.get(&path) {
                log::warn!(
                    "settings path {} is owned by {owner}, ignoring node from {key}",
                    path.join(".")
                );
                continue;
            }
            node.handler = Some(key.to_string());
            node.error = self.error_messages.get(&path).cloned();
            insert_node(&mut self.root, &path, node);
            self.owners.insert(path.clone(), key.to_string());
            claimed.push(path);
        }
        self.nodes_by_key.insert(key.to_string(), claimed);
        self.notify();
    }

    pub fn remove_nodes_for_key(&mut self, key: &str) {
        self.set_nodes_for_key(key, Vec::new());
        self.nodes_by_key.remove(key);
    }

    /// Handler keys of every node from the root to the action's node, in that order.
    pub fn handle_action(&self, action: &SettingsTreeAction) -> Vec<String> {
        let path = action.node_path();
        let mut handlers = Vec::new();
        let mut node = self.root.as_ref();
        for segment in path {
            let Some(child) = node.child(segment) else {
                break;
            };
            node = child;
            if let Some(handler) = &node.handler {
                if !handlers.contains(handler) {
                    handlers.push(handler.clone());
                }
            }
        }
        handlers
    }

    /// Drains pending error events into the `error` field of the matching nodes.
    pub fn sync_errors(&mut self) -> bool {
        let Some(rx) = &self.errors else {
            return false;
        };
        let events: Vec<ErrorEvent> = rx.try_iter().collect();
        if events.is_empty() {
            return false;
        }

        for event in events {
            match event {
                ErrorEvent::Update { path, message, .. } => {
                    self.set_error(&path, Some(message));
                }
                ErrorEvent::Remove { path, message, .. } => {
                    self.set_error(&path, message);
                }
                ErrorEvent::Clear => {
                    let paths: Vec<SettingsPath> = self.error_messages.keys().cloned().collect();
                    for path in paths {
                        self.set_error(&path, None);
                    }
                }
            }
        }
        self.notify();
        true
    }

    fn set_error(&mut self, path: &[String], message: Option<String>) {
        match &message {
            Some(message) => {
                self.error_messages.insert(path.to_vec(), message.clone());
            }
            None => {
                self.error_messages.remove(path);
            }
        }
        if self.root.node_at(path).is_some() {
            node_mut(&mut self.root, path).error = message;
        }
    }
}

fn node_mut<'a>(root: &'a mut Arc<SettingsTreeNode>, path: &[String]) -> &'a mut SettingsTreeNode {
    path.iter().fold(Arc::make_mut(root), |node, segment| {
        let child = node
            .children
            .entry(segment.clone())
            .or_insert_with(|| Arc::new(SettingsTreeNode::new(segment.clone())));
        Arc::make_mut(child)
    })
}

fn insert_node(root: &mut Arc<SettingsTreeNode>, path: &[String], mut node: SettingsTreeNode) {
    let target = node_mut(root, path);
    for (key, child) in std::mem::take(&mut target.children) {
        node.children.entry(key).or_insert(child);
    }
    *target = node;
}

fn remove_node(root: &mut Arc<SettingsTreeNode>, path: &[String]) {
    let Some((last, parent_path)) = path.split_last() else {
        *root = Arc::new(SettingsTreeNode::default());
        return;
    };
    if root.node_at(path).is_none() {
        return;
    }
    let parent = node_mut(root, parent_path);
    let Some(existing) = parent.children.remove(last) else {
        return;
    };
    // Keep nested nodes contributed by other owners
    if !existing.children.is_empty() {
        let placeholder = SettingsTreeNode {
            label: Some(last.clone()),
            children: existing.children.clone(),
            ..Default::default()
        };
        parent.children.insert(last.clone(), Arc::new(placeholder));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::settings::{
        errors::{topic_path, LayerErrors},
        tree::SettingsTreeField,
    };

    fn entry(path: &[&str], label: &str) -> SettingsTreeEntry {
        SettingsTreeEntry::new(
            path.iter().map(|s| s.to_string()).collect(),
            SettingsTreeNode::new(label),
        )
    }

    #[test]
    fn snapshots_are_copy_on_write() {
        let mut manager = SettingsManager::default();
        manager.set_nodes_for_key("points", vec![entry(&["topics", "/a"], "A")]);
        let before = manager.tree();

        manager.set_nodes_for_key("points", vec![entry(&["topics", "/b"], "B")]);
        let after = manager.tree();

        assert!(before.node_at(&topic_path("/a")).is_some());
        assert!(before.node_at(&topic_path("/b")).is_none());
        assert!(after.node_at(&topic_path("/a")).is_none());
        assert_eq!(
            after.node_at(&topic_path("/b")).unwrap().label.as_deref(),
            Some("B")
        );
    }

    #[test]
    fn paths_belong_to_first_owner() {
        let mut manager = SettingsManager::default();
        manager.set_nodes_for_key("first", vec![entry(&["topics", "/a"], "first")]);
        manager.set_nodes_for_key("second", vec![entry(&["topics", "/a"], "second")]);
        let tree = manager.tree();
        let node = tree.node_at(&topic_path("/a")).unwrap();
        assert_eq!(node.label.as_deref(), Some("first"));
        assert_eq!(manager.owner_of(&topic_path("/a")), Some("first"));
    }

    #[test]
    fn handle_action_lists_handlers_root_to_leaf() {
        let mut manager = SettingsManager::default();
        manager.set_nodes_for_key("markers", vec![entry(&["topics", "/m"], "M")]);
        manager.set_nodes_for_key("namespaces", vec![entry(&["topics", "/m", "ns"], "ns")]);

        let action = SettingsTreeAction::Update {
            path: vec!["topics".into(), "/m".into(), "ns".into(), "visible".into()],
            input: "boolean".into(),
            value: json!(false),
        };
        assert_eq!(manager.handle_action(&action), vec!["markers", "namespaces"]);
    }

    #[test]
    fn replacing_parent_keeps_foreign_children() {
        let mut manager = SettingsManager::default();
        manager.set_nodes_for_key("parent", vec![entry(&["layers"], "Layers")]);
        manager.set_nodes_for_key("child", vec![entry(&["layers", "grid"], "Grid")]);
        let mut layers = SettingsTreeNode::new("Custom layers");
        layers = layers.with_field("enabled", SettingsTreeField::boolean("Enabled", true));
        manager.set_nodes_for_key(
            "parent",
            vec![SettingsTreeEntry::new(vec!["layers".into()], layers)],
        );

        let tree = manager.tree();
        let node = tree.child("layers").unwrap();
        assert_eq!(node.label.as_deref(), Some("Custom layers"));
        assert!(node.child("grid").is_some());
    }

    #[test]
    fn mirrors_layer_errors() {
        let mut errors = LayerErrors::new();
        let mut manager = SettingsManager::new(Some(errors.subscribe()));
        let changed = manager.subscribe();
        manager.set_nodes_for_key("points", vec![entry(&["topics", "/a"], "A")]);

        errors.add(&topic_path("/a"), "STRIDE", "bad stride");
        errors.add(&topic_path("/late"), "X", "later");
        assert!(manager.sync_errors());
        let tree = manager.tree();
        assert_eq!(
            tree.node_at(&topic_path("/a")).unwrap().error.as_deref(),
            Some("bad stride")
        );

        manager.set_nodes_for_key("points", vec![entry(&["topics", "/late"], "Late")]);
        let tree = manager.tree();
        assert_eq!(
            tree.node_at(&topic_path("/late")).unwrap().error.as_deref(),
            Some("later")
        );

        errors.remove(&topic_path("/late"), "X");
        manager.sync_errors();
        assert_eq!(manager.tree().node_at(&topic_path("/late")).unwrap().error, None);
        assert!(changed.try_iter().count() >= 3);
    }
}
