use std::{
    collections::BTreeMap,
    sync::mpsc::{channel, Receiver, Sender},
};

pub type SettingsPath = Vec<String>;

/// Builds the settings path of a topic node.
pub fn topic_path(topic: &str) -> SettingsPath {
    vec!["topics".to_string(), topic.to_string()]
}

/// Change notifications emitted by [`LayerErrors`]. `message` carries the combined message
/// of every error id left on the path after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorEvent {
    Update {
        path: SettingsPath,
        error_id: String,
        message: String,
    },
    Remove {
        path: SettingsPath,
        error_id: String,
        message: Option<String>,
    },
    Clear,
}

#[derive(Debug, Clone, Default)]
pub struct NodeError {
    pub errors_by_id: BTreeMap<String, String>,
    pub children: BTreeMap<String, NodeError>,
}

impl NodeError {
    /// All messages on this node, one per line, ordered by error id.
    pub fn error_message(&self) -> Option<String> {
        if self.errors_by_id.is_empty() {
            return None;
        }
        Some(
            self.errors_by_id
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn node(&self, path: &[String]) -> Option<&NodeError> {
        path.iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    fn node_mut(&mut self, path: &[String]) -> &mut NodeError {
        path.iter().fold(self, |node, segment| {
            node.children.entry(segment.clone()).or_default()
        })
    }

    fn is_empty(&self) -> bool {
        self.errors_by_id.is_empty() && self.children.is_empty()
    }

    fn collect_paths(&self, prefix: &mut SettingsPath, out: &mut Vec<SettingsPath>) {
        if !self.errors_by_id.is_empty() {
            out.push(prefix.clone());
        }
        for (segment, child) in &self.children {
            prefix.push(segment.clone());
            child.collect_paths(prefix, out);
            prefix.pop();
        }
    }
}

/// Path-indexed error tree shared by every extension.
#[derive(Debug, Default)]
pub struct LayerErrors {
    root: NodeError,
    observers: Vec<Sender<ErrorEvent>>,
}

impl LayerErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer. Dropped receivers are pruned on the next event.
    pub fn subscribe(&mut self) -> Receiver<ErrorEvent> {
        let (tx, rx) = channel();
        self.observers.push(tx);
        rx
    }

    fn emit(&mut self, event: ErrorEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn add(&mut self, path: &[String], error_id: &str, message: impl Into<String>) {
        let message = message.into();
        let node = self.root.node_mut(path);
        let previous = node.errors_by_id.insert(error_id.to_string(), message.clone());
        if previous.as_ref() == Some(&message) {
            return;
        }
        if previous.is_none() {
            log::warn!("[{}] {}: {}", path.join("."), error_id, message);
        }
        let message = node.error_message().unwrap_or_default();
        self.emit(ErrorEvent::Update {
            path: path.to_vec(),
            error_id: error_id.to_string(),
            message,
        });
    }

    pub fn add_to_topic(&mut self, topic: &str, error_id: &str, message: impl Into<String>) {
        self.add(&topic_path(topic), error_id, message);
    }

    pub fn remove(&mut self, path: &[String], error_id: &str) {
        let Some(removed) = self.remove_quietly(path, error_id) else {
            return;
        };
        self.emit(ErrorEvent::Remove {
            path: path.to_vec(),
            error_id: error_id.to_string(),
            message: removed,
        });
    }

    /// Removes an error without emitting. Returns the remaining message on the path if the
    /// error existed.
    fn remove_quietly(&mut self, path: &[String], error_id: &str) -> Option<Option<String>> {
        let node = self.root.node(path)?;
        if !node.errors_by_id.contains_key(error_id) {
            return None;
        }
        let node = self.root.node_mut(path);
        node.errors_by_id.remove(error_id);
        let remaining = node.error_message();
        self.prune(path);
        Some(remaining)
    }

    pub fn remove_from_topic(&mut self, topic: &str, error_id: &str) {
        self.remove(&topic_path(topic), error_id);
    }

    /// Adds the error when `condition` is false, removes it otherwise.
    pub fn error_if_false(
        &mut self,
        condition: bool,
        path: &[String],
        error_id: &str,
        message: impl Into<String>,
    ) {
        if condition {
            self.remove(path, error_id);
        } else {
            self.add(path, error_id, message);
        }
    }

    pub fn has_error(&self, path: &[String], error_id: &str) -> bool {
        self.root
            .node(path)
            .is_some_and(|node| node.errors_by_id.contains_key(error_id))
    }

    pub fn error_at_path(&self, path: &[String]) -> Option<&NodeError> {
        self.root.node(path)
    }

    pub fn error_message(&self, path: &[String]) -> Option<String> {
        self.root.node(path).and_then(NodeError::error_message)
    }

    /// Every path currently carrying at least one error.
    pub fn paths_with_errors(&self) -> Vec<SettingsPath> {
        let mut out = Vec::new();
        self.root.collect_paths(&mut Vec::new(), &mut out);
        out
    }

    /// Every path carrying `error_id`.
    pub fn paths_with_error(&self, error_id: &str) -> Vec<SettingsPath> {
        self.paths_with_errors()
            .into_iter()
            .filter(|path| self.has_error(path, error_id))
            .collect()
    }

    /// Removes every error at `path` and below.
    pub fn clear_path(&mut self, path: &[String]) {
        let Some(node) = self.root.node(path) else {
            return;
        };
        let mut prefix = path.to_vec();
        let mut paths = Vec::new();
        node.collect_paths(&mut prefix, &mut paths);

        for error_path in paths {
            let ids: Vec<String> = self
                .root
                .node(&error_path)
                .map(|node| node.errors_by_id.keys().cloned().collect())
                .unwrap_or_default();
            for id in ids {
                self.remove(&error_path, &id);
            }
        }
    }

    pub fn clear_topic(&mut self, topic: &str) {
        self.clear_path(&topic_path(topic));
    }

    pub fn clear(&mut self) {
        self.root = NodeError::default();
        self.emit(ErrorEvent::Clear);
    }

    fn prune(&mut self, path: &[String]) {
        for depth in (1..=path.len()).rev() {
            let (parent_path, segment) = (&path[..depth - 1], &path[depth - 1]);
            let parent = self.root.node_mut(parent_path);
            if parent.children.get(segment).is_some_and(NodeError::is_empty) {
                parent.children.remove(segment);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> SettingsPath {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn error_if_false_emits_update_then_remove() {
        let mut errors = LayerErrors::new();
        let rx = errors.subscribe();
        let p = topic_path("/points");

        errors.error_if_false(false, &p, "STRIDE", "bad stride");
        errors.error_if_false(false, &p, "STRIDE", "bad stride");
        assert!(errors.has_error(&p, "STRIDE"));
        errors.error_if_false(true, &p, "STRIDE", "bad stride");
        errors.error_if_false(true, &p, "STRIDE", "bad stride");
        assert!(!errors.has_error(&p, "STRIDE"));

        let events: Vec<ErrorEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ErrorEvent::Update {
                    path: p.clone(),
                    error_id: "STRIDE".into(),
                    message: "bad stride".into()
                },
                ErrorEvent::Remove {
                    path: p,
                    error_id: "STRIDE".into(),
                    message: None
                },
            ]
        );
    }

    #[test]
    fn combines_messages_per_path() {
        let mut errors = LayerErrors::new();
        let p = path(&["topics", "/scan"]);
        errors.add(&p, "b", "second");
        errors.add(&p, "a", "first");
        assert_eq!(errors.error_message(&p).as_deref(), Some("first\nsecond"));

        let rx = errors.subscribe();
        errors.remove(&p, "a");
        assert_eq!(
            rx.try_recv().unwrap(),
            ErrorEvent::Remove {
                path: p.clone(),
                error_id: "a".into(),
                message: Some("second".into())
            }
        );
    }

    #[test]
    fn clear_path_removes_nested_errors() {
        let mut errors = LayerErrors::new();
        errors.add(&path(&["topics", "/markers", "ns"]), "MISSING", "missing");
        errors.add(&path(&["topics", "/markers"]), "X", "x");
        errors.add(&path(&["transforms"]), "CYCLE", "cycle");

        errors.clear_topic("/markers");
        assert_eq!(errors.paths_with_errors(), vec![path(&["transforms"])]);
        assert!(errors.error_at_path(&path(&["topics"])).is_none());
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let mut errors = LayerErrors::new();
        let rx = errors.subscribe();
        drop(rx);
        errors.add(&path(&["scene"]), "id", "message");
        assert!(errors.observers.is_empty());
    }
}
