use std::{collections::BTreeMap, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{camera::CameraState, error::ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FollowMode {
    #[default]
    #[serde(rename = "follow-pose")]
    Pose,
    #[serde(rename = "follow-position")]
    Position,
    #[serde(rename = "follow-none")]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformDisplaySettings {
    pub show_label: bool,
    pub axis_scale: f64,
    pub line_width: f64,
    pub line_color: String,
}

impl Default for TransformDisplaySettings {
    fn default() -> Self {
        Self {
            show_label: true,
            axis_scale: 1.0,
            line_width: 2.0,
            line_color: "#ffff00".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneSettings {
    pub background_color: Option<String>,
    pub label_scale_factor: f64,
    pub enable_stats: bool,
    pub ignore_collada_up_axis: bool,
    pub transforms: TransformDisplaySettings,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            background_color: None,
            label_scale_factor: 1.0,
            enable_stats: false,
            ignore_collada_up_axis: false,
            transforms: TransformDisplaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishKind {
    #[default]
    Point,
    Pose,
    PoseEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublishSettings {
    #[serde(rename = "type")]
    pub kind: PublishKind,
    pub point_topic: String,
    pub pose_topic: String,
    pub pose_estimate_topic: String,
    pub pose_estimate_x_deviation: f64,
    pub pose_estimate_y_deviation: f64,
    pub pose_estimate_theta_deviation: f64,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            kind: PublishKind::Point,
            point_topic: "/clicked_point".to_string(),
            pose_topic: "/move_base_simple/goal".to_string(),
            pose_estimate_topic: "/initialpose".to_string(),
            pose_estimate_x_deviation: 0.5,
            pose_estimate_y_deviation: 0.5,
            pose_estimate_theta_deviation: std::f64::consts::PI / 12.0,
        }
    }
}

/// Persisted renderer state. Per-topic, per-frame and per-layer settings are free-form JSON
/// objects owned by the extension handling them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    pub camera_state: CameraState,
    pub follow_mode: FollowMode,
    pub follow_tf: Option<String>,
    pub scene: SceneSettings,
    pub transforms: BTreeMap<String, Value>,
    pub topics: BTreeMap<String, Value>,
    pub layers: BTreeMap<String, Value>,
    pub publish: PublishSettings,
}

impl RendererConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Typed settings of a topic, falling back to defaults for missing or malformed entries.
    pub fn topic_settings<T: DeserializeOwned + Default>(&self, topic: &str) -> T {
        typed_entry(self.topics.get(topic), topic)
    }

    pub fn layer_settings<T: DeserializeOwned + Default>(&self, id: &str) -> T {
        typed_entry(self.layers.get(id), id)
    }

    pub fn transform_settings<T: DeserializeOwned + Default>(&self, frame_id: &str) -> T {
        typed_entry(self.transforms.get(frame_id), frame_id)
    }

    pub fn set_topic_setting(&mut self, topic: &str, key: &str, value: Value) {
        set_entry_field(self.topics.entry(topic.to_string()).or_default(), key, value);
    }

    pub fn set_layer_setting(&mut self, id: &str, key: &str, value: Value) {
        set_entry_field(self.layers.entry(id.to_string()).or_default(), key, value);
    }

    pub fn set_transform_setting(&mut self, frame_id: &str, key: &str, value: Value) {
        set_entry_field(
            self.transforms.entry(frame_id.to_string()).or_default(),
            key,
            value,
        );
    }
}

fn typed_entry<T: DeserializeOwned + Default>(value: Option<&Value>, key: &str) -> T {
    let Some(value) = value else {
        return T::default();
    };
    match serde_json::from_value(value.clone()) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("Ignoring invalid settings for {key}: {err}");
            T::default()
        }
    }
}

fn set_entry_field(entry: &mut Value, key: &str, value: Value) {
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(map) = entry {
        map.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    struct Sample {
        point_size: f64,
        visible: bool,
    }

    #[test]
    fn topic_settings_round_trip_through_json() {
        let mut config = RendererConfig::default();
        config.set_topic_setting("/points", "pointSize", json!(3.0));
        config.set_topic_setting("/points", "visible", json!(true));
        config.follow_tf = Some("base_link".into());

        let restored = RendererConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
        assert_eq!(
            restored.topic_settings::<Sample>("/points"),
            Sample {
                point_size: 3.0,
                visible: true
            }
        );
    }

    #[test]
    fn malformed_settings_fall_back_to_default() {
        let config = RendererConfig::from_json(
            r#"{"topics": {"/points": {"pointSize": "big"}}, "followMode": "follow-position"}"#,
        )
        .unwrap();
        assert_eq!(config.topic_settings::<Sample>("/points"), Sample::default());
        assert_eq!(config.follow_mode, FollowMode::Position);
        assert_eq!(config.publish.kind, PublishKind::Point);
    }

    #[test]
    fn loads_and_saves_files() {
        let path = std::env::temp_dir().join(format!("sceneview-config-{}.json", std::process::id()));
        let mut config = RendererConfig::default();
        config.scene.enable_stats = true;
        config.save(&path).unwrap();
        let loaded = RendererConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(loaded.scene.enable_stats);
    }
}
