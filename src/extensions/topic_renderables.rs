//! Bookkeeping for extensions that draw the latest message of each topic.

use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;

use crate::{
    extensions::{topic_update, SceneContext},
    messages::{Header, MessageEvent},
    scene_graph::{Renderable, RenderableUserData},
    settings::{topic_path, SettingsTreeAction},
    transforms::Pose,
};

pub struct TopicEntry<S, M> {
    pub settings: S,
    pub message: M,
    /// Kept across messages so the pick id stays stable.
    pub renderable: Renderable,
}

pub struct TopicRenderables<S, M> {
    entries: BTreeMap<String, TopicEntry<S, M>>,
}

impl<S, M> Default for TopicRenderables<S, M> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<S: DeserializeOwned + Default, M> TopicRenderables<S, M> {
    /// Records `message` as the latest on the event's topic.
    pub fn update(
        &mut self,
        ctx: &SceneContext,
        event: &MessageEvent,
        header: &Header,
        pose: Pose,
        message: M,
    ) -> &mut TopicEntry<S, M> {
        let topic = event.topic.as_str();
        let mut user_data = RenderableUserData::new(&header.frame_id, topic_path(topic));
        user_data.receive_time = event.receive_time;
        user_data.message_time = header.stamp;
        user_data.pose = pose;
        user_data.topic = Some(topic.to_string());

        match self.entries.entry(topic.to_string()) {
            std::collections::btree_map::Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.message = message;
                entry.renderable.user_data = user_data;
                entry
            }
            std::collections::btree_map::Entry::Vacant(vacant) => vacant.insert(TopicEntry {
                settings: ctx.config.topic_settings(topic),
                message,
                renderable: Renderable::new(topic, user_data),
            }),
        }
    }

    /// Stores a `["topics", topic, key]` update in the config and reloads the typed settings
    /// of that topic. Returns the topic and its entry if the topic has been seen.
    pub fn apply_update<'a>(
        &'a mut self,
        ctx: &mut SceneContext,
        action: &SettingsTreeAction,
    ) -> Option<&'a mut TopicEntry<S, M>> {
        let (topic, key, value) = topic_update(action)?;
        ctx.config.set_topic_setting(topic, key, value.clone());
        ctx.invalidate_settings();
        let entry = self.entries.get_mut(topic)?;
        entry.settings = ctx.config.topic_settings(topic);
        Some(entry)
    }
}

impl<S, M> TopicRenderables<S, M> {
    pub fn get(&self, topic: &str) -> Option<&TopicEntry<S, M>> {
        self.entries.get(topic)
    }

    pub fn get_mut(&mut self, topic: &str) -> Option<&mut TopicEntry<S, M>> {
        self.entries.get_mut(topic)
    }

    pub fn remove(&mut self, topic: &str) -> Option<TopicEntry<S, M>> {
        self.entries.remove(topic)
    }

    /// Drops topics that are no longer advertised together with their errors.
    pub fn retain_advertised(&mut self, ctx: &mut SceneContext) {
        let advertised: HashSet<&str> = ctx.topics.iter().map(|t| t.name.as_str()).collect();
        self.entries.retain(|topic, _| {
            let keep = advertised.contains(topic.as_str());
            if !keep {
                ctx.errors.clear_topic(topic);
            }
            keep
        });
        ctx.invalidate_settings();
    }

    pub fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.entries.values().map(|entry| &entry.renderable)
    }

    pub fn renderables_mut(&mut self) -> impl Iterator<Item = &mut Renderable> {
        self.entries.values_mut().map(|entry| &mut entry.renderable)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        extensions::test_support::context,
        messages::{schemas, Message, PoseStamped, Topic},
    };

    #[derive(Debug, Default, serde::Deserialize)]
    #[serde(default)]
    struct Settings {
        scale: f64,
    }

    fn event(topic: &str, stamp: u64) -> (MessageEvent, PoseStamped) {
        let pose = PoseStamped {
            header: Header::new(stamp, "base_link"),
            pose: Pose::IDENTITY,
        };
        let event = MessageEvent::new(topic, schemas::POSE_STAMPED, stamp, Message::PoseStamped(pose.clone()));
        (event, pose)
    }

    #[test]
    fn renderable_persists_across_messages() {
        let mut ctx = context();
        let mut topics: TopicRenderables<Settings, PoseStamped> = TopicRenderables::default();
        let (first, pose) = event("/pose", 1);
        let pick_id = topics
            .update(&ctx, &first, &pose.header, pose.pose, pose.clone())
            .renderable
            .pick_id();
        let (second, pose) = event("/pose", 2);
        let entry = topics.update(&ctx, &second, &pose.header, pose.pose, pose.clone());
        assert_eq!(entry.renderable.pick_id(), pick_id);
        assert_eq!(entry.renderable.user_data.message_time, 2);

        let action = SettingsTreeAction::Update {
            path: vec!["topics".into(), "/pose".into(), "scale".into()],
            input: "number".into(),
            value: json!(3.0),
        };
        assert_eq!(topics.apply_update(&mut ctx, &action).unwrap().settings.scale, 3.0);

        ctx.topics = vec![Topic::new("/other", schemas::POSE_STAMPED)];
        topics.retain_advertised(&mut ctx);
        assert!(topics.is_empty());
    }
}
