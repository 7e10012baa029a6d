//! Two-way tag index
//!
//! Keeps neuron→tags and tag→neurons in one struct behind a single lock so
//! the two directions can never disagree, and readers always see a
//! complete write.

use crate::models::Id;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct TagMaps {
    by_neuron: HashMap<Id, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<Id>>,
}

impl TagMaps {
    fn insert(&mut self, tag: &str, neuron_id: Id) -> bool {
        let added = self
            .by_neuron
            .entry(neuron_id)
            .or_default()
            .insert(tag.to_string());
        self.by_tag
            .entry(tag.to_string())
            .or_default()
            .insert(neuron_id);
        added
    }

    fn remove(&mut self, tag: &str, neuron_id: Id) -> bool {
        let removed = match self.by_neuron.get_mut(&neuron_id) {
            Some(tags) => {
                let removed = tags.remove(tag);
                if tags.is_empty() {
                    self.by_neuron.remove(&neuron_id);
                }
                removed
            }
            None => false,
        };
        if let Some(neurons) = self.by_tag.get_mut(tag) {
            neurons.remove(&neuron_id);
            if neurons.is_empty() {
                self.by_tag.remove(tag);
            }
        }
        removed
    }

    fn clear(&mut self, neuron_id: Id) -> BTreeSet<String> {
        let tags = self.by_neuron.remove(&neuron_id).unwrap_or_default();
        for tag in &tags {
            if let Some(neurons) = self.by_tag.get_mut(tag) {
                neurons.remove(&neuron_id);
                if neurons.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        tags
    }
}

/// Tag membership for every neuron in the working set
#[derive(Debug)]
pub struct TagIndex {
    maps: RwLock<TagMaps>,
    predefined: BTreeSet<String>,
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl TagIndex {
    /// Create an index whose vocabulary always includes `predefined`
    pub fn new<I, S>(predefined: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            maps: RwLock::new(TagMaps::default()),
            predefined: predefined.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the neuron did not already carry the tag.
    pub async fn add_tag(&self, tag: &str, neuron_id: Id) -> bool {
        self.maps.write().await.insert(tag, neuron_id)
    }

    /// Returns true if the neuron carried the tag.
    pub async fn remove_tag(&self, tag: &str, neuron_id: Id) -> bool {
        self.maps.write().await.remove(tag, neuron_id)
    }

    /// Drop every tag of a neuron, returning the tags it had
    pub async fn clear_tags(&self, neuron_id: Id) -> BTreeSet<String> {
        self.maps.write().await.clear(neuron_id)
    }

    pub async fn tags_of(&self, neuron_id: Id) -> BTreeSet<String> {
        self.maps
            .read()
            .await
            .by_neuron
            .get(&neuron_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn neurons_with_tag(&self, tag: &str) -> BTreeSet<Id> {
        self.maps
            .read()
            .await
            .by_tag
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Tags in use plus the predefined vocabulary
    pub async fn all_tags(&self) -> BTreeSet<String> {
        let maps = self.maps.read().await;
        let mut tags = self.predefined.clone();
        tags.extend(maps.by_tag.keys().cloned());
        tags
    }

    pub fn is_predefined(&self, tag: &str) -> bool {
        self.predefined.contains(tag)
    }

    pub fn predefined_tags(&self) -> &BTreeSet<String> {
        &self.predefined
    }

    /// Replace a neuron's tags in one step, e.g. after a load or a remote update
    pub async fn set_tags(&self, neuron_id: Id, tags: &BTreeSet<String>) {
        let mut maps = self.maps.write().await;
        maps.clear(neuron_id);
        for tag in tags {
            maps.insert(tag, neuron_id);
        }
    }
}
