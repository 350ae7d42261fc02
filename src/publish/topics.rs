//! Station to topic routing
//!
//! The map is closed: it is built once from configuration and never changes
//! during a run. Stations outside it are dropped at publish time.

use crate::config::{ConfigError, TopicsSection};
use std::collections::BTreeMap;

/// MQTT caps topic names at 65535 bytes of UTF-8
const MAX_TOPIC_LEN: usize = 65_535;

/// Check that `topic` is a publishable MQTT topic name
pub fn validate_topic(topic: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTopic {
        topic: topic.to_string(),
        reason: reason.to_string(),
    };

    if topic.is_empty() {
        return Err(invalid("topic must not be empty"));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(invalid("topic exceeds 65535 bytes"));
    }
    if topic.contains(['+', '#']) {
        return Err(invalid("wildcards are not allowed in publish topics"));
    }
    if topic.contains('\0') {
        return Err(invalid("topic contains a NUL character"));
    }

    Ok(())
}

/// Closed mapping from station identifier to output topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationTopicMap {
    routes: BTreeMap<u32, String>,
}

impl StationTopicMap {
    /// Build the map, rejecting duplicate stations and invalid topics
    pub fn new<I, S>(routes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (station_id, topic) in routes {
            let topic = topic.into();
            validate_topic(&topic)?;
            if map.insert(station_id, topic).is_some() {
                return Err(ConfigError::DuplicateStation(station_id));
            }
        }
        Ok(Self { routes: map })
    }

    pub fn from_config(topics: &TopicsSection) -> Result<Self, ConfigError> {
        Self::new(
            topics
                .stations
                .iter()
                .map(|route| (route.id, route.topic.clone())),
        )
    }

    /// Topic for `station_id`, or `None` when the station is not routed
    pub fn topic_for(&self, station_id: u32) -> Option<&str> {
        self.routes.get(&station_id).map(String::as_str)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn default_map() -> StationTopicMap {
        StationTopicMap::from_config(&TopicsSection::default()).unwrap()
    }

    #[test]
    fn test_default_routes() {
        let map = default_map();

        assert_eq!(map.len(), 3);
        assert_eq!(map.topic_for(50), Some("/api/temperature/S50"));
        assert_eq!(map.topic_for(107), Some("/api/temperature/S107"));
        assert_eq!(map.topic_for(60), Some("/api/temperature/S60"));
        assert_eq!(map.topic_for(999), None);
    }

    #[test]
    fn test_duplicate_station_rejected() {
        let result = StationTopicMap::new([(50, "/a"), (50, "/b")]);
        assert!(matches!(result, Err(ConfigError::DuplicateStation(50))));
    }

    #[test]
    fn test_invalid_topics_rejected() {
        for topic in ["", "/api/+/S50", "/api/#", "/api/\0"] {
            assert!(
                validate_topic(topic).is_err(),
                "topic {topic:?} should be rejected"
            );
        }
        assert!(validate_topic("events/disconnect").is_ok());
        assert!(validate_topic("/api/status").is_ok());
    }

    #[test]
    fn test_empty_map() {
        let map = StationTopicMap::new(Vec::<(u32, String)>::new()).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.topic_for(50), None);
    }

    proptest! {
        #[test]
        fn unknown_stations_never_route(station in any::<u32>()) {
            let map = default_map();
            let known = [50u32, 107, 60].contains(&station);
            prop_assert_eq!(map.topic_for(station).is_some(), known);
        }

        #[test]
        fn topics_without_wildcards_validate(topic in "[a-zA-Z0-9/_.-]{1,64}") {
            prop_assert!(validate_topic(&topic).is_ok());
        }
    }
}
