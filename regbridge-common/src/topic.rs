use crate::error::{Error, Result};

/// Default base topic for all published documents.
pub const DEFAULT_BASE_TOPIC: &str = "regbridge";

/// Builder for topics below a configured base.
///
/// Topics follow the pattern `<base>/<suffix>`. Device documents are
/// published at `<base>/<device_id>` with no further hierarchy, bridge
/// administration lives below `<base>/bridge/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    base: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TOPIC)
    }
}

impl TopicBuilder {
    /// Create a builder for a base topic. Trailing slashes are ignored.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// The base topic.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Build a full topic from a suffix.
    ///
    /// # Example
    /// ```
    /// use regbridge_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("modbus2mqtt");
    /// assert_eq!(topics.build("meter01"), "modbus2mqtt/meter01");
    /// assert_eq!(topics.build(""), "modbus2mqtt");
    /// ```
    pub fn build(&self, suffix: &str) -> String {
        join(&self.base, suffix)
    }

    /// Topic carrying the retained `online` / `offline` bridge state.
    ///
    /// # Example
    /// ```
    /// use regbridge_common::topic::TopicBuilder;
    ///
    /// assert_eq!(TopicBuilder::new("m2m").bridge_state(), "m2m/bridge/state");
    /// ```
    pub fn bridge_state(&self) -> String {
        self.build("bridge/state")
    }

    /// Topic carrying the bridge info document.
    pub fn bridge_info(&self) -> String {
        self.build("bridge/info")
    }

    /// Topic the bridge listens on for commands.
    pub fn bridge_request(&self) -> String {
        self.build("bridge/request")
    }

    /// Topic the bridge answers commands on.
    pub fn bridge_response(&self) -> String {
        self.build("bridge/response")
    }

    /// Strip the base from a full topic, returning the suffix.
    pub fn strip_base<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

/// Join a base and a suffix with a single `/`.
pub fn join(base: &str, suffix: &str) -> String {
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        base.to_string()
    } else if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{}/{}", base, suffix)
    }
}

/// Check that a value can be used as a single topic level.
///
/// Rejects empty values, level separators and wildcard characters, since a
/// device id must map to exactly one topic level on every supported bus.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::Topic("topic level cannot be empty".to_string()));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| matches!(c, '/' | '+' | '#' | '*' | '$' | '?'))
    {
        return Err(Error::Topic(format!(
            "'{}' contains reserved character '{}'",
            segment, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builder() {
        let topics = TopicBuilder::new("modbus2mqtt/");

        assert_eq!(topics.base(), "modbus2mqtt");
        assert_eq!(topics.build("meter01"), "modbus2mqtt/meter01");
        assert_eq!(topics.build("/meter01"), "modbus2mqtt/meter01");
        assert_eq!(topics.bridge_state(), "modbus2mqtt/bridge/state");
        assert_eq!(topics.bridge_info(), "modbus2mqtt/bridge/info");
        assert_eq!(topics.bridge_request(), "modbus2mqtt/bridge/request");
        assert_eq!(topics.bridge_response(), "modbus2mqtt/bridge/response");
    }

    #[test]
    fn test_default_base() {
        assert_eq!(TopicBuilder::default().build("x"), "regbridge/x");
    }

    #[test]
    fn test_strip_base() {
        let topics = TopicBuilder::new("base");
        assert_eq!(topics.strip_base("base/bridge/request"), Some("bridge/request"));
        assert_eq!(topics.strip_base("basement/x"), None);
        assert_eq!(topics.strip_base("other/x"), None);
    }

    #[test]
    fn test_join_empty_base() {
        assert_eq!(join("", "device"), "device");
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("meter-01").is_ok());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment("a+").is_err());
        assert!(validate_segment("#").is_err());
    }
}
