//! Topic addresses
//!
//! A topic stands in for a network endpoint: it is the source address of
//! inbound datagrams and the destination of outbound ones. `NetAddr` is the
//! address contract the connection accepts, so foreign address kinds can be
//! rejected by their `network()` tag.

use std::fmt;

/// Network tag reported by every `TopicAddr`.
pub const TOPIC_NETWORK: &str = "mqttTopic";

/// A network address: a family tag plus a string rendering (`Display`).
pub trait NetAddr: fmt::Display + Send + Sync {
    fn network(&self) -> &str;
}

/// An MQTT topic used as a network address. Renders as the topic verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicAddr(String);

impl TopicAddr {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl NetAddr for TopicAddr {
    fn network(&self) -> &str {
        TOPIC_NETWORK
    }
}

impl fmt::Display for TopicAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicAddr {
    fn from(topic: &str) -> Self {
        Self::new(topic)
    }
}

impl From<String> for TopicAddr {
    fn from(topic: String) -> Self {
        Self(topic)
    }
}

impl AsRef<str> for TopicAddr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
