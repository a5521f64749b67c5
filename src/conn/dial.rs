//! Connection URIs
//!
//! `mqtt://[user[:password]@]host[:port][/topic]` connects over plain TCP
//! (port 1883 by default), `mqtts://...` over TLS (port 8883 by default).
//! A non-empty path is the default topic: it is subscribed at QoS 0 and used
//! by un-addressed writes.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use rumqttc::{MqttOptions, Transport};
use tracing::info;
use url::{Host, Url};
use uuid::Uuid;

use super::MqttConn;
use crate::client::MqttSession;
use crate::config::ClientSettings;
use crate::utils::{Error, Result};

pub const MQTT_PORT: u16 = 1883;
pub const MQTTS_PORT: u16 = 8883;

/// A parsed connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUri {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: Option<String>,
}

fn decode(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|err| Error::InvalidUri(err.to_string()))
}

impl BrokerUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)?;

        let (secure, default_port) = match url.scheme() {
            "mqtt" => (false, MQTT_PORT),
            "mqtts" => (true, MQTTS_PORT),
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(Error::InvalidUri(format!("missing broker host in `{uri}`"))),
        };

        let username = match url.username() {
            "" => None,
            user => Some(decode(user)?),
        };
        let password = url.password().map(decode).transpose()?;

        let path = decode(url.path())?;
        let topic = path.strip_prefix('/').unwrap_or(&path);
        let topic = (!topic.is_empty()).then(|| topic.to_string());

        Ok(Self {
            secure,
            host,
            port: url.port().unwrap_or(default_port),
            username,
            password,
            topic,
        })
    }

    /// Session options for this broker, identified as `client_id`.
    pub fn mqtt_options(&self, client_id: &str, settings: &ClientSettings) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(settings.keep_alive());
        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }
        if self.secure {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

impl MqttConn<MqttSession> {
    /// Connects to the broker in `uri` with default client settings.
    pub async fn dial(uri: &str) -> Result<Self> {
        Self::dial_with(uri, &ClientSettings::default()).await
    }

    /// Connects to the broker in `uri`, waiting for the session to be up.
    ///
    /// The session gets a random client id. If the URI names a topic, the
    /// connection subscribes to it and uses it as the default destination.
    pub async fn dial_with(uri: &str, settings: &ClientSettings) -> Result<Self> {
        let target = BrokerUri::parse(uri)?;
        let client_id = Uuid::new_v4().to_string();
        let options = target.mqtt_options(&client_id, settings);

        let session = MqttSession::connect(options, settings).await?;
        let conn = MqttConn::wrap(session).with_disconnect_grace(settings.disconnect_grace());

        if let Some(topic) = &target.topic {
            conn.attach_default_topic(topic).await?;
            info!(%topic, "default topic attached");
        }
        Ok(conn)
    }
}
