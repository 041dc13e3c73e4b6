//! MQTT light toggles bound to the X and Y buttons
//!
//! Fire and forget: a toggle enqueues an `ON`/`OFF` publish and returns.
//! A background task drives the rumqttc event loop and reconnects on its own.

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CLIENT_ID: &str = "snes-link";
const KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 16;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Light {
    Light1,
    Light2,
}

impl Light {
    fn index(self) -> usize {
        match self {
            Light::Light1 => 0,
            Light::Light2 => 1,
        }
    }
}

impl fmt::Display for Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Light::Light1 => f.write_str("light1"),
            Light::Light2 => f.write_str("light2"),
        }
    }
}

/// Broker and topics; every field is optional and the switch stays off
/// unless host and both topics are present
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub topic_light1: Option<String>,
    pub topic_light2: Option<String>,
}

impl LightsConfig {
    pub const DEFAULT_PORT: u16 = 1883;

    fn broker(&self) -> Option<(&str, [&str; 2])> {
        let host = self.host.as_deref()?;
        let topics = [self.topic_light1.as_deref()?, self.topic_light2.as_deref()?];
        Some((host, topics))
    }

    pub fn is_enabled(&self) -> bool {
        self.broker().is_some()
    }
}

pub struct LightSwitch {
    client: AsyncClient,
    topics: [String; 2],
    on: [bool; 2],
    event_loop: Option<JoinHandle<()>>,
}

impl LightSwitch {
    /// Start the MQTT client, or `None` when lights are not configured
    pub fn connect(config: &LightsConfig, cancel: CancellationToken) -> Option<Self> {
        let (mut switch, event_loop) = Self::new(config)?;
        switch.event_loop = Some(tokio::spawn(drive(event_loop, cancel)));
        Some(switch)
    }

    fn new(config: &LightsConfig) -> Option<(Self, EventLoop)> {
        let (host, topics) = config.broker()?;
        let port = config.port.unwrap_or(LightsConfig::DEFAULT_PORT);

        let mut options = MqttOptions::new(CLIENT_ID, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&config.user, &config.pass) {
            options.set_credentials(user.clone(), pass.clone());
        }
        info!("Light switch using broker {}:{}", host, port);

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let switch = Self {
            client,
            topics: topics.map(str::to_string),
            on: [false; 2],
            event_loop: None,
        };
        Some((switch, event_loop))
    }

    /// Flip `light` and publish its new state; returns the new state
    pub fn toggle(&mut self, light: Light) -> bool {
        let i = light.index();
        self.on[i] = !self.on[i];
        let payload = if self.on[i] { "ON" } else { "OFF" };

        match self
            .client
            .try_publish(&self.topics[i], QoS::AtLeastOnce, false, payload)
        {
            Ok(()) => info!("{} {}", light, payload),
            Err(e) => warn!("Publishing {} {} failed: {}", light, payload, e),
        }
        self.on[i]
    }

    pub fn is_on(&self, light: Light) -> bool {
        self.on[light.index()]
    }

    pub async fn shutdown(self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect not sent: {}", e);
        }
        if let Some(task) = self.event_loop {
            if let Err(e) = task.await {
                warn!("MQTT event loop task failed: {}", e);
            }
        }
    }
}

async fn drive(mut event_loop: EventLoop, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };
        match event {
            Ok(event) => debug!("MQTT {:?}", event),
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    debug!("MQTT event loop stopped");
}
