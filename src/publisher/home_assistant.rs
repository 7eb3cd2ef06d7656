//! Home Assistant [REST API](https://developers.home-assistant.io/docs/api/rest/) publisher.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{
    Client,
    Url,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Serialize;

use crate::{
    prelude::*,
    publisher::Publisher,
    sensor::{DeviceClass, Sensor, SensorSet},
};

pub struct HomeAssistant {
    client: Client,
    base_url: Url,
}

impl HomeAssistant {
    /// Base URL is the API root, for example: `http://localhost:8123/api`.
    pub fn try_new(access_token: &str, base_url: Url) -> Result<Self> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .context("invalid Home Assistant access token")?;
        authorization.set_sensitive(true);
        let client = Client::builder()
            .default_headers(HeaderMap::from_iter([(AUTHORIZATION, authorization)]))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }

    #[instrument(skip_all, fields(entity_id = %sensor.entity_id()))]
    async fn set_state(&self, sensor: &Sensor) -> Result {
        let entity_id = sensor.entity_id();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .pop_if_empty()
            .push("states")
            .push(&entity_id);
        self.client
            .post(url)
            .json(&State::from(sensor))
            .send()
            .await
            .with_context(|| format!("failed to set the state of `{entity_id}`"))?
            .error_for_status()
            .with_context(|| format!("Home Assistant rejected the state of `{entity_id}`"))?;
        debug!("posted");
        Ok(())
    }
}

#[async_trait]
impl Publisher for HomeAssistant {
    /// Every sensor is attempted, and the failures are reported together.
    async fn publish(&self, sensors: &SensorSet) -> Result {
        let mut failed_entity_ids = Vec::new();
        for sensor in sensors.iter() {
            if let Err(error) = self.set_state(sensor).await {
                warn!(entity_id = %sensor.entity_id(), "failed to publish: {error:#}");
                failed_entity_ids.push(sensor.entity_id());
            }
        }
        ensure!(
            failed_entity_ids.is_empty(),
            "failed to publish {} of {} sensors: {}",
            failed_entity_ids.len(),
            sensors.len(),
            failed_entity_ids.join(", "),
        );
        info!(n_sensors = sensors.len(), "published to Home Assistant");
        Ok(())
    }
}

#[derive(Serialize)]
struct State<'a> {
    state: String,
    attributes: Attributes<'a>,
}

#[derive(Serialize)]
struct Attributes<'a> {
    friendly_name: &'a str,
    unit_of_measurement: &'static str,
    device_class: DeviceClass,
    state_class: &'static str,
    icon: &'static str,
    measurement_date: Option<NaiveDate>,
}

impl<'a> From<&'a Sensor> for State<'a> {
    fn from(sensor: &'a Sensor) -> Self {
        Self {
            state: sensor.state.to_string(),
            attributes: Attributes {
                friendly_name: &sensor.name,
                unit_of_measurement: sensor.kind.unit(),
                device_class: sensor.kind.device_class(),
                state_class: "total",
                icon: sensor.kind.icon(),
                measurement_date: sensor.measurement_date,
            },
        }
    }
}
