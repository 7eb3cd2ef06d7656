pub mod home_assistant;

use async_trait::async_trait;

use crate::{prelude::*, sensor::SensorSet};

/// Entity state store which receives the sensors after each successful poll.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, sensors: &SensorSet) -> Result;
}

/// Writes the sensor states to the log.
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, sensors: &SensorSet) -> Result {
        for sensor in sensors.iter() {
            info!(
                entity_id = %sensor.entity_id(),
                state = %sensor.state,
                unit = sensor.kind.unit(),
                measurement_date = ?sensor.measurement_date,
            );
        }
        Ok(())
    }
}
