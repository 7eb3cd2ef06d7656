use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval, timeout};

use crate::{
    api::SnapshotSource,
    error::ApiError,
    prelude::*,
    publisher::Publisher,
    sensor::SensorSet,
};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Update cycle of a single configured instance.
pub struct Coordinator<S> {
    name: String,
    source: S,
    sensors: SensorSet,
    publishers: Vec<Box<dyn Publisher>>,
    poll_timeout: Duration,
}

#[bon::bon]
impl<S: SnapshotSource> Coordinator<S> {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        source: S,
        #[builder(default)] publishers: Vec<Box<dyn Publisher>>,
        #[builder(default = DEFAULT_POLL_TIMEOUT)] poll_timeout: Duration,
    ) -> Self {
        let sensors = SensorSet::new(&name);
        Self { name, source, sensors, publishers, poll_timeout }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn sensors(&self) -> &SensorSet {
        &self.sensors
    }

    /// Log in and resolve the contract.
    #[instrument(skip_all, fields(instance = %self.name))]
    pub async fn setup(&mut self) -> Result<(), ApiError> {
        timeout(self.poll_timeout, self.source.setup()).await.map_err(|_| ApiError::TimedOut)?
    }

    /// Fetch the latest snapshot and publish the updated sensors.
    ///
    /// On failure, the sensors keep their last known states.
    #[instrument(skip_all, fields(instance = %self.name))]
    pub async fn poll(&mut self) -> Result<(), ApiError> {
        info!("polling…");
        let snapshot = timeout(self.poll_timeout, self.source.fetch_snapshot())
            .await
            .map_err(|_| ApiError::TimedOut)??;
        self.sensors.apply(&snapshot);
        info!(reading_date = ?snapshot.reading_date, "updated the sensors");

        for publisher in &self.publishers {
            if let Err(error) = publisher.publish(&self.sensors).await {
                warn!("failed to publish the sensors: {error:#}");
            }
        }
        Ok(())
    }

    /// Poll every `period` until a failure that needs the user's attention.
    pub async fn run(mut self, period: Duration) -> Result<(), ApiError> {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut is_set_up = false;
        loop {
            interval.tick().await;
            let result = if is_set_up {
                self.poll().await
            } else {
                match self.setup().await {
                    Ok(()) => {
                        is_set_up = true;
                        self.poll().await
                    }
                    Err(error) => Err(error),
                }
            };
            match result {
                Ok(()) => {}
                Err(error) if error.is_transient() => {
                    warn!(instance = %self.name, "poll failed, retrying on the next tick: {error}");
                }
                Err(error) => {
                    error!(instance = %self.name, "stopping: {error}");
                    return Err(error);
                }
            }
        }
    }
}
