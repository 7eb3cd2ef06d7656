use std::collections::HashSet;

use chrono::NaiveDate;

use crate::{
    api::models::{MeterReadings, Product, Rates, Reading},
    prelude::*,
    quantity::{
        Value,
        energy::KilowattHours,
        price::{CubicMeterPrice, KilowattHourPrice},
        volume::CubicMeters,
    },
    sensor::SensorKind,
};

/// Latest meter readings and tariffs, all of them sharing the single reading date.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, bon::Builder)]
pub struct Snapshot {
    pub reading_date: Option<NaiveDate>,

    pub electricity_consumption_off_peak: Option<KilowattHours>,
    pub electricity_consumption_normal: Option<KilowattHours>,
    pub electricity_feed_in_off_peak: Option<KilowattHours>,
    pub electricity_feed_in_normal: Option<KilowattHours>,

    pub electricity_price_single: Option<KilowattHourPrice>,
    pub electricity_price_off_peak: Option<KilowattHourPrice>,
    pub electricity_price_normal: Option<KilowattHourPrice>,
    pub electricity_feed_in_compensation: Option<KilowattHourPrice>,
    pub electricity_feed_in_cost: Option<KilowattHourPrice>,

    pub gas_consumption: Option<CubicMeters>,
    pub gas_price: Option<CubicMeterPrice>,
}

impl Snapshot {
    /// Pick the readings to report and merge them with the tariffs.
    ///
    /// The reading date is the newest date on which every metered product has a reading.
    /// If electricity and gas have no date in common, gas is left out.
    pub fn new(meter_readings: &MeterReadings, rates: &Rates) -> Self {
        let (reading_date, electricity, gas) = pick_readings(
            &meter_readings.readings(Product::Electricity),
            &meter_readings.readings(Product::Gas),
        );
        let electricity_rates =
            rates.electricity.as_ref().map(|electricity| &electricity.rates.usage_dependent);
        let gas_rates = rates.gas.as_ref().map(|gas| &gas.rates.usage_dependent);

        Self {
            reading_date,
            electricity_consumption_off_peak: electricity
                .and_then(|reading| reading.off_peak_consumption),
            electricity_consumption_normal: electricity
                .and_then(|reading| reading.normal_consumption),
            electricity_feed_in_off_peak: electricity.and_then(|reading| reading.off_peak_feed_in),
            electricity_feed_in_normal: electricity.and_then(|reading| reading.normal_feed_in),
            electricity_price_single: electricity_rates.and_then(|rates| rates.delivery_single),
            electricity_price_off_peak: electricity_rates.and_then(|rates| rates.delivery_off_peak),
            electricity_price_normal: electricity_rates.and_then(|rates| rates.delivery_normal),
            electricity_feed_in_compensation: electricity_rates
                .and_then(|rates| rates.feed_in_compensation),
            electricity_feed_in_cost: electricity_rates.and_then(|rates| rates.feed_in_cost),
            gas_consumption: gas.and_then(|reading| reading.gas),
            gas_price: gas_rates.and_then(|rates| rates.delivery),
        }
    }

    pub fn electricity_consumption_total(&self) -> Option<KilowattHours> {
        Some(self.electricity_consumption_off_peak? + self.electricity_consumption_normal?)
    }

    pub fn electricity_feed_in_total(&self) -> Option<KilowattHours> {
        Some(self.electricity_feed_in_off_peak? + self.electricity_feed_in_normal?)
    }

    /// Plain value for the sensor, [`None`] when the portal did not provide it.
    pub fn value(&self, kind: SensorKind) -> Option<f64> {
        match kind {
            SensorKind::ElectricityConsumptionOffPeak => {
                self.electricity_consumption_off_peak.map(Value::value)
            }
            SensorKind::ElectricityConsumptionNormal => {
                self.electricity_consumption_normal.map(Value::value)
            }
            SensorKind::ElectricityConsumptionTotal => {
                self.electricity_consumption_total().map(Value::value)
            }
            SensorKind::ElectricityFeedInOffPeak => {
                self.electricity_feed_in_off_peak.map(Value::value)
            }
            SensorKind::ElectricityFeedInNormal => self.electricity_feed_in_normal.map(Value::value),
            SensorKind::ElectricityFeedInTotal => {
                self.electricity_feed_in_total().map(Value::value)
            }
            SensorKind::ElectricityPriceSingle => self.electricity_price_single.map(Value::value),
            SensorKind::ElectricityPriceOffPeak => {
                self.electricity_price_off_peak.map(Value::value)
            }
            SensorKind::ElectricityPriceNormal => self.electricity_price_normal.map(Value::value),
            SensorKind::ElectricityFeedInCompensation => {
                self.electricity_feed_in_compensation.map(Value::value)
            }
            SensorKind::ElectricityFeedInCost => self.electricity_feed_in_cost.map(Value::value),
            SensorKind::GasConsumption => self.gas_consumption.map(Value::value),
            SensorKind::GasPrice => self.gas_price.map(Value::value),
        }
    }
}

fn pick_readings<'a>(
    electricity: &[&'a Reading],
    gas: &[&'a Reading],
) -> (Option<NaiveDate>, Option<&'a Reading>, Option<&'a Reading>) {
    match (electricity.first().copied(), gas.first().copied()) {
        (None, None) => (None, None, None),
        (Some(electricity), None) => (Some(electricity.date()), Some(electricity), None),
        (None, Some(gas)) => (Some(gas.date()), None, Some(gas)),
        (Some(latest_electricity), Some(_)) => {
            let gas_dates = gas.iter().map(|reading| reading.date()).collect::<HashSet<_>>();
            let common =
                electricity.iter().copied().find(|reading| gas_dates.contains(&reading.date()));
            if let Some(electricity) = common {
                let date = electricity.date();
                let gas = gas.iter().find(|reading| reading.date() == date).copied();
                (Some(date), Some(electricity), gas)
            } else {
                warn!(
                    electricity = %latest_electricity.date(),
                    "electricity and gas readings have no date in common, skipping gas",
                );
                (Some(latest_electricity.date()), Some(latest_electricity), None)
            }
        }
    }
}
