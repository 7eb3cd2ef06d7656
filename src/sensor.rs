//! Sensor entities of a single configured instance.

use std::fmt::{Display, Formatter};

use chrono::NaiveDate;
use enumset::{EnumSet, EnumSetType};
use serde::Serialize;

use crate::{
    quantity::{
        energy::KilowattHours,
        price::{CubicMeterPrice, KilowattHourPrice},
        volume::CubicMeters,
    },
    snapshot::Snapshot,
};

#[derive(Debug, Hash, EnumSetType)]
pub enum SensorKind {
    ElectricityConsumptionOffPeak,
    ElectricityConsumptionNormal,
    ElectricityConsumptionTotal,
    ElectricityFeedInOffPeak,
    ElectricityFeedInNormal,
    ElectricityFeedInTotal,
    ElectricityPriceSingle,
    ElectricityPriceOffPeak,
    ElectricityPriceNormal,
    ElectricityFeedInCompensation,
    ElectricityFeedInCost,
    GasConsumption,
    GasPrice,
}

impl SensorKind {
    pub const fn key(self) -> &'static str {
        match self {
            Self::ElectricityConsumptionOffPeak => "electricity_consumption_off_peak",
            Self::ElectricityConsumptionNormal => "electricity_consumption_normal",
            Self::ElectricityConsumptionTotal => "electricity_consumption_total",
            Self::ElectricityFeedInOffPeak => "electricity_feed_in_off_peak",
            Self::ElectricityFeedInNormal => "electricity_feed_in_normal",
            Self::ElectricityFeedInTotal => "electricity_feed_in_total",
            Self::ElectricityPriceSingle => "electricity_price_single",
            Self::ElectricityPriceOffPeak => "electricity_price_off_peak",
            Self::ElectricityPriceNormal => "electricity_price_normal",
            Self::ElectricityFeedInCompensation => "electricity_feed_in_compensation",
            Self::ElectricityFeedInCost => "electricity_feed_in_cost",
            Self::GasConsumption => "gas_consumption",
            Self::GasPrice => "gas_price",
        }
    }

    /// Title-cased key: `gas_consumption` → `Gas Consumption`.
    pub fn title(self) -> String {
        self.key()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect::<String>()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::ElectricityConsumptionOffPeak
            | Self::ElectricityConsumptionNormal
            | Self::ElectricityConsumptionTotal
            | Self::ElectricityFeedInOffPeak
            | Self::ElectricityFeedInNormal
            | Self::ElectricityFeedInTotal => KilowattHours::UNIT,
            Self::ElectricityPriceSingle
            | Self::ElectricityPriceOffPeak
            | Self::ElectricityPriceNormal
            | Self::ElectricityFeedInCompensation
            | Self::ElectricityFeedInCost => KilowattHourPrice::UNIT,
            Self::GasConsumption => CubicMeters::UNIT,
            Self::GasPrice => CubicMeterPrice::UNIT,
        }
    }

    pub const fn device_class(self) -> DeviceClass {
        match self {
            Self::ElectricityConsumptionOffPeak
            | Self::ElectricityConsumptionNormal
            | Self::ElectricityConsumptionTotal
            | Self::ElectricityFeedInOffPeak
            | Self::ElectricityFeedInNormal
            | Self::ElectricityFeedInTotal => DeviceClass::Energy,
            Self::GasConsumption => DeviceClass::Gas,
            Self::ElectricityPriceSingle
            | Self::ElectricityPriceOffPeak
            | Self::ElectricityPriceNormal
            | Self::ElectricityFeedInCompensation
            | Self::ElectricityFeedInCost
            | Self::GasPrice => DeviceClass::Monetary,
        }
    }

    /// [Material Design](https://pictogrammers.com/library/mdi/) icon.
    pub const fn icon(self) -> &'static str {
        match self {
            Self::ElectricityConsumptionOffPeak => "mdi:weather-sunset-down",
            Self::ElectricityConsumptionNormal => "mdi:weather-sunset-up",
            Self::ElectricityConsumptionTotal => "mdi:transmission-tower-export",
            Self::ElectricityFeedInOffPeak | Self::ElectricityFeedInNormal => "mdi:solar-power",
            Self::ElectricityFeedInTotal => "mdi:transmission-tower-import",
            Self::GasConsumption => "mdi:fire",
            Self::ElectricityPriceSingle
            | Self::ElectricityPriceOffPeak
            | Self::ElectricityPriceNormal
            | Self::ElectricityFeedInCompensation
            | Self::ElectricityFeedInCost
            | Self::GasPrice => "mdi:currency-eur",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    #[display("energy")]
    Energy,

    #[display("gas")]
    Gas,

    #[display("monetary")]
    Monetary,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SensorState {
    /// Not polled yet.
    Unknown,

    /// The last successful poll did not provide the value.
    Unavailable,

    Available(f64),
}

impl Display for SensorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Available(value) => write!(f, "{value}"),
        }
    }
}

#[must_use]
#[derive(Clone, Debug)]
pub struct Sensor {
    pub kind: SensorKind,

    /// `<prefix> <kind title>`
    pub name: String,

    pub unique_id: String,

    pub state: SensorState,

    pub measurement_date: Option<NaiveDate>,
}

impl Sensor {
    pub fn new(prefix: &str, kind: SensorKind) -> Self {
        Self {
            kind,
            name: format!("{prefix} {}", kind.title()),
            unique_id: format!("{}_{}", slugify(prefix), kind.key()),
            state: SensorState::Unknown,
            measurement_date: None,
        }
    }

    pub fn entity_id(&self) -> String {
        format!("sensor.{}", self.unique_id)
    }
}

/// All the sensors of one instance.
#[must_use]
#[derive(Clone, Debug)]
pub struct SensorSet(Vec<Sensor>);

impl SensorSet {
    pub fn new(prefix: &str) -> Self {
        Self(EnumSet::<SensorKind>::all().iter().map(|kind| Sensor::new(prefix, kind)).collect())
    }

    /// Replace every sensor's state with the snapshot's, wholesale.
    pub fn apply(&mut self, snapshot: &Snapshot) {
        for sensor in &mut self.0 {
            sensor.state =
                snapshot.value(sensor.kind).map_or(SensorState::Unavailable, SensorState::Available);
            sensor.measurement_date = snapshot.reading_date;
        }
    }

    pub fn get(&self, kind: SensorKind) -> Option<&Sensor> {
        self.0.iter().find(|sensor| sensor.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Lower-case ASCII alphanumerics separated by single underscores.
///
/// Common accented Latin letters are transliterated: `Café` becomes `cafe`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for character in text.chars().flat_map(char::to_lowercase) {
        if character.is_ascii_alphanumeric() {
            slug.push(character);
        } else if let Some(ascii) = transliterate(character) {
            slug.push_str(ascii);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

const fn transliterate(character: char) -> Option<&'static str> {
    match character {
        'à'..='å' | 'ā' => Some("a"),
        'æ' => Some("ae"),
        'ç' | 'č' => Some("c"),
        'è'..='ë' | 'ē' | 'ě' => Some("e"),
        'ì'..='ï' | 'ī' => Some("i"),
        'ñ' | 'ň' => Some("n"),
        'ò'..='ö' | 'ø' | 'ō' => Some("o"),
        'œ' => Some("oe"),
        'ß' => Some("ss"),
        'š' => Some("s"),
        'ù'..='ü' | 'ū' | 'ů' => Some("u"),
        'ý' | 'ÿ' => Some("y"),
        'ž' => Some("z"),
        'ĳ' => Some("ij"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 1, 10)
    }

    #[test]
    fn test_sensor_names() {
        let sensors = SensorSet::new("House");
        assert_eq!(sensors.len(), 13);
        let sensor = sensors.get(SensorKind::ElectricityConsumptionNormal).unwrap();
        assert_eq!(sensor.name, "House Electricity Consumption Normal");
        assert_eq!(sensor.entity_id(), "sensor.house_electricity_consumption_normal");
        assert_eq!(sensor.state, SensorState::Unknown);
        assert_eq!(sensors.get(SensorKind::ElectricityFeedInCost).unwrap().name, "House Electricity Feed In Cost");
    }

    #[test]
    fn test_units() {
        assert_eq!(SensorKind::ElectricityConsumptionTotal.unit(), "kWh");
        assert_eq!(SensorKind::ElectricityPriceOffPeak.unit(), "€/kWh");
        assert_eq!(SensorKind::GasConsumption.unit(), "m³");
        assert_eq!(SensorKind::GasPrice.unit(), "€/m³");
        assert_eq!(SensorKind::GasConsumption.device_class(), DeviceClass::Gas);
    }

    #[test]
    fn test_apply_example() {
        let snapshot = Snapshot::builder()
            .maybe_reading_date(date())
            .electricity_consumption_normal(KilowattHours(120.5))
            .gas_consumption(CubicMeters(45.2))
            .build();
        let mut sensors = SensorSet::new("House");
        sensors.apply(&snapshot);

        let electricity = sensors.get(SensorKind::ElectricityConsumptionNormal).unwrap();
        assert_eq!(electricity.name, "House Electricity Consumption Normal");
        assert_eq!(electricity.state, SensorState::Available(120.5));
        assert_eq!(electricity.kind.unit(), "kWh");

        let gas = sensors.get(SensorKind::GasConsumption).unwrap();
        assert_eq!(gas.name, "House Gas Consumption");
        assert_eq!(gas.state, SensorState::Available(45.2));
        assert_eq!(gas.kind.unit(), "m³");

        assert!(sensors.iter().all(|sensor| sensor.measurement_date == date()));
        assert_eq!(
            sensors.get(SensorKind::GasPrice).unwrap().state,
            SensorState::Unavailable,
        );
    }

    #[test]
    fn test_apply_missing_field_only_affects_its_sensor() {
        let full = Snapshot::builder()
            .maybe_reading_date(date())
            .electricity_price_single(KilowattHourPrice(0.25))
            .gas_price(CubicMeterPrice(0.8))
            .build();
        let mut sensors = SensorSet::new("House");
        sensors.apply(&full);

        let partial = Snapshot { gas_price: None, ..full };
        sensors.apply(&partial);
        assert_eq!(sensors.get(SensorKind::GasPrice).unwrap().state, SensorState::Unavailable);
        assert_eq!(
            sensors.get(SensorKind::ElectricityPriceSingle).unwrap().state,
            SensorState::Available(0.25),
        );
    }

    #[test]
    fn test_apply_is_idempotent() {
        let snapshot = Snapshot::builder()
            .maybe_reading_date(date())
            .electricity_consumption_off_peak(KilowattHours(1.0))
            .build();
        let mut sensors = SensorSet::new("House");
        sensors.apply(&snapshot);
        let first = sensors.iter().map(|sensor| (sensor.state, sensor.measurement_date)).collect::<Vec<_>>();
        sensors.apply(&snapshot);
        let second = sensors.iter().map(|sensor| (sensor.state, sensor.measurement_date)).collect::<Vec<_>>();
        assert_eq!(first, second);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("House"), "house");
        assert_eq!(slugify("  Holiday home #2!"), "holiday_home_2");
        assert_eq!(slugify("Café"), "cafe");
        assert_eq!(slugify("Zuiderstraße 12-Ä"), "zuiderstrasse_12_a");
        assert_eq!(slugify("Ĳsselmeer Ø"), "ijsselmeer_o");
    }
}
