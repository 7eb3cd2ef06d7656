use std::{
    cmp::Reverse,
    fmt::{Display, Formatter},
};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, de};
use serde_with::serde_as;

use crate::{
    config::ContractSelector,
    quantity::{
        energy::KilowattHours,
        price::{CubicMeterPrice, KilowattHourPrice},
        volume::CubicMeters,
    },
};

/// `/api/v2/Preferences/`
#[derive(Deserialize)]
pub struct Preferences {
    pub subject: PreferencesSubject,
}

#[derive(Deserialize)]
pub struct PreferencesSubject {
    #[serde(rename = "customerNumber")]
    pub customer_number: u64,

    #[serde(rename = "agreementId")]
    pub agreement_id: u64,
}

impl From<PreferencesSubject> for ContractSelector {
    fn from(subject: PreferencesSubject) -> Self {
        Self { customer_number: subject.customer_number, agreement_id: subject.agreement_id }
    }
}

/// Single entry of `/api/v2/Profiles/`.
#[derive(Deserialize)]
pub struct Profile {
    #[serde(rename = "customerNumber")]
    pub customer_number: u64,

    #[serde(rename = "agreementId")]
    pub agreement_id: u64,

    #[serde(default)]
    pub street: Option<String>,

    #[serde(default, rename = "houseNumber")]
    pub house_number: Option<u32>,

    #[serde(default, rename = "houseNumberAddition")]
    pub house_number_addition: Option<HouseNumberAddition>,

    #[serde(default, rename = "postalCode")]
    pub postal_code: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default, rename = "energySupplyStatus")]
    pub energy_supply_status: Option<String>,
}

impl Profile {
    pub const fn selector(&self) -> ContractSelector {
        ContractSelector { customer_number: self.customer_number, agreement_id: self.agreement_id }
    }

    /// Human-readable address, falls back to the selector when the address is unknown.
    pub fn address(&self) -> String {
        let house = self.house_number.map(|number| match &self.house_number_addition {
            Some(addition) => format!("{number}{addition}"),
            None => number.to_string(),
        });
        let parts = [self.street.clone(), house, self.postal_code.clone(), self.city.clone()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect_vec();
        if parts.is_empty() { format!("Profile {}", self.selector()) } else { parts.join(" ") }
    }
}

/// The portal returns either a number or a string here.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum HouseNumberAddition {
    Number(i64),
    Text(String),
}

impl Display for HouseNumberAddition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Product {
    Electricity,
    Gas,
}

/// `/api/v2/customers/<customer number>/agreements/<agreement ID>/meter-readings/<year>/`
#[must_use]
#[serde_as]
#[derive(Default, Deserialize)]
pub struct MeterReadings(#[serde_as(as = "serde_with::VecSkipError<_>")] pub Vec<MeterProduct>);

impl MeterReadings {
    pub fn is_empty(&self) -> bool {
        self.0.iter().flat_map(|product| &product.months).all(|month| month.readings.is_empty())
    }

    /// Readings of the product, newest first.
    pub fn readings(&self, product: Product) -> Vec<&Reading> {
        self.0
            .iter()
            .filter(|meter_product| meter_product.product() == Some(product))
            .flat_map(|meter_product| &meter_product.months)
            .flat_map(|month| month.readings.iter().map(move |reading| (month.month, reading)))
            .sorted_by_key(|(month, reading)| Reverse((*month, reading.reading_date)))
            .map(|(_, reading)| reading)
            .collect()
    }
}

#[serde_as]
#[derive(Deserialize)]
pub struct MeterProduct {
    #[serde(rename = "productType")]
    pub product_type: String,

    #[serde_as(as = "serde_with::VecSkipError<_>")]
    #[serde(default)]
    pub months: Vec<MeterMonth>,
}

impl MeterProduct {
    pub fn product(&self) -> Option<Product> {
        match self.product_type.to_lowercase().as_str() {
            "stroom" | "electricity" => Some(Product::Electricity),
            "gas" => Some(Product::Gas),
            _ => None,
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
pub struct MeterMonth {
    pub month: u32,

    #[serde_as(as = "serde_with::VecSkipError<_>")]
    #[serde(default)]
    pub readings: Vec<Reading>,
}

/// Cumulative meter reading.
///
/// Individual values turn into [`None`] when missing or malformed.
#[serde_as]
#[derive(Deserialize)]
pub struct Reading {
    #[serde(rename = "readingDate", deserialize_with = "deserialize_reading_date")]
    pub reading_date: NaiveDateTime,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "normalConsumption")]
    pub normal_consumption: Option<KilowattHours>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "offPeakConsumption")]
    pub off_peak_consumption: Option<KilowattHours>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "normalFeedIn")]
    pub normal_feed_in: Option<KilowattHours>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "offPeakFeedIn")]
    pub off_peak_feed_in: Option<KilowattHours>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default)]
    pub gas: Option<CubicMeters>,
}

impl Reading {
    pub fn date(&self) -> NaiveDate {
        self.reading_date.date()
    }
}

/// Accept both local (`2022-05-06T00:00:00`) and offset timestamps.
fn deserialize_reading_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<NaiveDateTime, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse::<NaiveDateTime>()
        .or_else(|_| text.parse::<DateTime<FixedOffset>>().map(|it| it.naive_local()))
        .or_else(|_| text.parse::<NaiveDate>().map(|date| date.and_time(chrono::NaiveTime::MIN)))
        .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &"a timestamp"))
}

/// `/api/v2/customers/<customer number>/agreements/<agreement ID>/rates`
#[must_use]
#[serde_as]
#[derive(Default, Deserialize)]
pub struct Rates {
    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default)]
    pub electricity: Option<ElectricityRates>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default)]
    pub gas: Option<GasRates>,
}

#[derive(Deserialize)]
pub struct ElectricityRates {
    pub rates: ElectricityRateSet,
}

#[derive(Deserialize)]
pub struct ElectricityRateSet {
    #[serde(rename = "usageDependentElectricityRates")]
    pub usage_dependent: UsageDependentElectricityRates,
}

#[serde_as]
#[derive(Deserialize)]
pub struct UsageDependentElectricityRates {
    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "allInDeliverySingleIncludingVat")]
    pub delivery_single: Option<KilowattHourPrice>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "allInDeliveryLowIncludingVat")]
    pub delivery_off_peak: Option<KilowattHourPrice>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "allInDeliveryNormalIncludingVat")]
    pub delivery_normal: Option<KilowattHourPrice>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "feedInCompensation")]
    pub feed_in_compensation: Option<KilowattHourPrice>,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "feedInCostIncludingVat")]
    pub feed_in_cost: Option<KilowattHourPrice>,
}

#[derive(Deserialize)]
pub struct GasRates {
    pub rates: GasRateSet,
}

#[derive(Deserialize)]
pub struct GasRateSet {
    #[serde(rename = "usageDependentGasRates")]
    pub usage_dependent: UsageDependentGasRates,
}

#[serde_as]
#[derive(Deserialize)]
pub struct UsageDependentGasRates {
    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default, rename = "allInDeliveryIncludingVat")]
    pub delivery: Option<CubicMeterPrice>,
}
