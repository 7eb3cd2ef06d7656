quantity!(
    /// All-in delivery price including VAT.
    KilowattHourPrice, suffix: "€/kWh"
);

quantity!(CubicMeterPrice, suffix: "€/m³");
