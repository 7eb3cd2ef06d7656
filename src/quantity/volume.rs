quantity!(
    /// Gas volume.
    CubicMeters, suffix: "m³"
);
