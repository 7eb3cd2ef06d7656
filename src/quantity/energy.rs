quantity!(KilowattHours, suffix: "kWh");
