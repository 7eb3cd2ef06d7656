use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    api::models::Profile,
    sensor::{SensorSet, SensorState},
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

pub fn build_sensors_table(sensors: &SensorSet) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Entity", "Name", "State", "Unit", "Date"]);
    for sensor in sensors.iter() {
        table.add_row(vec![
            Cell::new(sensor.entity_id()).add_attribute(Attribute::Dim),
            Cell::new(&sensor.name),
            Cell::new(sensor.state).set_alignment(CellAlignment::Right).fg(match sensor.state {
                SensorState::Available(_) => Color::Green,
                SensorState::Unavailable => Color::DarkYellow,
                SensorState::Unknown => Color::Red,
            }),
            Cell::new(sensor.kind.unit()),
            Cell::new(sensor.measurement_date.map(|date| date.to_string()).unwrap_or_default()),
        ]);
    }
    table
}

pub fn build_profiles_table(profiles: &[Profile]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Customer number", "Agreement ID", "Address", "Status"]);
    for profile in profiles {
        table.add_row(vec![
            Cell::new(profile.customer_number).set_alignment(CellAlignment::Right),
            Cell::new(profile.agreement_id).set_alignment(CellAlignment::Right),
            Cell::new(profile.address()),
            Cell::new(profile.energy_supply_status.as_deref().unwrap_or_default())
                .add_attribute(Attribute::Dim),
        ]);
    }
    table
}
