#[macro_use]
mod macros;

pub mod energy;
pub mod price;
pub mod volume;

/// Plain number to hand over to an entity store.
pub trait Value {
    fn value(self) -> f64;
}
