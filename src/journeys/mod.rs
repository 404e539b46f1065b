//! Built-in journeys.

pub mod greeting;
pub mod lotus;

pub use greeting::{Greeting, GreetingConfig};
pub use lotus::{Lotus, LotusConfig};

use crate::registry::Registry;

/// A registry holding every built-in journey.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register::<Greeting>();
    registry.register::<Lotus>();
    registry
}
