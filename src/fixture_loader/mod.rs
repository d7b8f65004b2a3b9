mod data_format_deserializer;
mod factory;
mod interface_type_deserializer;
mod loader;
mod scalar_deserializer;
pub(in crate::fixture_loader) mod serialized_fixture;
mod template_deserializer;
mod value_deserializer;

pub use factory::{FixtureFactoryError, from_yaml};
pub use loader::{LoaderError, load_fixture, load_fixtures_from};
