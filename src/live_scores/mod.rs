pub mod fotmob;
pub mod provider;

pub use fotmob::FotMob;
pub use provider::FixtureSource;
