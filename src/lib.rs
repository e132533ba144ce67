//! Polling and decoding of Alsavo Pro pool heat pump controllers.
//!
//! A [`coordinator::Coordinator`] polls a [`client::HeaterClient`] on a fixed cadence and
//! publishes immutable [`snapshot::DeviceSnapshot`]s. The [`sensor`] and [`climate`] facades read
//! those snapshots through the [`registers`] decoder and the [`modes`] mapper.

pub mod alarms;
pub mod client;
pub mod climate;
pub mod commands;
pub mod coordinator;
pub mod dump;
pub mod modes;
pub mod output;
pub mod registers;
pub mod sensor;
pub mod snapshot;
