//! Adapter-side NAND logic.
//!
//! Everything the microcontroller does, written against the [`pins::NandPins`]
//! seam so the same engine drives real GPIO on the adapter, and the pin-level
//! [`sim::SimulatedChip`] in tests and the built-in `sim` port.

pub mod bus;
pub mod engine;
pub mod pins;
pub mod sim;

pub use bus::NandBus;
pub use engine::DeviceEngine;
pub use pins::NandPins;
pub use sim::SimulatedChip;
