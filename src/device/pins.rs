//! Pin-level interface to the NAND bus.
//!
//! Eight bidirectional data lines, five control outputs (CLE, ALE, CE#, RE#,
//! WE#), one input (R/B#). CE#, RE#, WE# are active low; the levels passed
//! here are the electrical ones, not the logical ones.

/// The adapter board's connection to the NAND chip.
///
/// Implementations: the Pico GPIO bank on real hardware, and
/// [`crate::device::sim::SimulatedChip`] for everything else.
pub trait NandPins: Send {
    fn set_cle(&mut self, high: bool);
    fn set_ale(&mut self, high: bool);
    fn set_ce(&mut self, high: bool);
    fn set_re(&mut self, high: bool);
    fn set_we(&mut self, high: bool);

    /// Switch the data lines to output (drive) mode.
    fn io_output(&mut self);
    /// Switch the data lines to input mode with pull-ups.
    fn io_input(&mut self);
    /// Present `byte` on the data lines (output mode).
    fn io_write(&mut self, byte: u8);
    /// Sample the data lines (input mode).
    fn io_read(&mut self) -> u8;

    /// Level of R/B#: true = ready.
    fn ready(&mut self) -> bool;

    /// Busy-wait for at least `ns` nanoseconds.
    fn delay_ns(&mut self, ns: u32);

    /// Raw 16-bit ADC sample of VSYS/3, for supply monitoring.
    fn read_vsys_raw(&mut self) -> u16;
}
