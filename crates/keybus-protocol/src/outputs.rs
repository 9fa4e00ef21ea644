use keybus_core::constants::{LIGHT_OUTPUT_BIT, MEANINGFUL_OUTPUT_BITS};
use serde::{Deserialize, Serialize};

/// Relay output state sent with `SetOutputs`.
///
/// Bits the controller ignores are masked off on construction, so the value
/// put on the wire only ever carries bits 2, 3, 4 and 6.
///
/// ```
/// use keybus_protocol::OutputBits;
///
/// assert_eq!(OutputBits::new(0xFF).bits(), 0b0101_1100);
/// assert!(OutputBits::light(true).is_light_on());
/// assert_eq!(OutputBits::light(false).bits(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputBits(u8);

impl OutputBits {
    pub const NONE: OutputBits = OutputBits(0);

    pub fn new(bits: u8) -> Self {
        OutputBits(bits & MEANINGFUL_OUTPUT_BITS)
    }

    /// Outputs with only the light contact driven as requested.
    pub fn light(on: bool) -> Self {
        if on {
            OutputBits(LIGHT_OUTPUT_BIT)
        } else {
            Self::NONE
        }
    }

    pub fn with_light(self, on: bool) -> Self {
        if on {
            OutputBits(self.0 | LIGHT_OUTPUT_BIT)
        } else {
            OutputBits(self.0 & !LIGHT_OUTPUT_BIT)
        }
    }

    pub fn is_light_on(self) -> bool {
        self.0 & LIGHT_OUTPUT_BIT != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}
