//! Host-visible Micro4 CPU snapshot exchanged with the CPU service.

/// Number of addressable nibbles in Micro4 memory.
pub const MEMORY_NIBBLES: usize = 256;

/// Runtime memory address as used by the source map, breakpoints, and PC.
pub type Address = u16;

/// 1-indexed line number in the editor buffer.
pub type LineNumber = usize;

/// Complete CPU snapshot produced by the CPU service on load/step/tick/restore.
///
/// `Clone` copies the memory buffer, so a captured snapshot never observes
/// later writes made by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuState {
    /// Address of the next instruction to execute.
    pub program_counter: Address,
    /// Accumulator (4-bit value stored in the low nibble).
    pub accumulator: u8,
    /// Zero flag.
    pub zero_flag: bool,
    /// CPU executed `HLT` (or stopped on an error).
    pub halted: bool,
    /// CPU stopped on an execution error.
    pub error_flag: bool,
    /// Human-readable error text when `error_flag` is set.
    pub error_message: Option<String>,
    /// Flat nibble memory image.
    pub memory: Box<[u8]>,
    /// Last fetched instruction.
    pub instruction_register: u8,
    /// Last memory address accessed.
    pub memory_address_register: u8,
    /// Last data read from or written to memory.
    pub memory_data_register: u8,
    /// Total clock cycles executed since load/reset.
    pub cycle_count: u64,
    /// Total instructions retired since load/reset.
    pub instruction_count: u64,
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            program_counter: 0,
            accumulator: 0,
            zero_flag: false,
            halted: false,
            error_flag: false,
            error_message: None,
            memory: vec![0; MEMORY_NIBBLES].into_boxed_slice(),
            instruction_register: 0,
            memory_address_register: 0,
            memory_data_register: 0,
            cycle_count: 0,
            instruction_count: 0,
        }
    }
}

impl CpuState {
    /// Creates a power-on snapshot with `program` copied to address 0.
    ///
    /// Nibbles beyond [`MEMORY_NIBBLES`] are ignored.
    #[must_use]
    pub fn with_program(program: &[u8]) -> Self {
        let mut state = Self::default();
        for (slot, nibble) in state.memory.iter_mut().zip(program) {
            *slot = nibble & 0x0F;
        }
        state
    }

    /// Returns `true` when the snapshot reports a terminal condition.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.halted || self.error_flag
    }

    /// Reads one nibble, returning `None` outside the memory image.
    #[must_use]
    pub fn nibble(&self, address: Address) -> Option<u8> {
        self.memory.get(usize::from(address)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::{CpuState, MEMORY_NIBBLES};

    #[test]
    fn default_state_allocates_full_memory_image() {
        let state = CpuState::default();
        assert_eq!(state.memory.len(), MEMORY_NIBBLES);
        assert_eq!(state.program_counter, 0);
        assert!(!state.is_stopped());
    }

    #[test]
    fn with_program_masks_to_nibbles() {
        let state = CpuState::with_program(&[0x71, 0x2F, 0x0]);
        assert_eq!(state.nibble(0), Some(0x1));
        assert_eq!(state.nibble(1), Some(0xF));
        assert_eq!(state.nibble(2), Some(0x0));
        assert_eq!(state.nibble(300), None);
    }

    #[test]
    fn clone_does_not_share_memory() {
        let original = CpuState::with_program(&[1, 2, 3]);
        let mut copy = original.clone();
        copy.memory[0] = 9;

        assert_eq!(original.memory[0], 1);
        assert_eq!(copy.memory[0], 9);
    }

    #[test]
    fn halted_or_error_counts_as_stopped() {
        let halted = CpuState {
            halted: true,
            ..CpuState::default()
        };
        let faulted = CpuState {
            error_flag: true,
            ..CpuState::default()
        };
        assert!(halted.is_stopped());
        assert!(faulted.is_stopped());
    }
}
