//! Completion tokens and completion entries.
//!
//! A `Token` is the only link between a submitted ring entry and the cell
//! that receives its result. It is an index into the reactor's slot table,
//! carried through the kernel in the entry's `user_data` field, never a
//! pointer: routing a completion is a checked table lookup rather than a
//! type reinterpretation.

/// Slot-table index identifying the cell a completion resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Token(pub u64);

impl Token {
    #[inline]
    pub fn from_slot(slot: u32) -> Self {
        Self(slot as u64)
    }

    #[inline]
    pub fn slot(self) -> u32 {
        self.0 as u32
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One retrieved ring completion: the submission's token plus the signed
/// result (return value, or negative errno).
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub token: Token,
    pub result: i32,
}
