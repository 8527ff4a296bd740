//! Signal identifiers and the reserved signal space.
//!
//! The 16-bit signal space is split into three regions:
//!
//! | Range        | Use                                                  |
//! |--------------|------------------------------------------------------|
//! | `0..4`       | Pseudo-signals delivered by the HSM engine only       |
//! | `4..1000`    | Module-local signals, private to one EPA              |
//! | `1000..`     | Public signals, partitioned per module by [`SignalRange`] |
//!
//! Local signals of different EPAs may share values; public ranges may not.

use core::fmt;

/// Event signal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signal(pub u16);

impl Signal {
    /// Initial transition of a state.
    pub const INIT: Signal = Signal(0);
    /// A state is being entered.
    pub const ENTRY: Signal = Signal(1);
    /// A state is being exited.
    pub const EXIT: Signal = Signal(2);
    /// Reserved for superstate discovery.
    pub const SUPER: Signal = Signal(3);
    /// First module-local signal.
    pub const LOCAL: Signal = Signal(4);
    /// First public signal.
    pub const USER: Signal = Signal(1000);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Module-local signal `offset` positions after [`Signal::LOCAL`].
    pub const fn local(offset: u16) -> Self {
        Self(Self::LOCAL.0 + offset)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_pseudo(self) -> bool {
        self.0 < Self::LOCAL.0
    }

    pub const fn is_local(self) -> bool {
        self.0 >= Self::LOCAL.0 && self.0 < Self::USER.0
    }

    pub const fn is_public(self) -> bool {
        self.0 >= Self::USER.0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INIT => f.write_str("INIT"),
            Self::ENTRY => f.write_str("ENTRY"),
            Self::EXIT => f.write_str("EXIT"),
            Self::SUPER => f.write_str("SUPER"),
            Self(raw) => write!(f, "SIG({raw:#06x})"),
        }
    }
}

impl From<u16> for Signal {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Block of public signals owned by one module.
///
/// Ranges are declared as constants next to the module that publishes them
/// and handed to [`KernelBuilder::reserve`](crate::KernelBuilder::reserve),
/// which rejects ranges that overlap or reach into the private space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SignalRange {
    pub name: &'static str,
    pub base: u16,
    pub len: u16,
}

impl SignalRange {
    pub const fn new(name: &'static str, base: u16, len: u16) -> Self {
        Self { name, base, len }
    }

    /// Signal at `offset` within the range.
    ///
    /// Offsets past `len` yield signals the range does not own; callers keep
    /// offsets in bounds by declaring them as constants.
    pub const fn signal(&self, offset: u16) -> Signal {
        Signal(self.base.wrapping_add(offset))
    }

    /// One past the last signal of the range, `None` on overflow.
    pub const fn end(&self) -> Option<u16> {
        self.base.checked_add(self.len)
    }

    pub fn contains(&self, signal: Signal) -> bool {
        match self.end() {
            Some(end) => signal.0 >= self.base && signal.0 < end,
            None => false,
        }
    }

    pub fn overlaps(&self, other: &SignalRange) -> bool {
        match (self.end(), other.end()) {
            (Some(a_end), Some(b_end)) => self.base < b_end && other.base < a_end,
            _ => true,
        }
    }

    /// Public, non-empty and not wrapping past `u16::MAX`.
    pub fn is_well_formed(&self) -> bool {
        self.len > 0 && self.base >= Signal::USER.0 && self.end().is_some()
    }
}

impl fmt::Display for SignalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}..{}]",
            self.name,
            self.base,
            u32::from(self.base) + u32::from(self.len)
        )
    }
}
