//! Generic register abstractions for type-safe MSR programming

/// Trait for register layouts that can be converted to/from raw MSR values
///
/// Every CHA register written by the agent goes through one of these layouts,
/// so the bit positions live in exactly one place per register.
///
/// # Example
///
/// ```
/// use chaslice_raw::RegisterLayout;
///
/// #[derive(Debug, Default)]
/// struct GlobalFreeze {
///     freeze: bool,
/// }
///
/// impl RegisterLayout for GlobalFreeze {
///     fn to_msr_value(&self) -> u64 {
///         if self.freeze { 1 << 63 } else { 0 }
///     }
///
///     fn from_msr_value(value: u64) -> Self {
///         Self { freeze: value & (1 << 63) != 0 }
///     }
/// }
///
/// assert_eq!(GlobalFreeze { freeze: true }.to_msr_value(), 1 << 63);
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this register layout to a raw MSR value
    fn to_msr_value(&self) -> u64;

    /// Parse a raw MSR value into this register layout
    fn from_msr_value(value: u64) -> Self;

    /// Validate that the register values are within acceptable ranges
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// A hardware register with address and typed layout
///
/// Pairs the address produced by a [`ChaProfile`](crate::arch::ChaProfile)
/// with the value to be written there.
#[derive(Debug, Clone, Copy)]
pub struct Register<T: RegisterLayout> {
    /// MSR address
    pub address: u64,
    /// Typed register layout
    pub layout: T,
}

impl<T: RegisterLayout> Register<T> {
    /// Create a new register with the given address and layout
    pub fn new(address: u64, layout: T) -> Self {
        Self { address, layout }
    }

    /// Create a register with default layout
    pub fn with_address(address: u64) -> Self
    where
        T: Default,
    {
        Self {
            address,
            layout: T::default(),
        }
    }

    /// Validate the register layout
    pub fn validate(&self) -> Result<(), &'static str> {
        self.layout.validate()
    }

    /// Get the MSR value for this register
    pub fn to_msr_value(&self) -> u64 {
        self.layout.to_msr_value()
    }

    /// Update the layout from an MSR value
    pub fn from_msr_value(&mut self, value: u64) {
        self.layout = T::from_msr_value(value);
    }
}
