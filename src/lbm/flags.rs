//! Cell flags: one primary state plus transient transition markers

use bitflags::bitflags;

bitflags! {
    /// Per-cell state bitmask as stored in the flag buffers
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct CellFlags: u8 {
        const OBSTACLE = 1 << 0;
        const FLUID = 1 << 1;
        const INTERFACE = 1 << 2;
        const GAS = 1 << 3;

        /// Interface cell that filled up this step
        const INTERFACE_TO_FLUID = 1 << 4;
        /// Interface cell that emptied this step
        const INTERFACE_TO_GAS = 1 << 5;
        /// Gas cell that must become interface at the end of this step
        const GAS_TO_INTERFACE = 1 << 6;

        const PRIMARY = Self::OBSTACLE.bits()
            | Self::FLUID.bits()
            | Self::INTERFACE.bits()
            | Self::GAS.bits();
        const TRANSIENT = Self::INTERFACE_TO_FLUID.bits()
            | Self::INTERFACE_TO_GAS.bits()
            | Self::GAS_TO_INTERFACE.bits();
    }
}

impl Default for CellFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl CellFlags {
    /// Decode a raw buffer value, keeping unknown bits so validation can see them
    #[inline]
    pub fn from_raw(raw: u8) -> Self {
        Self::from_bits_retain(raw)
    }

    #[inline]
    pub fn raw(self) -> u8 {
        self.bits()
    }

    /// Primary state bits only
    #[inline]
    pub fn primary(self) -> Self {
        self & Self::PRIMARY
    }

    /// Replace the primary state, keeping transient bits
    #[inline]
    pub fn with_primary(self, primary: Self) -> Self {
        (self - Self::PRIMARY) | primary.primary()
    }

    /// Exactly one primary bit set
    #[inline]
    pub fn has_single_primary(self) -> bool {
        self.primary().bits().count_ones() == 1
    }

    #[inline]
    pub fn is_obstacle(self) -> bool {
        self.contains(Self::OBSTACLE)
    }

    #[inline]
    pub fn is_fluid(self) -> bool {
        self.contains(Self::FLUID)
    }

    #[inline]
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    #[inline]
    pub fn is_gas(self) -> bool {
        self.contains(Self::GAS)
    }

    /// Fluid or interface: cells that carry mass and evolve distributions
    #[inline]
    pub fn is_liquid(self) -> bool {
        self.intersects(Self::FLUID | Self::INTERFACE)
    }

    /// Gas or obstacle: cells whose distributions are never streamed from
    #[inline]
    pub fn is_gas_or_obstacle(self) -> bool {
        self.intersects(Self::GAS | Self::OBSTACLE)
    }

    /// Filled or emptied this step
    #[inline]
    pub fn is_converting(self) -> bool {
        self.intersects(Self::INTERFACE_TO_FLUID | Self::INTERFACE_TO_GAS)
    }
}
