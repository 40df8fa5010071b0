use std::ops::{BitOr, BitOrAssign};

/// Width of [`CpuMask`]; the registry refuses to configure more processors than this.
pub const MAX_CPUS: usize = 64;

/// Set of processors, one bit per processor index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CpuMask(u64);

impl CpuMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// The wake bit of a single processor.
    pub fn bit(cpu: usize) -> Self {
        debug_assert!(cpu < MAX_CPUS, "cpu index {cpu} out of range");
        Self(1u64 << cpu)
    }

    pub fn insert(&mut self, cpu: usize) {
        *self |= Self::bit(cpu);
    }

    pub fn contains(self, cpu: usize) -> bool {
        cpu < MAX_CPUS && self.0 & (1u64 << cpu) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Processor indices in ascending order.
    pub fn iter(self) -> CpuMaskIter {
        CpuMaskIter(self.0)
    }
}

impl BitOr for CpuMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CpuMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<usize> for CpuMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for cpu in iter {
            mask.insert(cpu);
        }
        mask
    }
}

impl IntoIterator for CpuMask {
    type Item = usize;
    type IntoIter = CpuMaskIter;

    fn into_iter(self) -> CpuMaskIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct CpuMaskIter(u64);

impl Iterator for CpuMaskIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let cpu = self.0.trailing_zeros() as usize;
        // Clear lowest set bit.
        self.0 &= self.0 - 1;
        Some(cpu)
    }
}
