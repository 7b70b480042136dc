pub trait BitVecMut {
    fn set(&mut self, index: usize);
    fn unset(&mut self, index: usize);
}

pub trait BitVec {
    fn is_set(&self, index: usize) -> bool;
}

/// Number of bytes needed to hold `bits` bits.
pub fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

impl BitVecMut for [u8] {
    fn set(&mut self, index: usize) {
        self[index >> 3] |= 1 << (index as u8 & 7)
    }

    fn unset(&mut self, index: usize) {
        self[index >> 3] &= 0xff ^ (1 << (index as u8 & 7));
    }
}

impl BitVec for [u8] {
    fn is_set(&self, index: usize) -> bool {
        let slot = index >> 3;
        slot < self.len() && self[slot] & (1 << (index as u8 & 7)) > 0
    }
}
