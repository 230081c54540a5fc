const MULTIPLIER: i64 = 0x5_DEEC_E66D;
const ADDEND: i64 = 0xB;
const MASK: i64 = (1 << 48) - 1;

/// A pseudo-random number generator producing the same sequence as `java.util.Random`.
///
/// The generator is a 48-bit linear congruential generator. Every step computes
/// `state = (state * 0x5DEECE66D + 0xB) mod 2^48` and hands out the topmost bits of the new state.
/// All arithmetic intentionally follows the overflow behavior of the JVM, since the line number
/// tables built on top of it have to match the obfuscator bit for bit.
///
/// # Examples
///
/// ```
/// use retrace_scramble::JavaRandom;
///
/// let mut random = JavaRandom::new(42);
/// assert_eq!(random.next_i32(), -1170105035);
/// ```
#[derive(Clone, Debug)]
pub struct JavaRandom {
    state: i64,
}

impl JavaRandom {
    /// Creates a new generator from the given seed.
    ///
    /// The JVM takes a `long` seed. Callers holding a 32-bit seed must sign-extend it, which is
    /// what `i64::from` does.
    pub fn new(seed: i64) -> Self {
        Self {
            state: (seed ^ MULTIPLIER) & MASK,
        }
    }

    /// Advances the generator and returns the topmost `bits` bits of the new state.
    ///
    /// `bits` must be in the range `1..=32`. For `bits == 32` the result covers the full `i32`
    /// range, otherwise it is non-negative.
    pub fn next_bits(&mut self, bits: u32) -> i32 {
        debug_assert!((1..=32).contains(&bits));
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(ADDEND)
            & MASK;
        (self.state >> (48 - bits)) as i32
    }

    /// Returns the next uniformly distributed `i32`, like `Random.nextInt()`.
    pub fn next_i32(&mut self) -> i32 {
        self.next_bits(32)
    }

    /// Returns the next value in `0..bound`, like `Random.nextInt(bound)`.
    ///
    /// Powers of two take the high bits of a single draw. Every other bound uses rejection
    /// sampling, and the rejection test has to overflow exactly like 32-bit signed arithmetic on
    /// the JVM for the sequence to stay in sync.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is not positive.
    pub fn next_int(&mut self, bound: i32) -> i32 {
        assert!(bound > 0, "bound must be positive");

        if bound & bound.wrapping_neg() == bound {
            return ((i64::from(bound) * i64::from(self.next_bits(31))) >> 31) as i32;
        }

        loop {
            let bits = self.next_bits(31);
            let val = bits % bound;
            if bits.wrapping_sub(val).wrapping_add(bound - 1) >= 0 {
                return val;
            }
        }
    }
}
