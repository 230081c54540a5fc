use crate::random::JavaRandom;

/// The size of the line number table used by the obfuscator.
///
/// This value is shared with the obfuscator. Changing it produces tables that no longer match
/// previously obfuscated classes.
pub const SCRAMBLE_TABLE_SIZE: usize = 3584;

const SHUFFLE_ROUNDS: usize = 10;

/// Computes the `String.hashCode()` of the given string.
///
/// The hash is the rolling `h = 31 * h + c` over the UTF-16 code units of the string, wrapped to
/// a signed 32-bit integer.
///
/// # Examples
///
/// ```
/// use retrace_scramble::java_string_hash;
///
/// assert_eq!(java_string_hash("hello"), 99162322);
/// assert_eq!(java_string_hash(""), 0);
/// ```
pub fn java_string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Computes the table seed for a class from its scrambling salt.
///
/// `class_name` is the original, fully qualified name of the class. Inner class separators (`$`)
/// are hashed as dots.
pub fn class_seed(salt: i32, class_name: &str) -> i32 {
    salt ^ java_string_hash(&class_name.replace('$', "."))
}

/// A bijective mapping between original and obfuscated line numbers.
///
/// The table is built from the identity permutation by ten rounds of swaps driven by a
/// [`JavaRandom`]. The forward and inverse tables are updated together and remain mutual inverses
/// throughout construction.
///
/// Line numbers past the end of the table wrap around: the table tiles the number space in blocks
/// of `size` lines.
#[derive(Clone, Debug)]
pub struct LineScrambler {
    forward: Vec<u32>,
    inverse: Vec<u32>,
}

impl LineScrambler {
    /// Builds the permutation table of the given size for the given seed.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or does not fit into an `i32`.
    pub fn new(size: usize, seed: i64) -> Self {
        assert!(size > 0, "scrambling table must not be empty");
        let bound = i32::try_from(size).expect("scrambling table too large");

        let mut forward: Vec<u32> = (0..size as u32).collect();
        let mut inverse = forward.clone();

        let mut random = JavaRandom::new(seed);
        for _ in 0..SHUFFLE_ROUNDS {
            for j in 0..size {
                let other = random.next_int(bound) as usize;
                if other == j {
                    continue;
                }

                let pos1 = forward[j] as usize;
                let pos2 = forward[other] as usize;
                inverse.swap(pos1, pos2);

                forward[j] = pos2 as u32;
                forward[other] = pos1 as u32;
            }
        }

        Self { forward, inverse }
    }

    /// Returns the number of entries in the table.
    pub fn size(&self) -> usize {
        self.forward.len()
    }

    /// Maps an original line number to the one the obfuscator writes.
    pub fn scramble(&self, line: u32) -> u32 {
        lookup(&self.forward, line)
    }

    /// Maps an obfuscated line number back to the original line number.
    pub fn unscramble(&self, line: u32) -> u32 {
        lookup(&self.inverse, line)
    }

    /// Returns the forward table, mapping original to obfuscated lines.
    pub fn forward(&self) -> &[u32] {
        &self.forward
    }

    /// Returns the inverse table, mapping obfuscated to original lines.
    pub fn inverse(&self) -> &[u32] {
        &self.inverse
    }
}

fn lookup(table: &[u32], line: u32) -> u32 {
    let size = table.len() as u32;
    if line < size {
        table[line as usize]
    } else {
        (line / size * size).saturating_add(table[(line % size) as usize])
    }
}
