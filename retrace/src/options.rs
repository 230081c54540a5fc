/// The default upper bound for the length of a line that is tokenized.
pub const DEFAULT_MAX_LINE_LEN: usize = 8 * 1024;

/// Options for a [`Retracer`](crate::Retracer).
///
/// By default, line numbers of classes with a scrambling salt are unscrambled and file names of
/// resolved frames are replaced by the source file of the original outermost class.
///
/// # Examples
///
/// ```
/// use retrace::RetraceOptions;
///
/// let options = RetraceOptions::new()
///     .descramble_lines(false)
///     .max_line_len(1024);
///
/// assert!(!options.descrambles_lines());
/// assert!(options.synthesizes_file_names());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetraceOptions {
    max_line_len: usize,
    descramble_lines: bool,
    synthesize_file_names: bool,
}

impl RetraceOptions {
    /// Options with all features enabled.
    pub const fn new() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            descramble_lines: true,
            synthesize_file_names: true,
        }
    }

    /// Sets the length in bytes above which lines are passed through without translation.
    pub const fn max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Determines whether scrambled line numbers are restored.
    pub const fn descramble_lines(mut self, descramble_lines: bool) -> Self {
        self.descramble_lines = descramble_lines;
        self
    }

    /// Determines whether file names of resolved frames are replaced.
    pub const fn synthesize_file_names(mut self, synthesize_file_names: bool) -> Self {
        self.synthesize_file_names = synthesize_file_names;
        self
    }

    /// The length in bytes above which lines are passed through.
    pub const fn line_len_limit(&self) -> usize {
        self.max_line_len
    }

    /// Whether scrambled line numbers are restored.
    pub const fn descrambles_lines(&self) -> bool {
        self.descramble_lines
    }

    /// Whether file names of resolved frames are replaced.
    pub const fn synthesizes_file_names(&self) -> bool {
        self.synthesize_file_names
    }
}

impl Default for RetraceOptions {
    fn default() -> Self {
        Self::new()
    }
}
