//! Timed lyric parsing and active-line lookup.

/// A single line of lyrics with its start offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    /// Offset from the start of the track in milliseconds
    pub time_offset_ms: u64,
    pub text: String,
}

impl LyricLine {
    pub fn new(time_offset_ms: u64, text: impl Into<String>) -> Self {
        Self {
            time_offset_ms,
            text: text.into(),
        }
    }
}

/// Parse synced lyric text in `[mm:ss.xx] text` format.
///
/// Lines without a timestamp (blank lines, ID tags such as `[ar:Artist]`,
/// `[mm:ss]` without a fraction) are dropped. The remaining lines keep
/// their input order; they are not sorted.
#[must_use]
pub fn parse(raw: &str) -> Vec<LyricLine> {
    raw.lines().filter_map(parse_line).collect()
}

/// Index of the last line whose offset is at or before `progress_ms`.
///
/// Scans backwards, so the result is well defined even when the input is
/// not ordered. Returns `None` when progress precedes every line or there
/// are no lines.
#[must_use]
pub fn active_index(lines: &[LyricLine], progress_ms: u64) -> Option<usize> {
    lines
        .iter()
        .rposition(|line| line.time_offset_ms <= progress_ms)
}

/// Parsed synced lyrics with a fast lookup path for ordered input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedLyrics {
    lines: Vec<LyricLine>,
    monotonic: bool,
}

impl SyncedLyrics {
    /// Parse raw synced lyric text
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::from_lines(parse(raw))
    }

    #[must_use]
    pub fn from_lines(lines: Vec<LyricLine>) -> Self {
        let monotonic = lines
            .windows(2)
            .all(|pair| pair[0].time_offset_ms <= pair[1].time_offset_ms);
        Self { lines, monotonic }
    }

    #[must_use]
    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether line offsets never decrease
    #[must_use]
    pub const fn is_monotonic(&self) -> bool {
        self.monotonic
    }

    /// Active line index at `progress_ms`.
    ///
    /// Binary search on ordered input, backward scan otherwise; both give
    /// the same answer as [`active_index`].
    #[must_use]
    pub fn active_index(&self, progress_ms: u64) -> Option<usize> {
        if !self.monotonic {
            return active_index(&self.lines, progress_ms);
        }

        let after = self
            .lines
            .partition_point(|line| line.time_offset_ms <= progress_ms);
        after.checked_sub(1)
    }

    /// Active line at `progress_ms`
    #[must_use]
    pub fn active_line(&self, progress_ms: u64) -> Option<&LyricLine> {
        self.active_index(progress_ms).and_then(|i| self.lines.get(i))
    }
}

/// Find the first `[m:ss.f]` on the line and return it with the text after it
fn parse_line(line: &str) -> Option<LyricLine> {
    let mut search_from = 0;
    while let Some(found) = line[search_from..].find('[') {
        let open = search_from + found;
        if let Some((time_offset_ms, consumed)) = parse_timestamp(&line[open + 1..]) {
            let text = line[open + 1 + consumed..].trim_start();
            return Some(LyricLine::new(time_offset_ms, text));
        }
        search_from = open + 1;
    }
    None
}

/// Parse `digits:digits.digits]` at the start of `s`.
///
/// Returns the offset in milliseconds and the number of bytes consumed,
/// including the closing bracket. Fraction digits past the millisecond are
/// truncated.
fn parse_timestamp(s: &str) -> Option<(u64, usize)> {
    let bytes = s.as_bytes();
    let mut pos = 0;

    let minutes = take_digits(bytes, &mut pos)?;
    expect_byte(bytes, &mut pos, b':')?;
    let seconds = take_digits(bytes, &mut pos)?;
    expect_byte(bytes, &mut pos, b'.')?;
    let fraction_start = pos;
    take_digits(bytes, &mut pos)?;
    let fraction = &bytes[fraction_start..pos];
    expect_byte(bytes, &mut pos, b']')?;

    let minutes: u64 = digits_value(minutes)?;
    let seconds: u64 = digits_value(seconds)?;
    let fraction_ms = fraction_millis(fraction);

    let offset = minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1_000)?)?
        .checked_add(fraction_ms)?;

    Some((offset, pos))
}

fn take_digits<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    while bytes.get(*pos).is_some_and(u8::is_ascii_digit) {
        *pos += 1;
    }
    (*pos > start).then(|| &bytes[start..*pos])
}

fn expect_byte(bytes: &[u8], pos: &mut usize, expected: u8) -> Option<()> {
    if bytes.get(*pos) == Some(&expected) {
        *pos += 1;
        Some(())
    } else {
        None
    }
}

fn digits_value(digits: &[u8]) -> Option<u64> {
    digits.iter().try_fold(0_u64, |acc, d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    })
}

/// Convert fractional-second digits to milliseconds ("5" -> 500, "05" -> 50)
fn fraction_millis(fraction: &[u8]) -> u64 {
    let mut millis = 0;
    for i in 0..3 {
        let digit = fraction.get(i).map_or(0, |d| u64::from(d - b'0'));
        millis = millis * 10 + digit;
    }
    millis
}
