//! yEnc codec filter.
//!
//! Implements the Usenet yEncoding: encode adds 42 to each byte modulo 256
//! and escapes the handful of transformed values that would upset NNTP
//! transport (`NUL`, `TAB`, `LF`, `CR`, `=`) as `=` followed by the byte
//! plus 64, wrapping output lines at 128 encoded units. Decode scans for
//! the `=ybegin ` (and optional `=ypart `) marker lines before reversing
//! the transform, and stops at the `=yend` trailer. Two CRC-32
//! accumulators run alongside: one per part, one across all parts of a
//! multi-part transfer.

use crc32fast::Hasher;

use crate::filter::{Filter, FilterBuffer, FilterOutput};

/// Whether a [`YencFilter`] encodes or decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YencMode {
    /// Binary to escaped 7-bit text.
    Encode,
    /// Escaped text back to binary.
    Decode,
}

/// Decoder state flags.
///
/// The marker-detection flags are monotonic: once [`DecodeState::DECODE`]
/// is set it is only ever cleared by [`Filter::reset`], and
/// [`DecodeState::END`] is terminal for the stream. The flag values are
/// stable so a multi-part download can resume decoding of a later part
/// without re-scanning headers:
///
/// ```ignore
/// yenc.set_decode_state(DecodeState::BEGIN | DecodeState::PART | DecodeState::DECODE);
/// yenc.set_total_crc(previous_part_total);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeState(u32);

impl DecodeState {
    /// Initial state: no marker line seen yet.
    pub const INIT: Self = Self(0);
    /// The previous byte was a line terminator.
    pub const EOLN: Self = Self(1 << 0);
    /// The previous byte opened an `=` escape sequence.
    pub const ESCAPE: Self = Self(1 << 1);
    /// The `=ybegin ` marker line has been consumed.
    pub const BEGIN: Self = Self(1 << 3);
    /// An `=ypart ` marker line has been consumed.
    pub const PART: Self = Self(1 << 4);
    /// Body decoding is active.
    pub const DECODE: Self = Self(1 << 5);
    /// The `=yend` trailer has been reached; no further output.
    pub const END: Self = Self(1 << 6);

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Reconstructs a state from raw flag bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether all flags in `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for DecodeState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

const YBEGIN_MARKER: &[u8] = b"=ybegin ";
const YPART_MARKER: &[u8] = b"=ypart ";

/// Streaming yEnc encoder/decoder filter.
pub struct YencFilter {
    mode: YencMode,
    state: DecodeState,
    /// Encoded units already emitted on the current output line.
    line: usize,
    pcrc: Hasher,
    crc: Hasher,
    core: FilterBuffer,
}

impl YencFilter {
    /// Creates a new yEnc filter in the given mode.
    #[must_use]
    pub fn new(mode: YencMode) -> Self {
        Self {
            mode,
            state: DecodeState::INIT,
            line: 0,
            pcrc: Hasher::new(),
            crc: Hasher::new(),
            core: FilterBuffer::new(),
        }
    }

    /// The filter's fixed encode/decode mode.
    #[must_use]
    pub const fn mode(&self) -> YencMode {
        self.mode
    }

    /// Current decoder state flags.
    #[must_use]
    pub const fn decode_state(&self) -> DecodeState {
        self.state
    }

    /// Overrides the decoder state, typically to resume a later part of a
    /// multi-part transfer without re-scanning the marker lines.
    pub fn set_decode_state(&mut self, state: DecodeState) {
        self.state = state;
    }

    /// Finalized CRC-32 of the current part.
    #[must_use]
    pub fn part_crc(&self) -> u32 {
        self.pcrc.clone().finalize()
    }

    /// Finalized CRC-32 across all parts processed so far.
    #[must_use]
    pub fn total_crc(&self) -> u32 {
        self.crc.clone().finalize()
    }

    /// Seeds the stream-level accumulator with the finalized CRC-32 of the
    /// parts already processed, for resuming a multi-part transfer.
    pub fn set_total_crc(&mut self, crc: u32) {
        self.crc = Hasher::new_with_initial(crc);
    }

    /// Encodes one chunk into the output buffer.
    fn encode_step(&mut self, input: &[u8]) {
        // Two output bytes per input byte worst case, plus one terminator
        // per 127 encoded units.
        self.core
            .ensure_capacity(input.len() * 2 + input.len() / 63 + 64, false);
        let mut line = self.line;
        let mut n = 0;
        let out = self.core.space();
        for &raw in input {
            self.pcrc.update(&[raw]);
            self.crc.update(&[raw]);

            let c = raw.wrapping_add(42);
            if matches!(c, 0x00 | 0x09 | 0x0A | 0x0D | b'=') {
                out[n] = b'=';
                out[n + 1] = c.wrapping_add(64);
                n += 2;
                line += 2;
            } else {
                out[n] = c;
                n += 1;
                line += 1;
            }

            if line >= 128 {
                out[n] = b'\n';
                n += 1;
                line = 0;
            }
        }
        self.core.advance(n);
        self.line = line;
    }

    /// Encodes the final chunk and terminates a non-empty trailing line.
    ///
    /// The CRC accumulators are intentionally left alone so a multi-part
    /// encode keeps accumulating the stream-level CRC; read them via
    /// [`YencFilter::part_crc`] / [`YencFilter::total_crc`].
    fn encode_finish(&mut self, input: &[u8]) {
        self.encode_step(input);
        if self.line != 0 {
            let len = self.core.len();
            self.core.ensure_capacity(len + 1, true);
            self.core.space()[0] = b'\n';
            self.core.advance(1);
            self.line = 0;
        }
    }

    /// Locates the `=ybegin ` and optional `=ypart ` marker lines.
    ///
    /// Returns the body remainder of the chunk once decoding may begin.
    /// A candidate marker that does not fit entirely within the current
    /// chunk is carried over and retried when the next chunk arrives; the
    /// whole marker line must be present in one contiguous view before it
    /// is consumed.
    fn scan_markers<'b>(&mut self, input: &'b [u8]) -> Option<&'b [u8]> {
        let mut pos = 0;

        if !self.state.contains(DecodeState::BEGIN) {
            loop {
                let rest = &input[pos..];
                if rest.is_empty() {
                    return None;
                }
                if rest.len() < YBEGIN_MARKER.len() {
                    // A trailing prefix of the marker may complete next
                    // chunk; any other partial line never becomes one.
                    if YBEGIN_MARKER.starts_with(rest) {
                        self.core.carry_over(rest);
                    }
                    return None;
                }
                if rest.starts_with(YBEGIN_MARKER) {
                    if let Some(nl) = rest.iter().position(|&b| b == b'\n') {
                        pos += nl + 1;
                        self.state.insert(DecodeState::BEGIN);
                        break;
                    }
                    self.core.carry_over(rest);
                    return None;
                }
                // Not a marker line; skip to the next line.
                match rest.iter().position(|&b| b == b'\n') {
                    Some(nl) => pos += nl + 1,
                    None => return None,
                }
            }
        }

        if !self.state.contains(DecodeState::DECODE) {
            let rest = &input[pos..];
            if rest.is_empty() {
                return None;
            }
            if rest.len() < YPART_MARKER.len() && YPART_MARKER.starts_with(rest) {
                self.core.carry_over(rest);
                return None;
            }
            if rest.starts_with(YPART_MARKER) {
                if let Some(nl) = rest.iter().position(|&b| b == b'\n') {
                    pos += nl + 1;
                    self.state.insert(DecodeState::PART | DecodeState::DECODE);
                } else {
                    self.core.carry_over(rest);
                    return None;
                }
            } else {
                // No =ypart line; the body starts here.
                self.state.insert(DecodeState::DECODE);
            }
        }

        Some(&input[pos..])
    }

    /// Decodes body bytes into the output buffer.
    fn decode_step(&mut self, input: &[u8]) {
        if self.state.contains(DecodeState::END) {
            return;
        }
        self.core.ensure_capacity(input.len() + 3, false);
        let mut state = self.state;
        let mut n = 0;
        let out = self.core.space();
        for &byte in input {
            let mut c = byte;

            if state.contains(DecodeState::EOLN | DecodeState::ESCAPE) {
                state.remove(DecodeState::EOLN);
                if c == b'y' {
                    // Almost certainly the start of the =yend trailer.
                    state.insert(DecodeState::END);
                    break;
                }
            }

            if c == b'\n' {
                state.insert(DecodeState::EOLN);
                continue;
            }

            if state.contains(DecodeState::ESCAPE) {
                state.remove(DecodeState::ESCAPE);
                c = c.wrapping_sub(64);
            } else if c == b'=' {
                state.insert(DecodeState::ESCAPE);
                continue;
            }

            state.remove(DecodeState::EOLN);

            c = c.wrapping_sub(42);
            out[n] = c;
            n += 1;
            self.pcrc.update(&[c]);
            self.crc.update(&[c]);
        }
        self.core.advance(n);
        if state.contains(DecodeState::END) && !self.state.contains(DecodeState::END) {
            tracing::debug!("yEnc trailer reached; body decoding stopped");
        }
        self.state = state;
    }

    fn run_decode(&mut self, input: &[u8]) {
        let body = if self.state.contains(DecodeState::DECODE) {
            Some(input)
        } else {
            self.scan_markers(input)
        };
        if let Some(body) = body {
            if self.state.contains(DecodeState::DECODE) && !self.state.contains(DecodeState::END) {
                self.decode_step(body);
            }
        }
    }
}

impl std::fmt::Debug for YencFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YencFilter")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

impl Filter for YencFilter {
    fn step<'a>(&'a mut self, input: &'a [u8], _prespace: usize) -> FilterOutput<'a> {
        let input = self.core.splice_backup(input);
        self.core.clear_data();
        match self.mode {
            YencMode::Encode => self.encode_step(&input),
            YencMode::Decode => self.run_decode(&input),
        }
        FilterOutput {
            data: self.core.data(),
            prespace: self.core.prespace(),
        }
    }

    fn finish<'a>(&'a mut self, input: &'a [u8], _prespace: usize) -> FilterOutput<'a> {
        let input = self.core.splice_backup(input);
        self.core.clear_data();
        match self.mode {
            YencMode::Encode => self.encode_finish(&input),
            YencMode::Decode => {
                // Marker lines never complete at end of stream; only an
                // active body decode has anything left to emit.
                if self.state.contains(DecodeState::DECODE)
                    && !self.state.contains(DecodeState::END)
                {
                    self.decode_step(&input);
                }
            }
        }
        FilterOutput {
            data: self.core.data(),
            prespace: self.core.prespace(),
        }
    }

    fn reset(&mut self) {
        self.state = DecodeState::INIT;
        self.line = 0;
        self.pcrc = Hasher::new();
        self.crc = Hasher::new();
        self.core.reset();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(Self::new(self.mode))
    }
}
