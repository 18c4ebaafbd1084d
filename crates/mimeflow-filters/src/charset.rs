//! Charset conversion filter.
//!
//! Converts a byte stream between two named character encodings
//! incrementally, chaining an [`encoding_rs`] decoder (source charset to
//! UTF-8) to an encoder (UTF-8 to target charset) through an internal
//! scratch buffer. Multi-byte sequences split across chunk boundaries are
//! held in the transcoder's shift state between steps; invalid sequences
//! are skipped rather than aborting the stream, and an unexpected internal
//! failure degrades to an identity passthrough for that call only.

use std::fmt;

use encoding_rs::{Decoder, DecoderResult, Encoder, EncoderResult, Encoding};

use crate::error::{Error, Result};
use crate::filter::{Filter, FilterBuffer, FilterOutput};

/// Streaming character set conversion filter.
pub struct CharsetFilter {
    from: &'static Encoding,
    to: &'static Encoding,
    decoder: Decoder,
    encoder: Encoder,
    scratch: Vec<u8>,
    core: FilterBuffer,
}

impl CharsetFilter {
    /// Creates a filter converting from `from_charset` to `to_charset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCharset`] if either label is unknown to
    /// the transcoder; no filter instance is produced.
    pub fn new(from_charset: &str, to_charset: &str) -> Result<Self> {
        let from = Encoding::for_label(from_charset.as_bytes())
            .ok_or_else(|| Error::UnsupportedCharset(from_charset.to_string()))?;
        // UTF-16 and replacement have no encoder; map to their output
        // encoding the way the transcoder defines it.
        let to = Encoding::for_label(to_charset.as_bytes())
            .ok_or_else(|| Error::UnsupportedCharset(to_charset.to_string()))?
            .output_encoding();

        Ok(Self {
            from,
            to,
            // No BOM sniffing: a conversion filter must never silently
            // switch source encodings mid-pipeline.
            decoder: from.new_decoder_without_bom_handling(),
            encoder: to.new_encoder(),
            scratch: Vec::new(),
            core: FilterBuffer::new(),
        })
    }

    /// Canonical name of the source charset.
    #[must_use]
    pub fn from_charset(&self) -> &'static str {
        self.from.name()
    }

    /// Canonical name of the target charset.
    #[must_use]
    pub fn to_charset(&self) -> &'static str {
        self.to.name()
    }

    /// Runs the decode/encode loop over one chunk.
    ///
    /// Returns `false` when conversion became unusable for this call and
    /// the caller should fall back to an identity passthrough.
    fn convert(&mut self, src: &[u8], last: bool) -> bool {
        self.core.clear_data();
        // Worst-case expansion, asking the transcoder where it can answer;
        // the fallback mirrors the classic 5x + 16 reservation.
        let scratch_need = self
            .decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len() * 5 + 16)
            .max(16);
        // The scratch moves out of self for the duration of the loop so
        // the decoded text can be borrowed across the encode call.
        let mut scratch = std::mem::take(&mut self.scratch);
        if scratch.len() < scratch_need {
            scratch.resize(scratch_need, 0);
        }
        self.core.ensure_capacity(src.len() * 5 + 16, false);

        let mut pos = 0;
        let converted = loop {
            let (dres, nread, nwritten) =
                self.decoder
                    .decode_to_utf8_without_replacement(&src[pos..], &mut scratch, last);
            pos += nread;

            let done = matches!(dres, DecoderResult::InputEmpty);
            if nwritten > 0 || (last && done) {
                let Ok(text) = std::str::from_utf8(&scratch[..nwritten]) else {
                    tracing::warn!(
                        from = self.from.name(),
                        to = self.to.name(),
                        "transcoder produced invalid UTF-8; passing chunk through unchanged"
                    );
                    break false;
                };
                if !self.encode_text(text, last && done) {
                    break false;
                }
            }

            match dres {
                DecoderResult::InputEmpty => break true,
                // Scratch full: drain again. Malformed: the offending
                // bytes were consumed; continue with the rest.
                DecoderResult::OutputFull | DecoderResult::Malformed(_, _) => {}
            }
        };
        self.scratch = scratch;
        converted
    }

    /// Pushes decoded UTF-8 through the target encoder into the output
    /// buffer, growing it as needed.
    fn encode_text(&mut self, text: &str, last: bool) -> bool {
        let mut pos = 0;
        loop {
            let rem = &text[pos..];
            let need = self
                .encoder
                .max_buffer_length_from_utf8_without_replacement(rem.len())
                .unwrap_or(rem.len() * 5 + 16)
                .max(16);
            self.core.ensure_capacity(self.core.len() + need, true);

            let dst = self.core.space();
            let (eres, nread, nwritten) =
                self.encoder.encode_from_utf8_without_replacement(rem, dst, last);
            pos += nread;
            self.core.advance(nwritten);

            match eres {
                EncoderResult::InputEmpty => return true,
                // Output full: capacity was regrown above, go around.
                // Unmappable: the character was consumed; skip it.
                EncoderResult::OutputFull | EncoderResult::Unmappable(_) => {}
            }
        }
    }

}

impl Filter for CharsetFilter {
    // Incomplete sequences live in the transcoder's shift state, never in
    // the core backup buffer, so the passthrough fallback can echo the
    // caller's chunk directly.
    fn step<'a>(&'a mut self, input: &'a [u8], prespace: usize) -> FilterOutput<'a> {
        if self.convert(input, false) {
            FilterOutput {
                data: self.core.data(),
                prespace: self.core.prespace(),
            }
        } else {
            FilterOutput { data: input, prespace }
        }
    }

    fn finish<'a>(&'a mut self, input: &'a [u8], prespace: usize) -> FilterOutput<'a> {
        // An incomplete trailing sequence is dropped here: with no next
        // chunk to complete it, the transcoder discards it at flush.
        if self.convert(input, true) {
            FilterOutput {
                data: self.core.data(),
                prespace: self.core.prespace(),
            }
        } else {
            FilterOutput { data: input, prespace }
        }
    }

    fn reset(&mut self) {
        self.decoder = self.from.new_decoder_without_bom_handling();
        self.encoder = self.to.new_encoder();
        self.core.reset();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(Self {
            from: self.from,
            to: self.to,
            decoder: self.from.new_decoder_without_bom_handling(),
            encoder: self.to.new_encoder(),
            scratch: Vec::new(),
            core: FilterBuffer::new(),
        })
    }
}

impl fmt::Debug for CharsetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharsetFilter")
            .field("from", &self.from.name())
            .field("to", &self.to.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn convert_all(filter: &mut CharsetFilter, input: &[u8]) -> Vec<u8> {
        let mut out = filter.step(input, 0).data.to_vec();
        out.extend_from_slice(filter.finish(b"", 0).data);
        out
    }

    #[test]
    fn test_unsupported_charset_fails_construction() {
        let err = CharsetFilter::new("bogus-charset-1", "bogus-charset-2");
        assert!(matches!(err, Err(Error::UnsupportedCharset(_))));

        let err = CharsetFilter::new("utf-8", "bogus-charset-2");
        assert!(matches!(err, Err(Error::UnsupportedCharset(_))));
    }

    #[test]
    fn test_latin1_to_utf8() {
        let mut filter = CharsetFilter::new("iso-8859-1", "utf-8").unwrap();
        assert_eq!(convert_all(&mut filter, b"caf\xE9"), "café".as_bytes());
    }

    #[test]
    fn test_utf8_to_latin1() {
        let mut filter = CharsetFilter::new("utf-8", "iso-8859-1").unwrap();
        assert_eq!(convert_all(&mut filter, "café".as_bytes()), b"caf\xE9");
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut filter = CharsetFilter::new("utf-8", "iso-8859-1").unwrap();
        // "é" is 0xC3 0xA9 in UTF-8; split the pair over two steps.
        assert!(filter.step(&[0xC3], 0).data.is_empty());
        assert_eq!(filter.step(&[0xA9], 0).data, &[0xE9]);
        assert!(filter.finish(b"", 0).data.is_empty());
    }

    #[test]
    fn test_invalid_byte_is_skipped() {
        let mut filter = CharsetFilter::new("utf-8", "utf-8").unwrap();
        // 0xFF can never appear in well-formed UTF-8.
        assert_eq!(convert_all(&mut filter, b"a\xFFb"), b"ab");
    }

    #[test]
    fn test_incomplete_trailing_sequence_dropped_at_finish() {
        let mut filter = CharsetFilter::new("utf-8", "utf-8").unwrap();
        assert!(filter.step(&[0xC3], 0).data.is_empty());
        assert!(filter.finish(b"", 0).data.is_empty());
    }

    #[test]
    fn test_shift_state_flushed_at_finish() {
        let mut filter = CharsetFilter::new("utf-8", "iso-2022-jp").unwrap();
        let stepped = filter.step("あ".as_bytes(), 0).data.to_vec();
        assert_eq!(stepped, [0x1B, 0x24, 0x42, 0x24, 0x22]);
        // The shift-back to ASCII only becomes determinate at end of
        // stream.
        assert_eq!(filter.finish(b"", 0).data, [0x1B, 0x28, 0x42]);
    }

    #[test]
    fn test_unmappable_char_is_skipped() {
        let mut filter = CharsetFilter::new("utf-8", "iso-8859-1").unwrap();
        assert_eq!(convert_all(&mut filter, "aあb".as_bytes()), b"ab");
    }

    #[test]
    fn test_reset_discards_shift_state() {
        let mut filter = CharsetFilter::new("utf-8", "iso-8859-1").unwrap();
        assert!(filter.step(&[0xC3], 0).data.is_empty());
        filter.reset();
        // The held lead byte is gone; a lone continuation byte is invalid
        // and gets skipped.
        assert!(convert_all(&mut filter, &[0xA9]).is_empty());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut filter = CharsetFilter::new("iso-8859-1", "utf-8").unwrap();
        filter.step(b"partial \xE9", 0);

        let mut copy = filter.copy();
        let mut out = copy.step(b"\xE9", 0).data.to_vec();
        out.extend_from_slice(copy.finish(b"", 0).data);
        assert_eq!(out, "é".as_bytes());
    }

    #[test]
    fn test_charset_names_are_canonical() {
        let filter = CharsetFilter::new("latin1", "UTF8").unwrap();
        assert_eq!(filter.from_charset(), "windows-1252");
        assert_eq!(filter.to_charset(), "UTF-8");
    }
}
