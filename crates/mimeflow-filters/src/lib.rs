//! # mimeflow-filters
//!
//! Streaming byte-transform filters for MIME content processing.
//!
//! Each filter consumes one chunk of bytes at a time and produces a
//! transformed chunk, without ever buffering the whole logical stream.
//! Filters handle units that straddle chunk boundaries (split multi-byte
//! characters, split escape sequences, split marker lines) internally, so
//! a driver can feed chunks of any size and shape.
//!
//! ## Features
//!
//! - **Filter contract**: a shared buffer core with prespace reservation
//!   and cross-chunk carry-over, behind one object-safe trait
//! - **Charset conversion**: incremental transcoding between named
//!   character encodings
//! - **yEnc codec**: the Usenet binary-to-text encoding, with marker-line
//!   scanning and per-part/per-stream CRC-32
//!
//! ## Quick Start
//!
//! ### Converting charsets
//!
//! ```ignore
//! use mimeflow_filters::{CharsetFilter, Filter};
//!
//! let mut conv = CharsetFilter::new("iso-8859-1", "utf-8")?;
//! for chunk in chunks {
//!     let out = conv.step(chunk, 0);
//!     sink.write_all(out.data)?;
//! }
//! let out = conv.finish(&[], 0);
//! sink.write_all(out.data)?;
//! ```
//!
//! ### Decoding yEnc
//!
//! ```ignore
//! use mimeflow_filters::{Filter, YencFilter, YencMode};
//!
//! let mut yenc = YencFilter::new(YencMode::Decode);
//! for chunk in article_body {
//!     decoded.extend_from_slice(yenc.step(chunk, 0).data);
//! }
//! decoded.extend_from_slice(yenc.finish(&[], 0).data);
//! assert_eq!(yenc.part_crc(), expected_pcrc32);
//! ```
//!
//! ### Building a pipeline
//!
//! ```ignore
//! use mimeflow_filters::{CharsetFilter, Filter, YencFilter, YencMode};
//!
//! let mut filters: Vec<Box<dyn Filter>> = vec![
//!     Box::new(YencFilter::new(YencMode::Decode)),
//!     Box::new(CharsetFilter::new("shift_jis", "utf-8")?),
//! ];
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod charset;
mod error;
mod filter;
mod yenc;

pub use charset::CharsetFilter;
pub use error::{Error, Result};
pub use filter::{Filter, FilterBuffer, FilterOutput};
pub use yenc::{DecodeState, YencFilter, YencMode};
