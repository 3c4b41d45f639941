//! Mail assembly for remailer.
//!
//! A claimed spool unit is turned into a [`remailer_common::Mail`] by a
//! [`TransformerChain`], then rewritten in place by a [`ProcessorChain`]
//! until `final_body` holds the bytes that go on the wire.

pub mod error;
pub mod processor;
pub mod stage;
pub mod transformer;

pub use error::{PipelineError, Result};
pub use processor::{Processor, ProcessorChain};
pub use stage::{Registry, Stage, StageConfig};
pub use transformer::{Transformer, TransformerChain};

/// Rewrite every bare `\n` as `\r\n`. Existing `\r\n` pairs are kept.
pub(crate) fn crlf(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / 32);
    let mut previous = 0u8;

    for &byte in input {
        if byte == b'\n' && previous != b'\r' {
            output.push(b'\r');
        }
        output.push(byte);
        previous = byte;
    }

    output
}
