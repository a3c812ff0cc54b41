//! Sparse Random Linear Network Coding over GF(2^q): encoder, recoder
//! buffers (standard and BATS), and the GG/BD/CBD/OA/PP decoder family,
//! built on a shared bit-packed Galois field core and an LDPC-style
//! precode graph for recovery beyond what direct coded combinations
//! cover. See SPEC_FULL.md for the module-by-module contract and
//! DESIGN.md for how each piece is grounded.

mod checkpoint;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod gf;
pub mod packet;
pub mod params;
pub mod plan;
pub mod precode;
pub mod recoder;
pub mod recoder_bats;

pub use decoder::{Decoder, DecoderKind};
pub use encoder::Encoder;
pub use error::{EngineError, Result};
pub use packet::Packet;
pub use params::{CodeType, Params};
pub use precode::Graph as PrecodeGraph;
pub use recoder::{RecoderBuffer, Schedule};
pub use recoder_bats::BatsRecoderBuffer;

/// Builds an encoder over `data` (zero-padded to `params.datasize` if
/// shorter; rejected if longer). Mirrors `snc_create_encoder`/
/// `snc_create_enc_context` from the original library surface.
pub fn create_encoder(data: &[u8], params: Params) -> Result<Encoder> {
    Encoder::new(data, params)
}

/// Builds a decoder of the requested `kind`, ready to absorb packets.
/// Mirrors `snc_create_decoder`.
pub fn create_decoder(params: Params, kind: DecoderKind) -> Result<Decoder> {
    Decoder::create(kind, params)
}

/// Restores a decoder from a checkpoint previously produced by
/// [`Decoder::save`]. Mirrors `snc_restore_decoder`.
pub fn restore_decoder(bytes: &[u8]) -> Result<Decoder> {
    Decoder::restore(bytes)
}

/// Builds a standard recoder buffer holding up to `bufsize` packets per
/// subgeneration. Mirrors `snc_create_buffer`.
pub fn create_buffer(params: Params, bufsize: usize) -> RecoderBuffer {
    RecoderBuffer::new(params, bufsize)
}

/// Builds a BATS recoder buffer: a single FIFO ring of `bufsize`
/// packets spanning batches. Mirrors `snc_create_bats_buffer`.
pub fn create_bats_buffer(params: Params, bufsize: usize) -> BatsRecoderBuffer {
    BatsRecoderBuffer::new(params, bufsize)
}
