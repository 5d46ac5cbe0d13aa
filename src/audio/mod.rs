//! Audio input: the external decode process feeding the recognizer.

pub mod source;

pub use source::{
    AudioDecoder, DecodedAudio, DecoderCommand, DecoderExit, FfmpegDecoder, MockDecoder,
    MockDecoderHandle,
};
