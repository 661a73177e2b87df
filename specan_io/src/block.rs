//! Helpers for IEEE 488.2 length-prefixed binary blocks.

use crate::InstrumentError;

/// Parse the first two bytes of a binary block and return the number of length digits.
///
/// A return value of zero means an indefinite-length block that runs until the terminator.
pub fn parse_block_header(header: [u8; 2]) -> Result<usize, InstrumentError> {
    if header[0] != b'#' {
        return Err(InstrumentError::InvalidBinaryBlock(format!(
            "expected '#', got {:?}",
            header[0] as char
        )));
    }
    match header[1] {
        d @ b'0'..=b'9' => Ok((d - b'0') as usize),
        other => Err(InstrumentError::InvalidBinaryBlock(format!(
            "expected a digit after '#', got {:?}",
            other as char
        ))),
    }
}

/// Encode data as a definite-length binary block, i.e., `#<n><len><data>`.
pub fn encode_block(data: &[u8]) -> Vec<u8> {
    let len = data.len().to_string();
    let mut block = format!("#{}{len}", len.len()).into_bytes();
    block.extend_from_slice(data);
    block
}
