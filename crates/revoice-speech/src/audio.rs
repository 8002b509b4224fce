//! MP3 content sniffing.

use crate::error::{SpeechError, SpeechResult};

/// True when `bytes` start with an ID3v2 tag or an MPEG audio frame sync.
pub fn is_mp3(bytes: &[u8]) -> bool {
    match bytes {
        [b'I', b'D', b'3', ..] => true,
        // 11 sync bits, then a layer field that is not "reserved"
        [0xFF, second, ..] => second & 0xE0 == 0xE0 && second & 0x06 != 0,
        _ => false,
    }
}

/// Reject anything that is not MP3 audio.
pub fn sniff_mp3(bytes: Vec<u8>) -> SpeechResult<Vec<u8>> {
    if is_mp3(&bytes) {
        Ok(bytes)
    } else {
        Err(SpeechError::NotAudio(bytes.len()))
    }
}
