//! MPEG Layer III frame walking.
//!
//! The decoder silently stops at a frame it cannot finish, so a stream cut in
//! the middle of a frame would still "decode". Walking the headers first tells
//! a complete stream from a truncated one.

const ID3V2_HEADER_LEN: usize = 10;
const ID3V1_TAG_LEN: usize = 128;

/// kbit/s by bitrate index, MPEG-1 Layer III.
const BITRATES_V1: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
/// kbit/s by bitrate index, MPEG-2 and MPEG-2.5 Layer III.
const BITRATES_V2: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

/// Counts the frames of a Layer III stream, skipping ID3 tags.
///
/// Fails when something other than a frame header is found where a frame
/// should start, or when the last frame is shorter than its header declares.
pub(crate) fn count_frames(bytes: &[u8]) -> Result<usize, String> {
    let mut pos = id3v2_len(bytes);
    let mut frames = 0;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() == ID3V1_TAG_LEN && rest.starts_with(b"TAG") {
            break;
        }

        let len = frame_len(rest).ok_or_else(|| format!("no MPEG frame header at byte {pos}"))?;
        if len > rest.len() {
            return Err(format!(
                "last MPEG frame truncated ({} of {} bytes)",
                rest.len(),
                len
            ));
        }
        pos += len;
        frames += 1;
    }

    if frames == 0 {
        return Err("no MPEG frames".to_string());
    }
    Ok(frames)
}

fn id3v2_len(bytes: &[u8]) -> usize {
    if bytes.len() < ID3V2_HEADER_LEN || !bytes.starts_with(b"ID3") {
        return 0;
    }
    // syncsafe: 7 bits per byte
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7f));
    let footer = if bytes[5] & 0x10 != 0 { ID3V2_HEADER_LEN } else { 0 };
    (ID3V2_HEADER_LEN + size + footer).min(bytes.len())
}

/// Length in bytes of the frame starting at `header`, if it is a Layer III header.
fn frame_len(header: &[u8]) -> Option<usize> {
    if header.len() < 4 || header[0] != 0xff || header[1] & 0xe0 != 0xe0 {
        return None;
    }

    let version = (header[1] >> 3) & 0b11;
    let layer = (header[1] >> 1) & 0b11;
    let bitrate_index = usize::from(header[2] >> 4);
    let rate_index = usize::from((header[2] >> 2) & 0b11);
    let padding = u32::from((header[2] >> 1) & 1);

    if layer != 0b01 || rate_index == 3 {
        return None;
    }

    let (bitrates, rates, factor) = match version {
        0b11 => (&BITRATES_V1, [44100, 48000, 32000], 144),
        0b10 => (&BITRATES_V2, [22050, 24000, 16000], 72),
        0b00 => (&BITRATES_V2, [11025, 12000, 8000], 72),
        _ => return None,
    };

    let bitrate = bitrates[bitrate_index] * 1000;
    if bitrate == 0 {
        return None;
    }
    Some((factor * bitrate / rates[rate_index] + padding) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    // MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, no padding: 417 bytes
    fn silent_frames(count: usize) -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xff, 0xfb, 0x90, 0x64]);
        frame.repeat(count)
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(&[0xff, 0xfb, 0x90, 0x64]), Some(417));
        // padding bit set
        assert_eq!(frame_len(&[0xff, 0xfb, 0x92, 0x64]), Some(418));
        // MPEG-2, 64 kbit/s, 22.05 kHz
        assert_eq!(frame_len(&[0xff, 0xf3, 0x80, 0xc4]), Some(208));
        // layer II is not handled
        assert_eq!(frame_len(&[0xff, 0xfd, 0x90, 0x64]), None);
        assert_eq!(frame_len(b"RIFF"), None);
    }

    #[test]
    fn test_count_complete_stream() {
        assert_eq!(count_frames(&silent_frames(6)), Ok(6));
    }

    #[test]
    fn test_skips_tags() {
        let mut bytes = vec![b'I', b'D', b'3', 4, 0, 0, 0, 0, 0, 5];
        bytes.extend_from_slice(&[0; 5]);
        bytes.extend(silent_frames(2));
        let mut trailer = b"TAG".to_vec();
        trailer.resize(ID3V1_TAG_LEN, 0);
        bytes.extend(trailer);

        assert_eq!(count_frames(&bytes), Ok(2));
    }

    #[test]
    fn test_truncated_stream() {
        let mut bytes = silent_frames(3);
        bytes.truncate(bytes.len() - 100);
        let err = count_frames(&bytes).unwrap_err();
        assert!(err.contains("truncated"), "{err}");
    }

    #[test]
    fn test_garbage_between_frames() {
        let mut bytes = silent_frames(1);
        bytes.extend_from_slice(b"junk");
        bytes.extend(silent_frames(1));
        assert!(count_frames(&bytes).is_err());
        assert!(count_frames(b"").is_err());
    }
}
