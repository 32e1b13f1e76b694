use encoding_rs::{Encoding, WINDOWS_1252};

/// Which step of the fallback chain produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeSource {
    Declared(&'static str),
    Detected(&'static str),
    Utf8,
    Latin1Lossy,
}

fn declared_charset(content_type: Option<&str>) -> Option<&'static Encoding> {
    let ct = content_type?;
    ct.split(';')
        .skip(1)
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, v)| Encoding::for_label(v.trim().trim_matches('"').as_bytes()))
}

fn detect(bytes: &[u8]) -> &'static Encoding {
    let mut det = chardetng::EncodingDetector::new();
    det.feed(bytes, true);
    det.guess(None, true)
}

/// Decode a response body to text.
///
/// Chain: charset declared in `content_type` -> statistical guess -> strict UTF-8 ->
/// windows-1252 (single-byte, never fails). A candidate is accepted only if it decodes
/// without malformed sequences.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> (String, DecodeSource) {
    if let Some(enc) = declared_charset(content_type) {
        let (text, _, had_errors) = enc.decode(bytes);
        if !had_errors {
            return (text.into_owned(), DecodeSource::Declared(enc.name()));
        }
        tracing::debug!(encoding = enc.name(), "declared charset failed to decode");
    }

    let guessed = detect(bytes);
    let (text, used, had_errors) = guessed.decode(bytes);
    if !had_errors {
        tracing::debug!(encoding = used.name(), "detected encoding");
        return (text.into_owned(), DecodeSource::Detected(used.name()));
    }
    tracing::warn!(encoding = guessed.name(), "decoding failed, trying UTF-8");

    if let Ok(s) = std::str::from_utf8(bytes) {
        return (s.to_string(), DecodeSource::Utf8);
    }

    tracing::warn!("decoding failed, using windows-1252 (may lose data)");
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    (text.into_owned(), DecodeSource::Latin1Lossy)
}
