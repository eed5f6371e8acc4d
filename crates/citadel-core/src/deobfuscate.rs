//! Deobfuscation pipeline.
//!
//! Given an input string, produce candidate decoded variants plus the set of
//! obfuscation markers that were observed. The pipeline never decides
//! maliciousness; it only surfaces hidden text for the scoring layers.
//!
//! Every decoder is a pure function `&str -> Option<String>` returning
//! `None` when it found nothing it would call a transformation. Decoder
//! regexes are compiled once at first use; caps: 64 KiB per variant, 1 MiB
//! of gzip output, two decode passes.

use std::io::Read;
use std::sync::OnceLock;

use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::patterns;
use crate::signal::ObfuscationType;

/// Maximum size of any single decoded variant.
pub const MAX_VARIANT_BYTES: usize = 64 * 1024;

/// Hard cap on gzip decompression output (zip-bomb guard).
pub const MAX_GZIP_BYTES: usize = 1024 * 1024;

/// A single decoded candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedVariant {
    pub text: String,
    pub obfuscation: ObfuscationType,
}

/// Pipeline output: the NFKC-normalized input, all decoded variants, and
/// the unique obfuscation markers in observation order.
#[derive(Clone, Debug, Default)]
pub struct DeobfuscationResult {
    pub normalized: String,
    pub variants: Vec<DecodedVariant>,
    pub types: Vec<ObfuscationType>,
}

impl DeobfuscationResult {
    pub fn was_deobfuscated(&self) -> bool {
        !self.types.is_empty()
    }
}

struct DecoderPatterns {
    base64: Regex,
    base32: Regex,
    hex_escaped: Regex,
    pure_hex: Regex,
    percent: Regex,
    decimal_entity: Regex,
    hex_entity: Regex,
    gzip_base64: Regex,
    unicode_escape: Regex,
    long_unicode_escape: Regex,
    octal_escape: Regex,
}

fn decoder_patterns() -> &'static DecoderPatterns {
    static PATTERNS: OnceLock<DecoderPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| {
            Regex::new(p).unwrap_or_else(|err| panic!("invalid decoder regex {p:?}: {err}"))
        };
        DecoderPatterns {
            base64: compile(r"[A-Za-z0-9+/]{8,}={0,2}"),
            base32: compile(r"[A-Z2-7]{8,}={0,6}"),
            hex_escaped: compile(r"(?:\\x[0-9a-fA-F]{2}){4,}"),
            pure_hex: compile(r"\b(?:[0-9a-fA-F]{2}){8,}\b"),
            percent: compile(r"(?:%[0-9a-fA-F]{2}){2,}"),
            decimal_entity: compile(r"&#([0-9]{2,7});"),
            hex_entity: compile(r"&#[xX]([0-9a-fA-F]{1,6});"),
            gzip_base64: compile(r"H4sI[A-Za-z0-9+/]{4,}={0,2}"),
            unicode_escape: compile(r"\\u([0-9a-fA-F]{4})"),
            long_unicode_escape: compile(r"\\U([0-9a-fA-F]{8})"),
            octal_escape: compile(r"\\([0-3][0-7]{2})"),
        }
    })
}

/// NFKC normalization: collapses mathematical/fullwidth/circled letter
/// variants to their ASCII equivalents.
pub fn normalize_unicode(text: &str) -> (String, bool) {
    let normalized: String = text.nfkc().collect();
    let changed = normalized != text;
    (normalized, changed)
}

fn mostly_printable_ascii(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut printable = 0usize;
    let mut total = 0usize;
    for c in s.chars() {
        total += 1;
        if c.is_ascii_graphic() || c == ' ' || c == '\n' || c == '\t' || c == '\r' {
            printable += 1;
        }
    }
    (printable as f64) / (total as f64) >= 0.85
}

fn truncate_to_char_boundary(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

/// Decode base64 candidates embedded in the text. Candidates must be at
/// least 8 characters and the output must be mostly printable ASCII, which
/// rejects English words that happen to sit in the base64 alphabet
/// ("findings" decodes to Syriac codepoints).
pub fn try_base64_decode(text: &str) -> Option<String> {
    let mut decoded_parts: Vec<String> = Vec::new();

    for m in decoder_patterns().base64.find_iter(text) {
        let candidate = m.as_str();
        let bytes = if candidate.len() % 4 == 0 {
            BASE64_STANDARD.decode(candidate).ok()
        } else {
            STANDARD_NO_PAD.decode(candidate.trim_end_matches('=')).ok()
        };
        let Some(bytes) = bytes else { continue };
        let Ok(s) = String::from_utf8(bytes) else {
            continue;
        };
        if s.len() >= 4 && mostly_printable_ascii(&s) {
            decoded_parts.push(s);
        }
    }

    if decoded_parts.is_empty() {
        None
    } else {
        Some(decoded_parts.join(" "))
    }
}

fn base32_decode_bytes(candidate: &str) -> Option<Vec<u8>> {
    let stripped = candidate.trim_end_matches('=');
    let mut out = Vec::with_capacity(stripped.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    for c in stripped.chars() {
        let value = match c {
            'A'..='Z' => c as u64 - 'A' as u64,
            '2'..='7' => c as u64 - '2' as u64 + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}

/// Decode base32 candidates (with or without padding, 8+ chars). Shorter
/// runs cannot carry a meaningful payload; anything else is gated by the
/// printability guard, same as base64.
pub fn try_base32_decode(text: &str) -> Option<String> {
    let mut decoded_parts: Vec<String> = Vec::new();

    for m in decoder_patterns().base32.find_iter(text) {
        let Some(bytes) = base32_decode_bytes(m.as_str()) else {
            continue;
        };
        let Ok(s) = String::from_utf8(bytes) else {
            continue;
        };
        if s.len() >= 4 && mostly_printable_ascii(&s) {
            decoded_parts.push(s);
        }
    }

    if decoded_parts.is_empty() {
        None
    } else {
        Some(decoded_parts.join(" "))
    }
}

/// Decode `\xNN` escape runs and bare hex runs.
pub fn try_hex_decode(text: &str) -> Option<String> {
    let patterns = decoder_patterns();
    let mut decoded_parts: Vec<String> = Vec::new();

    for m in patterns.hex_escaped.find_iter(text) {
        let bytes: Vec<u8> = m
            .as_str()
            .split("\\x")
            .filter(|chunk| !chunk.is_empty())
            .filter_map(|chunk| u8::from_str_radix(chunk, 16).ok())
            .collect();
        if let Ok(s) = String::from_utf8(bytes) {
            if mostly_printable_ascii(&s) {
                decoded_parts.push(s);
            }
        }
    }

    for m in patterns.pure_hex.find_iter(text) {
        let run = m.as_str();
        let bytes: Vec<u8> = (0..run.len())
            .step_by(2)
            .filter_map(|i| u8::from_str_radix(&run[i..i + 2], 16).ok())
            .collect();
        if let Ok(s) = String::from_utf8(bytes) {
            if s.len() >= 4 && mostly_printable_ascii(&s) {
                decoded_parts.push(s);
            }
        }
    }

    if decoded_parts.is_empty() {
        None
    } else {
        Some(decoded_parts.join(" "))
    }
}

/// URL percent-decoding. Applies only when at least one `%XX` pair run is
/// present; invalid sequences pass through unchanged.
pub fn try_url_decode(text: &str) -> Option<String> {
    if !decoder_patterns().percent.is_match(text) {
        return None;
    }

    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hi = (bytes[i + 1] as char).to_digit(16).unwrap_or(0) as u8;
            let lo = (bytes[i + 2] as char).to_digit(16).unwrap_or(0) as u8;
            out.push(hi * 16 + lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(s) if s != text => Some(s),
        _ => None,
    }
}

/// Decode decimal and hex numeric HTML entities.
pub fn try_html_entity_decode(text: &str) -> Option<String> {
    let patterns = decoder_patterns();
    if !patterns.decimal_entity.is_match(text) && !patterns.hex_entity.is_match(text) {
        return None;
    }

    let step1 = patterns.decimal_entity.replace_all(text, |caps: &regex::Captures<'_>| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    let step2 = patterns.hex_entity.replace_all(&step1, |caps: &regex::Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    let decoded = step2.into_owned();
    if decoded != text {
        Some(decoded)
    } else {
        None
    }
}

fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='m' | 'A'..='M' => char::from(c as u8 + 13),
            'n'..='z' | 'N'..='Z' => char::from(c as u8 - 13),
            _ => c,
        })
        .collect()
}

const SUSPICIOUS_DECODED: &[&str] = &[
    "ignore",
    "disregard",
    "override",
    "system prompt",
    "instruction",
    "you are now",
    "forget",
    "act as",
    "jailbreak",
    "no restrictions",
    "bypass",
    "developer mode",
    "password",
    "secret",
    "reveal",
];

fn looks_suspicious(text: &str) -> bool {
    let lower = text.to_lowercase();
    SUSPICIOUS_DECODED.iter().any(|p| lower.contains(p))
}

/// ROT13. Only reported when the rotation *reveals* attack vocabulary that
/// the original did not contain — rotating ordinary prose is not a finding.
pub fn try_rot13_decode(text: &str) -> Option<String> {
    let rotated = rot13(text);
    if looks_suspicious(&rotated) && !looks_suspicious(text) {
        Some(rotated)
    } else {
        None
    }
}

/// Decode `\uXXXX` and `\UXXXXXXXX` escape sequences.
pub fn try_unicode_escapes(text: &str) -> Option<String> {
    let patterns = decoder_patterns();
    if !patterns.unicode_escape.is_match(text) && !patterns.long_unicode_escape.is_match(text) {
        return None;
    }

    let step1 = patterns
        .long_unicode_escape
        .replace_all(text, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        });
    let step2 = patterns
        .unicode_escape
        .replace_all(&step1, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        });

    let decoded = step2.into_owned();
    if decoded != text {
        Some(decoded)
    } else {
        None
    }
}

/// Decode `\NNN` octal escapes (value ≤ 0377).
pub fn try_octal_escapes(text: &str) -> Option<String> {
    let pattern = &decoder_patterns().octal_escape;
    if !pattern.is_match(text) {
        return None;
    }

    let mut out: Vec<u8> = Vec::with_capacity(text.len());
    let mut last = 0usize;
    for m in pattern.find_iter(text) {
        out.extend_from_slice(text[last..m.start()].as_bytes());
        let value = u8::from_str_radix(&m.as_str()[1..], 8).unwrap_or(b'?');
        out.push(value);
        last = m.end();
    }
    out.extend_from_slice(text[last..].as_bytes());

    match String::from_utf8(out) {
        Ok(s) if s != text => Some(s),
        _ => None,
    }
}

/// Decode gzip streams wrapped in base64 (the `H4sI` magic prefix). Output
/// is hard-capped at [`MAX_GZIP_BYTES`] regardless of the compressed
/// payload's claimed size.
pub fn try_gzip_decompress(text: &str) -> Option<String> {
    for m in decoder_patterns().gzip_base64.find_iter(text) {
        let candidate = m.as_str();
        let bytes = if candidate.len() % 4 == 0 {
            BASE64_STANDARD.decode(candidate).ok()
        } else {
            STANDARD_NO_PAD.decode(candidate.trim_end_matches('=')).ok()
        };
        let Some(bytes) = bytes else { continue };

        let mut limited = flate2::read::GzDecoder::new(&bytes[..]).take(MAX_GZIP_BYTES as u64);
        let mut buf = Vec::new();
        if limited.read_to_end(&mut buf).is_err() && buf.is_empty() {
            continue;
        }
        if let Ok(s) = String::from_utf8(buf) {
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    None
}

fn fold_homoglyph(c: char) -> Option<char> {
    let folded = match c {
        // Cyrillic look-alikes
        'а' => 'a',
        'е' => 'e',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'у' => 'y',
        'х' => 'x',
        'і' => 'i',
        'ѕ' => 's',
        'ј' => 'j',
        'А' => 'A',
        'В' => 'B',
        'Е' => 'E',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Т' => 'T',
        'Х' => 'X',
        // Greek look-alikes
        'α' => 'a',
        'ε' => 'e',
        'ι' => 'i',
        'κ' => 'k',
        'ν' => 'v',
        'ο' => 'o',
        'ρ' => 'p',
        'τ' => 't',
        'υ' => 'u',
        'χ' => 'x',
        'Α' => 'A',
        'Β' => 'B',
        'Ε' => 'E',
        'Ζ' => 'Z',
        'Η' => 'H',
        'Ι' => 'I',
        'Κ' => 'K',
        'Μ' => 'M',
        'Ν' => 'N',
        'Ο' => 'O',
        'Ρ' => 'P',
        'Τ' => 'T',
        'Υ' => 'Y',
        'Χ' => 'X',
        _ => return None,
    };
    Some(folded)
}

/// Fold Cyrillic/Greek look-alike letters to Latin.
pub fn try_homoglyph_fold(text: &str) -> Option<String> {
    let mut folded = String::with_capacity(text.len());
    let mut changed = false;
    for c in text.chars() {
        match fold_homoglyph(c) {
            Some(latin) => {
                folded.push(latin);
                changed = true;
            }
            None => folded.push(c),
        }
    }
    if changed {
        Some(folded)
    } else {
        None
    }
}

fn is_unicode_tag(c: char) -> bool {
    ('\u{E0000}'..='\u{E007F}').contains(&c)
}

/// Reveal text smuggled in the Unicode tag block (U+E0000–U+E007F).
pub fn try_unicode_tags(text: &str) -> Option<String> {
    let mut hidden = String::new();
    let mut visible = String::with_capacity(text.len());
    for c in text.chars() {
        if is_unicode_tag(c) {
            let code = c as u32 - 0xE0000;
            if let Some(ascii) = char::from_u32(code) {
                if ascii.is_ascii_graphic() || ascii == ' ' {
                    hidden.push(ascii);
                }
            }
        } else {
            visible.push(c);
        }
    }
    if hidden.is_empty() {
        None
    } else {
        Some(format!("{hidden} {visible}"))
    }
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{180E}'
            | '\u{200B}'
            | '\u{200C}'
            | '\u{200D}'
            | '\u{200E}'
            | '\u{200F}'
            | '\u{202A}'
            | '\u{202B}'
            | '\u{202C}'
            | '\u{202D}'
            | '\u{202E}'
            | '\u{2060}'
            | '\u{2066}'
            | '\u{2067}'
            | '\u{2068}'
            | '\u{2069}'
            | '\u{FEFF}'
    )
}

/// Strip zero-width and formatting characters used to split keywords.
pub fn try_strip_invisibles(text: &str) -> Option<String> {
    let mut stripped = String::with_capacity(text.len());
    let mut removed = 0usize;
    for c in text.chars() {
        if is_invisible(c) {
            removed += 1;
        } else {
            stripped.push(c);
        }
    }
    if removed > 0 {
        Some(stripped)
    } else {
        None
    }
}

/// Marker emitted into the variant stream when ASCII-art lettering is
/// detected; the scorer carries a matching keyword weight.
pub const ASCII_ART_MARKER: &str = "potential_ascii_art_injection";

/// Marker emitted when block-drawing characters dominate the input.
pub const BLOCK_ASCII_MARKER: &str = "obfuscation_block_detected";

fn is_art_char(c: char) -> bool {
    matches!(
        c,
        '#' | '*' | '=' | '|' | '/' | '\\' | '_' | '-' | '~' | '`' | '\'' | '.' | '+' | ' '
    )
}

/// Detect multi-line ASCII-art lettering. Art cannot be read back into
/// text cheaply, so detection surfaces a marker the scorer weights.
pub fn try_ascii_art(text: &str) -> Option<String> {
    let mut art_lines = 0usize;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.len() < 10 {
            continue;
        }
        let art = trimmed.chars().filter(|c| is_art_char(*c)).count();
        if (art as f64) / (trimmed.chars().count() as f64) >= 0.8 {
            art_lines += 1;
        }
    }
    if art_lines >= 3 {
        Some(ASCII_ART_MARKER.to_string())
    } else {
        None
    }
}

/// Detect block-drawing character walls (U+2580–U+259F).
pub fn try_block_ascii(text: &str) -> Option<String> {
    let blocks = text
        .chars()
        .filter(|c| ('\u{2580}'..='\u{259F}').contains(c))
        .count();
    if blocks >= 10 {
        Some(BLOCK_ASCII_MARKER.to_string())
    } else {
        None
    }
}

/// Reverse the input when decode/reverse framing is present elsewhere in
/// the text.
pub fn try_reverse_decode(text: &str) -> Option<String> {
    if patterns::evaluate_flip_attack(text) <= 0.0 {
        return None;
    }
    Some(text.chars().rev().collect())
}

fn leet_fold(c: char) -> char {
    match c {
        '0' => 'o',
        '1' => 'i',
        '3' => 'e',
        '4' => 'a',
        '5' => 's',
        '7' => 't',
        '8' => 'b',
        '@' => 'a',
        '$' => 's',
        other => other.to_ascii_lowercase(),
    }
}

/// Leetspeak digit→letter fold. Reported only when the fold reveals attack
/// vocabulary the raw text did not contain.
pub fn try_leetspeak_decode(text: &str) -> Option<String> {
    let folded: String = text.chars().map(leet_fold).collect();
    if folded != text.to_lowercase() && looks_suspicious(&folded) && !looks_suspicious(text) {
        Some(folded)
    } else {
        None
    }
}

type Decoder = (fn(&str) -> Option<String>, ObfuscationType);

const FIRST_PASS_DECODERS: &[Decoder] = &[
    (try_base64_decode, ObfuscationType::Base64),
    (try_base32_decode, ObfuscationType::Base32),
    (try_hex_decode, ObfuscationType::Hex),
    (try_url_decode, ObfuscationType::Url),
    (try_html_entity_decode, ObfuscationType::Html),
    (try_rot13_decode, ObfuscationType::Rot13),
    (try_unicode_escapes, ObfuscationType::UnicodeEscapes),
    (try_octal_escapes, ObfuscationType::OctalEscapes),
    (try_gzip_decompress, ObfuscationType::Gzip),
    (try_homoglyph_fold, ObfuscationType::Homoglyphs),
    (try_unicode_tags, ObfuscationType::UnicodeTags),
    (try_strip_invisibles, ObfuscationType::ZeroWidth),
    (try_ascii_art, ObfuscationType::AsciiArt),
    (try_block_ascii, ObfuscationType::BlockAscii),
    (try_reverse_decode, ObfuscationType::Reverse),
    (try_leetspeak_decode, ObfuscationType::Leetspeak),
];

/// Decoders eligible for the second pass over a first-pass variant
/// (double-encoded payloads: base64-in-base64, escapes inside gzip, …).
const SECOND_PASS_DECODERS: &[Decoder] = &[
    (try_base64_decode, ObfuscationType::Base64),
    (try_hex_decode, ObfuscationType::Hex),
    (try_url_decode, ObfuscationType::Url),
    (try_unicode_escapes, ObfuscationType::UnicodeEscapes),
    (try_gzip_decompress, ObfuscationType::Gzip),
];

/// Run the full pipeline over one input.
pub fn deobfuscate(text: &str) -> DeobfuscationResult {
    let (normalized, nfkc_changed) = normalize_unicode(text);

    let mut result = DeobfuscationResult {
        normalized: normalized.clone(),
        variants: Vec::new(),
        types: Vec::new(),
    };

    let mut record = |result: &mut DeobfuscationResult, text: String, ty: ObfuscationType| {
        let text = truncate_to_char_boundary(text, MAX_VARIANT_BYTES);
        if !result.types.contains(&ty) {
            result.types.push(ty);
        }
        if !result.variants.iter().any(|v| v.text == text) {
            result.variants.push(DecodedVariant {
                text,
                obfuscation: ty,
            });
        }
    };

    if nfkc_changed {
        record(&mut result, normalized.clone(), ObfuscationType::Nfkc);
    }

    let mut second_pass: Vec<String> = Vec::new();
    for (decoder, ty) in FIRST_PASS_DECODERS {
        if let Some(decoded) = decoder(&normalized) {
            second_pass.push(decoded.clone());
            record(&mut result, decoded, *ty);
        }
    }

    // One further pass over each first-level variant, so double-encoded
    // payloads surface. Depth stops here.
    for variant in second_pass {
        for (decoder, ty) in SECOND_PASS_DECODERS {
            if let Some(decoded) = decoder(&variant) {
                record(&mut result, decoded, *ty);
            }
        }
    }

    result
}
