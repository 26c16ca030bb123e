use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Prefix marking a stored FTP password as obfuscated.
pub const MARKER: &str = "ENC:";

// Shared with the management UI. This is deliberately NOT cryptography:
// the codec only keeps raw passwords out of storage and transit inside an
// internal admin tool. Anyone with this source can reverse it.
const SHARED_KEY: &[u8] = b"kiosk-manager-secure-key-2025";

fn xor_with_key(input: &[u8]) -> Vec<u8> {
    input
        .iter()
        .zip(SHARED_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

pub fn obfuscate(plaintext: &str) -> String {
    STANDARD.encode(xor_with_key(plaintext.as_bytes()))
}

/// Reverses `obfuscate`. Malformed input yields an empty string rather
/// than an error; the caller ends up with a failed FTP login instead of a
/// 500.
pub fn deobfuscate(token: &str) -> String {
    let decoded = match STANDARD.decode(token) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("failed to decode obfuscated credential: {e}");
            return String::new();
        }
    };
    match String::from_utf8(xor_with_key(&decoded)) {
        Ok(plain) => plain,
        Err(e) => {
            log::warn!("obfuscated credential is not valid UTF-8 after decoding: {e}");
            String::new()
        }
    }
}

/// Returns the usable form of a stored or request-supplied password,
/// deobfuscating only when the marker prefix is present.
pub fn resolve(password: &str) -> String {
    match password.strip_prefix(MARKER) {
        Some(rest) => deobfuscate(rest),
        None => password.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_printable_ascii() {
        for input in ["", "a", "hunter2", "p@ssw0rd with spaces!", "~`{}[]<>"] {
            assert_eq!(deobfuscate(&obfuscate(input)), input);
        }
    }

    #[test]
    fn obfuscated_form_differs_from_plaintext() {
        let token = obfuscate("secret");
        assert_ne!(token, "secret");
        assert!(!token.contains("secret"));
    }

    #[test]
    fn malformed_token_yields_empty_string() {
        assert_eq!(deobfuscate("not base64 at all!!!"), "");
    }

    #[test]
    fn resolve_only_touches_marked_passwords() {
        assert_eq!(resolve("plain-password"), "plain-password");
        let marked = format!("{}{}", MARKER, obfuscate("secret"));
        assert_eq!(resolve(&marked), "secret");
    }
}
