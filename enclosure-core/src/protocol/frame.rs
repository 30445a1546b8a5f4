//! Authenticated 64-byte report framing.
//!
//! Requests and responses share one layout: bytes 0..32 carry the command or
//! response content, bytes 32..64 carry an HMAC-SHA-256 tag over the first 32
//! bytes, keyed with the fixed pre-shared secret. Verification is
//! constant-time via [`Mac::verify_slice`]; a report that fails the check is
//! dropped without a response so the channel gives no oracle to probers.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Size of every HID report exchanged with the host.
pub const REPORT_LEN: usize = 64;

/// Number of leading bytes covered by the authentication tag.
pub const SIGNED_LEN: usize = 32;

/// Size of the trailing authentication tag.
pub const TAG_LEN: usize = 32;

/// Longest payload a response can carry after the echoed opcode.
pub const MAX_PAYLOAD_LEN: usize = SIGNED_LEN - 1;

/// One fixed-size report frame.
pub type Report = [u8; REPORT_LEN];

// Pre-shared with the host application; both directions use the same key.
const SHARED_KEY: &[u8] = b"a0HyIvVM6A6Z7dTPYrAk8s3Mpouh";

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac() -> HmacSha256 {
    HmacSha256::new_from_slice(SHARED_KEY).expect("HMAC accepts any key length")
}

/// Checks the frame size and authentication tag of an inbound report.
#[must_use]
pub fn verify(report: &[u8]) -> bool {
    if report.len() != REPORT_LEN {
        return false;
    }

    let mut mac = keyed_mac();
    mac.update(&report[..SIGNED_LEN]);
    mac.verify_slice(&report[SIGNED_LEN..]).is_ok()
}

/// Computes the tag over the frame's first 32 bytes and writes it in place.
pub fn sign(report: &mut Report) {
    let mut mac = keyed_mac();
    mac.update(&report[..SIGNED_LEN]);
    let tag = mac.finalize().into_bytes();
    report[SIGNED_LEN..].copy_from_slice(&tag);
}

/// Builds a signed response frame: echoed opcode, payload truncated to 31
/// bytes, authentication tag.
#[must_use]
pub fn seal(opcode: u8, payload: &[u8]) -> Report {
    let mut report = [0u8; REPORT_LEN];
    report[0] = opcode;

    let len = payload.len().min(MAX_PAYLOAD_LEN);
    report[1..=len].copy_from_slice(&payload[..len]);

    sign(&mut report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_frames_verify() {
        let report = seal(0x02, b"HIGH");
        assert_eq!(report[0], 0x02);
        assert_eq!(&report[1..5], b"HIGH");
        assert!(verify(&report));
    }

    #[test]
    fn any_flipped_bit_fails_verification() {
        let report = seal(0xFE, b"PONG");
        for byte in 0..REPORT_LEN {
            for bit in 0..8 {
                let mut tampered = report;
                tampered[byte] ^= 1 << bit;
                assert!(!verify(&tampered), "byte {byte} bit {bit} accepted");
            }
        }
    }

    #[test]
    fn wrong_sized_frames_are_rejected() {
        let report = seal(0x00, b"OK");
        assert!(!verify(&report[..REPORT_LEN - 1]));
        assert!(!verify(&[]));
    }

    #[test]
    fn oversized_payload_is_truncated() {
        let payload = [0xAB; 40];
        let report = seal(0x0F, &payload);
        assert_eq!(&report[1..SIGNED_LEN], &payload[..MAX_PAYLOAD_LEN]);
        assert!(verify(&report));
    }
}
