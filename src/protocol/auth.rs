//! chap-sha1 scramble computation.

use sha1::{Digest, Sha1};

use super::constant::SCRAMBLE_SIZE;

/// `scramble = sha1(pass) XOR sha1(salt[..20] ++ sha1(sha1(pass)))`
pub fn scramble(salt: &[u8], password: &str) -> [u8; SCRAMBLE_SIZE] {
    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);
    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SIZE]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_SIZE];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = step1[i] ^ step3[i];
    }
    out
}
