use rand::{thread_rng, Rng};

/// Length of a paste id.
pub const ID_LENGTH: usize = 10;

/// URL-safe alphabet, 64 symbols.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generate a fresh random paste id.
pub fn generate_id() -> String {
    let mut rng = thread_rng();
    (0..ID_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Whether `id` could have been produced by [`generate_id`].
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.bytes().all(|b| ALPHABET.contains(&b))
}
