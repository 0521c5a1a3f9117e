// Lottery Program - Utility Functions
use solana_program::native_token::LAMPORTS_PER_SOL;
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer
    pub struct U256(4);
}

/// Map a random word onto an entrant index.
///
/// The word is read as a big-endian 256-bit integer and reduced modulo the
/// entrant count. The reduction carries a modulo bias of at most
/// `count / 2^256`, which is accepted.
pub fn winner_index(random_word: &[u8; 32], entrant_count: usize) -> usize {
    if entrant_count == 0 {
        return 0;
    }

    let word = U256::from_big_endian(random_word);
    let index = word % U256::from(entrant_count as u64);
    index.low_u64() as usize
}

/// Convert lamports to SOL (for display purposes)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
